use super::*;
use crate::test_support::drain_events;

fn party(id: &str, name: &str) -> ChatParticipant {
    ChatParticipant {
        id: ParticipantId::new(id),
        name: name.to_string(),
    }
}

#[tokio::test]
async fn setting_a_lobby_target_replaces_a_private_one() {
    let (events, mut rx) = broadcast::channel(16);
    let chat = ChatLog::new(events);

    chat.set_compose_target(ComposeTarget::Private(party("p1", "Pat")))
        .await;
    chat.set_compose_target(ComposeTarget::LobbyChat(party("a1", "Ari")))
        .await;

    assert_eq!(
        chat.compose_target().await,
        ComposeTarget::LobbyChat(party("a1", "Ari"))
    );
    assert_eq!(drain_events(&mut rx).len(), 2);
}

#[tokio::test]
async fn setting_the_same_target_twice_emits_once() {
    let (events, mut rx) = broadcast::channel(16);
    let chat = ChatLog::new(events);

    chat.set_compose_target(ComposeTarget::LobbyChat(party("a1", "Ari")))
        .await;
    chat.set_compose_target(ComposeTarget::LobbyChat(party("a1", "Ari")))
        .await;

    assert_eq!(drain_events(&mut rx).len(), 1);
}

#[tokio::test]
async fn clearing_lobby_target_only_matches_the_given_counterpart() {
    let (events, _rx) = broadcast::channel(16);
    let chat = ChatLog::new(events);
    chat.set_compose_target(ComposeTarget::LobbyChat(party("a1", "Ari")))
        .await;

    assert!(!chat
        .clear_lobby_chat_target(Some(&ParticipantId::new("someone-else")))
        .await);
    assert!(chat.compose_target().await.lobby_chat().is_some());

    assert!(chat
        .clear_lobby_chat_target(Some(&ParticipantId::new("a1")))
        .await);
    assert!(chat.compose_target().await.is_none());
}

#[tokio::test]
async fn clearing_lobby_target_leaves_private_target_alone() {
    let (events, _rx) = broadcast::channel(16);
    let chat = ChatLog::new(events);
    chat.set_compose_target(ComposeTarget::Private(party("p1", "Pat")))
        .await;

    assert!(!chat.clear_lobby_chat_target(None).await);
    assert_eq!(
        chat.compose_target().await,
        ComposeTarget::Private(party("p1", "Pat"))
    );
}

#[tokio::test]
async fn removing_lobby_conversation_keeps_other_messages() {
    let (events, mut rx) = broadcast::channel(16);
    let chat = ChatLog::new(events);
    let me = party("me", "Mia");
    let ari = party("a1", "Ari");

    chat.append(ChatMessage::new(ChatMessageKind::LobbyChat, me.clone(), "hello").to(ari.clone()))
        .await;
    chat.append(ChatMessage::new(ChatMessageKind::LobbyChat, ari.clone(), "hi").to(me.clone()).incoming())
        .await;
    chat.append(ChatMessage::new(ChatMessageKind::Reactions, ari.clone(), "in the room"))
        .await;
    chat.append(
        ChatMessage::new(ChatMessageKind::LobbyChat, party("a2", "Bo"), "other lobby").to(me),
    )
    .await;

    assert_eq!(chat.remove_lobby_conversation(&ari.id).await, 2);

    let remaining = chat.messages().await;
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].kind, ChatMessageKind::Reactions);
    assert_eq!(remaining[1].text, "other lobby");

    let events = drain_events(&mut rx);
    let added = events
        .iter()
        .filter(|event| matches!(event, CoreEvent::ChatMessageAdded(_)))
        .count();
    assert_eq!(added, 4);
    let removed: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            CoreEvent::ChatMessagesRemoved(ids) => Some(ids.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].len(), 2);
    assert!(removed[0].iter().all(|id| remaining.iter().all(|message| message.id != *id)));
}

#[tokio::test]
async fn removing_absent_lobby_conversation_emits_nothing() {
    let (events, mut rx) = broadcast::channel(16);
    let chat = ChatLog::new(events);
    chat.append(ChatMessage::new(ChatMessageKind::Reactions, party("me", "Mia"), "👍"))
        .await;
    drain_events(&mut rx);

    assert_eq!(chat.remove_lobby_conversation(&party("a1", "Ari").id).await, 0);
    assert_eq!(chat.messages().await.len(), 1);
    assert!(drain_events(&mut rx).is_empty());
}
