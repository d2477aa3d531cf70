use super::*;
use crate::test_support::{participant, settle, TestConference, TestSoundPlayer, TestWebhook};
use conference_integration::LobbyMemberUpdate;
use shared::{
    domain::{ParticipantId, ReactionKind, Role},
    protocol::{ConferenceCommand, InboundCommand, MuteReactionsAttributes},
};

struct Harness {
    conference: Arc<TestConference>,
    sounds: Arc<TestSoundPlayer>,
    client: Arc<ConferenceClient>,
}

fn harness(conference: Arc<TestConference>) -> Harness {
    let sounds = Arc::new(TestSoundPlayer::default());
    let session: Arc<dyn ConferenceSession> = conference.clone();
    let player: Arc<dyn SoundPlayer> = sounds.clone();
    let webhook: Arc<dyn WebhookReporter> = Arc::new(TestWebhook::default());
    let client = ConferenceClient::new(session, player, Some(webhook), &Settings::default());
    Harness {
        conference,
        sounds,
        client,
    }
}

fn moderator_with_peer() -> Arc<TestConference> {
    TestConference::moderator().with_remote(participant("m2", "Noa", Role::Moderator))
}

#[tokio::test]
async fn start_registers_sounds_and_is_guarded() {
    let h = harness(moderator_with_peer());

    h.client.start().await;
    h.client.start().await;

    let registered = h.sounds.registered.lock().await.len();
    assert_eq!(registered, ReactionKind::ALL.len() * 4 + 1);
}

#[tokio::test]
async fn conference_events_reach_the_coordinators() {
    let h = harness(moderator_with_peer());
    let mut events = h.client.subscribe_events();
    h.client.start().await;

    h.conference
        .events_tx
        .send(ConferenceEvent::LobbyMemberJoined(
            LobbyMemberUpdate::new("x").with_name("Xan"),
        ))
        .expect("listener subscribed");
    h.conference
        .events_tx
        .send(ConferenceEvent::EndpointMessageReceived {
            sender_id: ParticipantId::new("m2"),
            message: EndpointMessage::Reactions {
                reactions: vec![ReactionKind::Clap],
                timestamp: 0,
            },
        })
        .expect("listener subscribed");
    h.conference
        .events_tx
        .send(ConferenceEvent::CommandReceived(InboundCommand {
            command: ConferenceCommand::MuteReactions(MuteReactionsAttributes {
                start_reactions_muted: true,
            }),
            sender_id: Some(ParticipantId::new("m2")),
        }))
        .expect("listener subscribed");
    settle().await;

    assert_eq!(h.client.lobby().knocking_participants().await.len(), 1);
    assert_eq!(h.client.reactions().queue().await.len(), 1);
    assert!(h.client.reactions().settings().await.start_reactions_muted);
    assert!(matches!(
        events.try_recv(),
        Ok(CoreEvent::KnockingParticipantsChanged(_))
    ));
}

#[tokio::test]
async fn left_events_remove_knocking_participants() {
    let h = harness(moderator_with_peer());

    h.client
        .handle_conference_event(ConferenceEvent::LobbyMemberJoined(
            LobbyMemberUpdate::new("x").with_name("Xan"),
        ))
        .await;
    h.client
        .handle_conference_event(ConferenceEvent::LobbyMemberLeft {
            id: ParticipantId::new("x"),
        })
        .await;

    assert!(h.client.lobby().knocking_participants().await.is_empty());
}

#[tokio::test]
async fn joining_the_conference_admits_a_knocking_attendee() {
    let h = harness(TestConference::attendee());

    h.client.lobby().start_knocking().await;
    h.client
        .handle_conference_event(ConferenceEvent::ConferenceJoined)
        .await;

    assert_eq!(h.client.lobby().phase().await, LobbyPhase::Admitted);
}

#[tokio::test]
async fn shutdown_flushes_and_releases_resources() {
    let h = harness(moderator_with_peer());
    h.client.start().await;

    h.client.reactions().add_reaction(ReactionKind::Like).await;
    h.client.shutdown().await;

    assert_eq!(h.conference.endpoint_messages().await.len(), 1);
    assert_eq!(
        h.sounds.unregistered.lock().await.len(),
        h.sounds.registered.lock().await.len()
    );
    assert_eq!(h.client.chat().messages().await.len(), 1);
    assert!(!h.client.lobby().is_message_listener_registered().await);
}
