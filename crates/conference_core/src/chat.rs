use chrono::{DateTime, Utc};
use shared::{
    domain::{ParticipantId, ParticipantInfo},
    protocol::LobbyChatParty,
};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::CoreEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatParticipant {
    pub id: ParticipantId,
    pub name: String,
}

impl From<&ParticipantInfo> for ChatParticipant {
    fn from(value: &ParticipantInfo) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
        }
    }
}

impl From<LobbyChatParty> for ChatParticipant {
    fn from(value: LobbyChatParty) -> Self {
        Self {
            id: value.id,
            name: value.name,
        }
    }
}

impl From<&ChatParticipant> for LobbyChatParty {
    fn from(value: &ChatParticipant) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
        }
    }
}

/// Who the composer is currently addressing. Exactly one variant is live,
/// so picking a new recipient drops whichever one was set before.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ComposeTarget {
    #[default]
    None,
    Private(ChatParticipant),
    ChallengeResponse(ChatParticipant),
    LobbyChat(ChatParticipant),
}

impl ComposeTarget {
    pub fn lobby_chat(&self) -> Option<&ChatParticipant> {
        match self {
            ComposeTarget::LobbyChat(participant) => Some(participant),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ComposeTarget::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMessageKind {
    LobbyChat,
    Reactions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub kind: ChatMessageKind,
    pub sender: ChatParticipant,
    pub recipient: Option<ChatParticipant>,
    pub text: String,
    pub incoming: bool,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(kind: ChatMessageKind, sender: ChatParticipant, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            sender,
            recipient: None,
            text: text.into(),
            incoming: false,
            sent_at: Utc::now(),
        }
    }

    pub fn to(mut self, recipient: ChatParticipant) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn incoming(mut self) -> Self {
        self.incoming = true;
        self
    }

    fn involves(&self, participant: &ParticipantId) -> bool {
        self.sender.id == *participant
            || self
                .recipient
                .as_ref()
                .is_some_and(|recipient| recipient.id == *participant)
    }
}

#[derive(Default)]
struct ChatState {
    messages: Vec<ChatMessage>,
    compose_target: ComposeTarget,
}

pub struct ChatLog {
    inner: Mutex<ChatState>,
    events: broadcast::Sender<CoreEvent>,
}

impl ChatLog {
    pub fn new(events: broadcast::Sender<CoreEvent>) -> Self {
        Self {
            inner: Mutex::new(ChatState::default()),
            events,
        }
    }

    pub async fn append(&self, message: ChatMessage) {
        self.inner.lock().await.messages.push(message.clone());
        let _ = self.events.send(CoreEvent::ChatMessageAdded(message));
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.messages.clone()
    }

    pub async fn compose_target(&self) -> ComposeTarget {
        self.inner.lock().await.compose_target.clone()
    }

    pub async fn set_compose_target(&self, target: ComposeTarget) {
        {
            let mut guard = self.inner.lock().await;
            if guard.compose_target == target {
                return;
            }
            guard.compose_target = target.clone();
        }
        let _ = self.events.send(CoreEvent::ComposeTargetChanged(target));
    }

    /// Clears a lobby chat target. With `counterpart` set, only a target
    /// addressing that participant is cleared. Returns whether anything changed.
    pub async fn clear_lobby_chat_target(&self, counterpart: Option<&ParticipantId>) -> bool {
        {
            let mut guard = self.inner.lock().await;
            let Some(current) = guard.compose_target.lobby_chat() else {
                return false;
            };
            if counterpart.is_some_and(|id| current.id != *id) {
                return false;
            }
            guard.compose_target = ComposeTarget::None;
        }
        let _ = self
            .events
            .send(CoreEvent::ComposeTargetChanged(ComposeTarget::None));
        true
    }

    /// Drops the lobby chat held with `participant`. Returns how many
    /// messages went away.
    pub async fn remove_lobby_conversation(&self, participant: &ParticipantId) -> usize {
        let removed: Vec<Uuid> = {
            let mut guard = self.inner.lock().await;
            let mut removed = Vec::new();
            guard.messages.retain(|message| {
                let gone = message.kind == ChatMessageKind::LobbyChat && message.involves(participant);
                if gone {
                    removed.push(message.id);
                }
                !gone
            });
            removed
        };
        if removed.is_empty() {
            return 0;
        }
        let count = removed.len();
        let _ = self.events.send(CoreEvent::ChatMessagesRemoved(removed));
        count
    }
}

#[cfg(test)]
#[path = "tests/chat_tests.rs"]
mod tests;
