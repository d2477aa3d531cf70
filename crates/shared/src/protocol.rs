use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ParticipantId, ParticipantInfo, ReactionKind};

/// One side of a moderator/attendee lobby chat pairing as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyChatParty {
    pub id: ParticipantId,
    pub name: String,
}

impl From<&ParticipantInfo> for LobbyChatParty {
    fn from(value: &ParticipantInfo) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
        }
    }
}

/// Peer-to-peer messages exchanged between lobby members and moderators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LobbyMessage {
    #[serde(rename = "LOBBY_CHAT_MESSAGE")]
    ChatMessage { message: String },
    #[serde(rename = "LOBBY_CHAT_INITIALIZED")]
    ChatInitialized {
        moderator: LobbyChatParty,
        attendee: LobbyChatParty,
    },
    #[serde(rename = "MODERATOR_IN_CHAT_WITH_LEFT")]
    ModeratorInChatWithLeft {
        #[serde(rename = "moderatorId")]
        moderator_id: ParticipantId,
    },
}

impl LobbyMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            LobbyMessage::ChatMessage { .. } => "LOBBY_CHAT_MESSAGE",
            LobbyMessage::ChatInitialized { .. } => "LOBBY_CHAT_INITIALIZED",
            LobbyMessage::ModeratorInChatWithLeft { .. } => "MODERATOR_IN_CHAT_WITH_LEFT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundLobbyMessage {
    pub message: LobbyMessage,
    pub sender_id: ParticipantId,
}

/// Fire-and-forget payloads sent to other conference endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum EndpointMessage {
    #[serde(rename = "endpoint-reaction")]
    Reactions {
        reactions: Vec<ReactionKind>,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuteReactionsAttributes {
    pub start_reactions_muted: bool,
}

/// Custom commands broadcast through the conference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "attributes")]
pub enum ConferenceCommand {
    #[serde(rename = "mute-reactions")]
    MuteReactions(MuteReactionsAttributes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub command: ConferenceCommand,
    pub sender_id: Option<ParticipantId>,
}

/// Body posted to the reactions webhook after each flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionsWebhookPayload {
    pub participant_id: ParticipantId,
    pub participant_name: String,
    pub reactions: Vec<ReactionKind>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lobby_messages_use_type_tag() {
        let value = serde_json::to_value(LobbyMessage::ModeratorInChatWithLeft {
            moderator_id: ParticipantId::new("mod-1"),
        })
        .expect("serialize");
        assert_eq!(
            value,
            json!({ "type": "MODERATOR_IN_CHAT_WITH_LEFT", "moderatorId": "mod-1" })
        );
    }

    #[test]
    fn chat_initialized_parses_from_wire() {
        let raw = json!({
            "type": "LOBBY_CHAT_INITIALIZED",
            "moderator": { "id": "m1", "name": "Mia" },
            "attendee": { "id": "a1", "name": "Ari" }
        });
        let message: LobbyMessage = serde_json::from_value(raw).expect("parse");
        match message {
            LobbyMessage::ChatInitialized {
                moderator,
                attendee,
            } => {
                assert_eq!(moderator.id, ParticipantId::new("m1"));
                assert_eq!(attendee.name, "Ari");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn mute_command_carries_camel_case_attribute() {
        let value = serde_json::to_value(ConferenceCommand::MuteReactions(
            MuteReactionsAttributes {
                start_reactions_muted: true,
            },
        ))
        .expect("serialize");
        assert_eq!(
            value,
            json!({ "name": "mute-reactions", "attributes": { "startReactionsMuted": true } })
        );
    }

    #[test]
    fn endpoint_reactions_use_snake_case_kinds() {
        let value = serde_json::to_value(EndpointMessage::Reactions {
            reactions: vec![ReactionKind::Like, ReactionKind::Tada],
            timestamp: 7,
        })
        .expect("serialize");
        assert_eq!(value["name"], "endpoint-reaction");
        assert_eq!(value["reactions"], json!(["like", "tada"]));
    }
}
