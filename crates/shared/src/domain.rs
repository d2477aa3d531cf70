use std::fmt;

use serde::{Deserialize, Serialize};

/// Network-issued participant id. Stable for the lifetime of a conference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Moderator,
    Participant,
    Guest,
}

impl Role {
    pub fn is_moderator(self) -> bool {
        self == Role::Moderator
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
}

impl ParticipantInfo {
    pub fn is_moderator(&self) -> bool {
        self.role.is_moderator()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Clap,
    Laugh,
    Surprised,
    Boo,
    Silence,
    Love,
    Tada,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 8] = [
        ReactionKind::Like,
        ReactionKind::Clap,
        ReactionKind::Laugh,
        ReactionKind::Surprised,
        ReactionKind::Boo,
        ReactionKind::Silence,
        ReactionKind::Love,
        ReactionKind::Tada,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Clap => "clap",
            ReactionKind::Laugh => "laugh",
            ReactionKind::Surprised => "surprised",
            ReactionKind::Boo => "boo",
            ReactionKind::Silence => "silence",
            ReactionKind::Love => "love",
            ReactionKind::Tada => "tada",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ReactionKind::Like => "\u{1F44D}",
            ReactionKind::Clap => "\u{1F44F}",
            ReactionKind::Laugh => "\u{1F602}",
            ReactionKind::Surprised => "\u{1F62E}",
            ReactionKind::Boo => "\u{1F621}",
            ReactionKind::Silence => "\u{1F92B}",
            ReactionKind::Love => "\u{1F496}",
            ReactionKind::Tada => "\u{1F389}",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
