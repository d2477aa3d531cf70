use async_trait::async_trait;
use shared::{
    domain::{ParticipantId, ParticipantInfo},
    protocol::{
        ConferenceCommand, EndpointMessage, InboundCommand, InboundLobbyMessage, LobbyMessage,
        ReactionsWebhookPayload,
    },
};
use tokio::sync::broadcast;

pub mod webhook;

pub use webhook::HttpWebhookReporter;

/// Lobby member fields as delivered by the conferencing engine. Absent
/// fields leave the stored value untouched on update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyMemberUpdate {
    pub id: ParticipantId,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl LobbyMemberUpdate {
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConferenceEvent {
    ConferenceJoined,
    LobbyMemberJoined(LobbyMemberUpdate),
    LobbyMemberUpdated(LobbyMemberUpdate),
    LobbyMemberLeft {
        id: ParticipantId,
    },
    ParticipantLeft {
        id: ParticipantId,
    },
    LobbyAccessDenied,
    EndpointMessageReceived {
        sender_id: ParticipantId,
        message: EndpointMessage,
    },
    CommandReceived(InboundCommand),
}

/// The conferencing engine as seen by the coordinators. Every imperative
/// call is fire-and-forget: the outcome shows up later as a
/// [`ConferenceEvent`], never as a return value.
#[async_trait]
pub trait ConferenceSession: Send + Sync {
    fn local_participant(&self) -> ParticipantInfo;
    fn participant(&self, id: &ParticipantId) -> Option<ParticipantInfo>;
    fn participant_count(&self) -> usize;

    async fn send_endpoint_message(&self, message: EndpointMessage) -> anyhow::Result<()>;
    async fn send_command(&self, command: ConferenceCommand) -> anyhow::Result<()>;

    async fn lobby_approve_access(&self, id: &ParticipantId) -> anyhow::Result<()>;
    async fn lobby_deny_access(&self, id: &ParticipantId) -> anyhow::Result<()>;
    async fn enable_lobby(&self) -> anyhow::Result<()>;
    async fn disable_lobby(&self) -> anyhow::Result<()>;
    async fn join_lobby(&self, display_name: &str, email: Option<&str>) -> anyhow::Result<()>;
    /// Unicast when `target` is set, otherwise broadcast to the lobby.
    async fn send_lobby_message(
        &self,
        message: LobbyMessage,
        target: Option<&ParticipantId>,
    ) -> anyhow::Result<()>;

    fn subscribe_lobby_messages(&self) -> broadcast::Receiver<InboundLobbyMessage>;
    fn subscribe_events(&self) -> broadcast::Receiver<ConferenceEvent>;
}

#[async_trait]
pub trait SoundPlayer: Send + Sync {
    async fn register_sound(&self, sound_id: &str, file: &str) -> anyhow::Result<()>;
    async fn unregister_sound(&self, sound_id: &str) -> anyhow::Result<()>;
    async fn play_sound(&self, sound_id: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait WebhookReporter: Send + Sync {
    async fn report_reactions(&self, payload: ReactionsWebhookPayload) -> anyhow::Result<()>;
}
