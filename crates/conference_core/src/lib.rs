use std::sync::Arc;

use conference_integration::{ConferenceEvent, ConferenceSession, SoundPlayer, WebhookReporter};
use shared::{
    error::{CoreError, ErrorCode},
    protocol::EndpointMessage,
};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod chat;
pub mod config;
pub mod lobby;
pub mod moderation;
pub mod reactions;
pub mod sounds;

pub use chat::{ChatLog, ChatMessage, ChatMessageKind, ChatParticipant, ComposeTarget};
pub use config::{load_settings, Settings};
pub use lobby::{KnockingParticipant, LobbyChatSession, LobbyCoordinator, LobbyPhase};
pub use reactions::{ReactionAggregator, ReactionConfig, ReactionQueueEntry, ReactionSettings};
pub use sounds::{SoundCatalog, SoundThresholds};

/// Transient, user-facing notices. The UI decides how to render them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ParticipantKnocking { participant: ChatParticipant },
    LobbyChatStarted { moderator: String, attendee: String },
    LobbyChatEnded { with: ChatParticipant },
    KnockingRejected,
    ReactionSoundsCanBeDisabled { offer_mute_for_everyone: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    Notification(Notification),
    ChatMessageAdded(ChatMessage),
    ChatMessagesRemoved(Vec<Uuid>),
    ComposeTargetChanged(ComposeTarget),
    ReactionQueueUpdated(Vec<ReactionQueueEntry>),
    ReactionSettingsChanged(ReactionSettings),
    KnockingParticipantsChanged(Vec<KnockingParticipant>),
    LobbyPhaseChanged(LobbyPhase),
}

/// Wires the reaction and lobby coordinators to one conference session and
/// routes the engine's events to them.
pub struct ConferenceClient {
    conference: Arc<dyn ConferenceSession>,
    sounds: Arc<dyn SoundPlayer>,
    catalog: SoundCatalog,
    chat: Arc<ChatLog>,
    reactions: Arc<ReactionAggregator>,
    lobby: Arc<LobbyCoordinator>,
    events: broadcast::Sender<CoreEvent>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConferenceClient {
    pub fn new(
        conference: Arc<dyn ConferenceSession>,
        sounds: Arc<dyn SoundPlayer>,
        webhook: Option<Arc<dyn WebhookReporter>>,
        settings: &Settings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let chat = Arc::new(ChatLog::new(events.clone()));
        let reactions = ReactionAggregator::new(
            Arc::clone(&conference),
            Arc::clone(&sounds),
            webhook,
            Arc::clone(&chat),
            events.clone(),
            ReactionConfig::from(settings),
            settings.sounds_enabled,
        );
        let lobby = LobbyCoordinator::new(Arc::clone(&conference), Arc::clone(&chat), events.clone());

        Arc::new(Self {
            conference,
            sounds,
            catalog: SoundCatalog::reactions(&settings.sound_thresholds),
            chat,
            reactions,
            lobby,
            events,
            event_task: Mutex::new(None),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn chat(&self) -> &Arc<ChatLog> {
        &self.chat
    }

    pub fn reactions(&self) -> &Arc<ReactionAggregator> {
        &self.reactions
    }

    pub fn lobby(&self) -> &Arc<LobbyCoordinator> {
        &self.lobby
    }

    /// Registers the sound catalog and starts routing conference events.
    /// Calling it again while running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut guard = self.event_task.lock().await;
        if guard.as_ref().is_some_and(|task| !task.is_finished()) {
            CoreError::new(
                ErrorCode::DuplicateRegistration,
                "conference event listener already running",
            )
            .log("client.start");
            return;
        }

        self.catalog.register_all(self.sounds.as_ref()).await;

        let mut events = self.conference.subscribe_events();
        let client = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => client.handle_conference_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "conference: event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("conference: event stream closed");
        }));
        info!(
            sounds = self.catalog.resources().len(),
            "conference: client started"
        );
    }

    pub async fn handle_conference_event(&self, event: ConferenceEvent) {
        match event {
            ConferenceEvent::ConferenceJoined => self.lobby.on_conference_joined().await,
            ConferenceEvent::LobbyMemberJoined(update)
            | ConferenceEvent::LobbyMemberUpdated(update) => {
                self.lobby.on_participant_arrived_or_updated(update).await
            }
            ConferenceEvent::LobbyMemberLeft { id } | ConferenceEvent::ParticipantLeft { id } => {
                self.lobby.on_participant_left(&id).await
            }
            ConferenceEvent::LobbyAccessDenied => self.lobby.on_access_denied().await,
            ConferenceEvent::EndpointMessageReceived { sender_id, message } => match message {
                EndpointMessage::Reactions { reactions, .. } => {
                    self.reactions.on_remote_reactions(sender_id, reactions).await
                }
            },
            ConferenceEvent::CommandReceived(command) => {
                self.reactions.on_mute_reactions_command(command).await
            }
        }
    }

    /// Stops event routing, sends whatever reactions are still buffered and
    /// releases the lobby subscription and sound resources.
    pub async fn shutdown(&self) {
        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }
        self.reactions.flush().await;
        self.lobby.end_session().await;
        self.catalog.unregister_all(self.sounds.as_ref()).await;
        info!("conference: client shut down");
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
