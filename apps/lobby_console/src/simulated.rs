use std::{collections::HashMap, sync::Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use conference_integration::{ConferenceEvent, ConferenceSession, SoundPlayer};
use shared::{
    domain::{ParticipantId, ParticipantInfo},
    protocol::{ConferenceCommand, EndpointMessage, InboundLobbyMessage, LobbyMessage},
};
use tokio::sync::broadcast;
use tracing::info;

/// In-memory stand-in for the conferencing engine. Every imperative call
/// is logged; admission decisions are echoed back as engine events so the
/// coordinators see the same eventual confirmation a real engine sends.
pub struct SimulatedConference {
    local: ParticipantInfo,
    remote: Mutex<HashMap<ParticipantId, ParticipantInfo>>,
    lobby_tx: broadcast::Sender<InboundLobbyMessage>,
    events_tx: broadcast::Sender<ConferenceEvent>,
}

impl SimulatedConference {
    pub fn new(local: ParticipantInfo) -> Self {
        Self {
            local,
            remote: Mutex::new(HashMap::new()),
            lobby_tx: broadcast::channel(64).0,
            events_tx: broadcast::channel(64).0,
        }
    }

    pub fn add_remote(&self, info: ParticipantInfo) -> Result<()> {
        self.remote
            .lock()
            .map_err(|_| anyhow!("participant directory poisoned"))?
            .insert(info.id.clone(), info);
        Ok(())
    }

    /// Injects an engine event as if it arrived from the network.
    pub fn emit(&self, event: ConferenceEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn deliver_lobby_message(&self, message: LobbyMessage, sender_id: ParticipantId) {
        let _ = self
            .lobby_tx
            .send(InboundLobbyMessage { message, sender_id });
    }
}

#[async_trait]
impl ConferenceSession for SimulatedConference {
    fn local_participant(&self) -> ParticipantInfo {
        self.local.clone()
    }

    fn participant(&self, id: &ParticipantId) -> Option<ParticipantInfo> {
        if *id == self.local.id {
            return Some(self.local.clone());
        }
        self.remote.lock().ok()?.get(id).cloned()
    }

    fn participant_count(&self) -> usize {
        1 + self.remote.lock().map(|remote| remote.len()).unwrap_or(0)
    }

    async fn send_endpoint_message(&self, message: EndpointMessage) -> Result<()> {
        info!(?message, "engine: endpoint message");
        Ok(())
    }

    async fn send_command(&self, command: ConferenceCommand) -> Result<()> {
        info!(?command, "engine: command broadcast");
        Ok(())
    }

    async fn lobby_approve_access(&self, id: &ParticipantId) -> Result<()> {
        info!(participant_id = %id, "engine: approve access");
        self.emit(ConferenceEvent::LobbyMemberLeft { id: id.clone() });
        Ok(())
    }

    async fn lobby_deny_access(&self, id: &ParticipantId) -> Result<()> {
        info!(participant_id = %id, "engine: deny access");
        self.emit(ConferenceEvent::LobbyMemberLeft { id: id.clone() });
        Ok(())
    }

    async fn enable_lobby(&self) -> Result<()> {
        info!("engine: lobby enabled");
        Ok(())
    }

    async fn disable_lobby(&self) -> Result<()> {
        info!("engine: lobby disabled");
        Ok(())
    }

    async fn join_lobby(&self, display_name: &str, email: Option<&str>) -> Result<()> {
        info!(display_name, email, "engine: join lobby");
        Ok(())
    }

    async fn send_lobby_message(
        &self,
        message: LobbyMessage,
        target: Option<&ParticipantId>,
    ) -> Result<()> {
        info!(
            kind = message.type_name(),
            recipient = target.map(ParticipantId::as_str),
            "engine: lobby message"
        );
        Ok(())
    }

    fn subscribe_lobby_messages(&self) -> broadcast::Receiver<InboundLobbyMessage> {
        self.lobby_tx.subscribe()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ConferenceEvent> {
        self.events_tx.subscribe()
    }
}

pub struct LoggingSoundPlayer;

#[async_trait]
impl SoundPlayer for LoggingSoundPlayer {
    async fn register_sound(&self, sound_id: &str, file: &str) -> Result<()> {
        tracing::debug!(sound_id, file, "sound: registered");
        Ok(())
    }

    async fn unregister_sound(&self, sound_id: &str) -> Result<()> {
        tracing::debug!(sound_id, "sound: unregistered");
        Ok(())
    }

    async fn play_sound(&self, sound_id: &str) -> Result<()> {
        info!(sound_id, "sound: play");
        Ok(())
    }
}
