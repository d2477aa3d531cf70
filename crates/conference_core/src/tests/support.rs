use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use conference_integration::{ConferenceEvent, ConferenceSession, SoundPlayer, WebhookReporter};
use shared::{
    domain::{ParticipantId, ParticipantInfo, Role},
    protocol::{
        ConferenceCommand, EndpointMessage, InboundLobbyMessage, LobbyMessage,
        ReactionsWebhookPayload,
    },
};
use tokio::sync::{broadcast, Mutex};

use crate::CoreEvent;

pub(crate) fn participant(id: &str, name: &str, role: Role) -> ParticipantInfo {
    ParticipantInfo {
        id: ParticipantId::new(id),
        name: name.to_string(),
        email: None,
        role,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConferenceCall {
    EndpointMessage(EndpointMessage),
    Command(ConferenceCommand),
    ApproveAccess(ParticipantId),
    DenyAccess(ParticipantId),
    EnableLobby,
    DisableLobby,
    JoinLobby {
        name: String,
        email: Option<String>,
    },
    LobbyMessage {
        message: LobbyMessage,
        target: Option<ParticipantId>,
    },
}

pub(crate) struct TestConference {
    local: ParticipantInfo,
    remote: std::sync::Mutex<HashMap<ParticipantId, ParticipantInfo>>,
    calls: Mutex<Vec<ConferenceCall>>,
    fail_sends: AtomicBool,
    pub(crate) lobby_tx: broadcast::Sender<InboundLobbyMessage>,
    pub(crate) events_tx: broadcast::Sender<ConferenceEvent>,
}

impl TestConference {
    pub(crate) fn new(local: ParticipantInfo) -> Arc<Self> {
        Arc::new(Self {
            local,
            remote: std::sync::Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            lobby_tx: broadcast::channel(64).0,
            events_tx: broadcast::channel(64).0,
        })
    }

    pub(crate) fn moderator() -> Arc<Self> {
        Self::new(participant("local-mod", "Mia", Role::Moderator))
    }

    pub(crate) fn attendee() -> Arc<Self> {
        Self::new(participant("local-guest", "Gus", Role::Guest))
    }

    pub(crate) fn with_remote(self: Arc<Self>, info: ParticipantInfo) -> Arc<Self> {
        self.add_remote(info);
        self
    }

    pub(crate) fn add_remote(&self, info: ParticipantInfo) {
        self.remote
            .lock()
            .unwrap()
            .insert(info.id.clone(), info);
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn calls(&self) -> Vec<ConferenceCall> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn lobby_messages(&self) -> Vec<(LobbyMessage, Option<ParticipantId>)> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                ConferenceCall::LobbyMessage { message, target } => Some((message, target)),
                _ => None,
            })
            .collect()
    }

    pub(crate) async fn endpoint_messages(&self) -> Vec<EndpointMessage> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                ConferenceCall::EndpointMessage(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: ConferenceCall) -> Result<()> {
        self.calls.lock().await.push(call);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("conference connection dropped"));
        }
        Ok(())
    }
}

#[async_trait]
impl ConferenceSession for TestConference {
    fn local_participant(&self) -> ParticipantInfo {
        self.local.clone()
    }

    fn participant(&self, id: &ParticipantId) -> Option<ParticipantInfo> {
        if *id == self.local.id {
            return Some(self.local.clone());
        }
        self.remote.lock().unwrap().get(id).cloned()
    }

    fn participant_count(&self) -> usize {
        1 + self.remote.lock().unwrap().len()
    }

    async fn send_endpoint_message(&self, message: EndpointMessage) -> Result<()> {
        self.record(ConferenceCall::EndpointMessage(message)).await
    }

    async fn send_command(&self, command: ConferenceCommand) -> Result<()> {
        self.record(ConferenceCall::Command(command)).await
    }

    async fn lobby_approve_access(&self, id: &ParticipantId) -> Result<()> {
        self.record(ConferenceCall::ApproveAccess(id.clone())).await
    }

    async fn lobby_deny_access(&self, id: &ParticipantId) -> Result<()> {
        self.record(ConferenceCall::DenyAccess(id.clone())).await
    }

    async fn enable_lobby(&self) -> Result<()> {
        self.record(ConferenceCall::EnableLobby).await
    }

    async fn disable_lobby(&self) -> Result<()> {
        self.record(ConferenceCall::DisableLobby).await
    }

    async fn join_lobby(&self, display_name: &str, email: Option<&str>) -> Result<()> {
        self.record(ConferenceCall::JoinLobby {
            name: display_name.to_string(),
            email: email.map(str::to_string),
        })
        .await
    }

    async fn send_lobby_message(
        &self,
        message: LobbyMessage,
        target: Option<&ParticipantId>,
    ) -> Result<()> {
        self.record(ConferenceCall::LobbyMessage {
            message,
            target: target.cloned(),
        })
        .await
    }

    fn subscribe_lobby_messages(&self) -> broadcast::Receiver<InboundLobbyMessage> {
        self.lobby_tx.subscribe()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ConferenceEvent> {
        self.events_tx.subscribe()
    }
}

#[derive(Default)]
pub(crate) struct TestSoundPlayer {
    pub(crate) registered: Mutex<Vec<String>>,
    pub(crate) unregistered: Mutex<Vec<String>>,
    pub(crate) played: Mutex<Vec<String>>,
}

#[async_trait]
impl SoundPlayer for TestSoundPlayer {
    async fn register_sound(&self, sound_id: &str, _file: &str) -> Result<()> {
        self.registered.lock().await.push(sound_id.to_string());
        Ok(())
    }

    async fn unregister_sound(&self, sound_id: &str) -> Result<()> {
        self.unregistered.lock().await.push(sound_id.to_string());
        Ok(())
    }

    async fn play_sound(&self, sound_id: &str) -> Result<()> {
        self.played.lock().await.push(sound_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct TestWebhook {
    pub(crate) payloads: Mutex<Vec<ReactionsWebhookPayload>>,
}

#[async_trait]
impl WebhookReporter for TestWebhook {
    async fn report_reactions(&self, payload: ReactionsWebhookPayload) -> Result<()> {
        self.payloads.lock().await.push(payload);
        Ok(())
    }
}

/// Everything currently sitting in the receiver, without waiting.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Lets spawned tasks run up to their next suspension point.
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
