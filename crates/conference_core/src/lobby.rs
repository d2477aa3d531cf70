//! Knocking-participant lifecycle and moderator/attendee lobby chat.
//!
//! Admission decisions are forwarded to the conference and never applied
//! locally: a participant leaves the knocking set only when the engine
//! reports it gone. This keeps concurrent moderators from racing each other.

use std::{collections::HashMap, sync::Arc};

use conference_integration::{ConferenceSession, LobbyMemberUpdate};
use futures::future::join_all;
use shared::{
    domain::ParticipantId,
    error::{CoreError, ErrorCode},
    protocol::{LobbyChatParty, LobbyMessage},
};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    chat::{ChatLog, ChatMessage, ChatMessageKind, ChatParticipant, ComposeTarget},
    CoreEvent, Notification,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnockingParticipant {
    pub id: ParticipantId,
    pub name: String,
    pub email: Option<String>,
    pub chatting_with_moderator: Option<ParticipantId>,
}

impl KnockingParticipant {
    fn chat_participant(&self) -> ChatParticipant {
        ChatParticipant {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyChatSession {
    pub moderator: ChatParticipant,
    pub attendee: ChatParticipant,
    pub active: bool,
}

/// Where the local participant stands with respect to the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LobbyPhase {
    #[default]
    Idle,
    Knocking,
    ChattingWithModerator {
        moderator: ParticipantId,
    },
    Admitted,
    Rejected,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyInput {
    Knock,
    ChatOpened { moderator: ParticipantId },
    ChatClosed,
    AccessGranted,
    AccessDenied,
    Leave,
}

impl LobbyPhase {
    pub fn is_chatting_with(&self, moderator_id: &ParticipantId) -> bool {
        matches!(self, LobbyPhase::ChattingWithModerator { moderator } if moderator == moderator_id)
    }

    pub fn next(&self, input: &LobbyInput) -> Result<LobbyPhase, CoreError> {
        use LobbyInput as I;
        use LobbyPhase as P;

        let next = match (self, input) {
            (P::Idle | P::Rejected | P::Left, I::Knock) => P::Knocking,
            (P::Knocking | P::ChattingWithModerator { .. }, I::ChatOpened { moderator }) => {
                P::ChattingWithModerator {
                    moderator: moderator.clone(),
                }
            }
            (P::ChattingWithModerator { .. }, I::ChatClosed) => P::Knocking,
            (P::Idle | P::Knocking | P::ChattingWithModerator { .. }, I::AccessGranted) => {
                P::Admitted
            }
            (P::Knocking | P::ChattingWithModerator { .. }, I::AccessDenied) => P::Rejected,
            (P::Knocking | P::ChattingWithModerator { .. }, I::Leave) => P::Left,
            (phase, input) => {
                return Err(CoreError::invalid_transition(format!(
                    "{input:?} is not valid in lobby phase {phase:?}"
                )))
            }
        };
        Ok(next)
    }
}

#[derive(Default)]
struct LobbyState {
    phase: LobbyPhase,
    knocking: Vec<KnockingParticipant>,
    /// Keyed by attendee id; at most one pairing per attendee.
    sessions: HashMap<ParticipantId, LobbyChatSession>,
}

impl LobbyState {
    fn find_knocking_mut(&mut self, id: &ParticipantId) -> Option<&mut KnockingParticipant> {
        self.knocking.iter_mut().find(|participant| participant.id == *id)
    }

    fn find_knocking(&self, id: &ParticipantId) -> Option<&KnockingParticipant> {
        self.knocking.iter().find(|participant| participant.id == *id)
    }

    fn transition(&mut self, input: LobbyInput) -> Result<Option<LobbyPhase>, CoreError> {
        let next = self.phase.next(&input)?;
        if next == self.phase {
            return Ok(None);
        }
        self.phase = next.clone();
        Ok(Some(next))
    }
}

pub struct LobbyCoordinator {
    conference: Arc<dyn ConferenceSession>,
    chat: Arc<ChatLog>,
    events: broadcast::Sender<CoreEvent>,
    inner: Mutex<LobbyState>,
    message_listener: Mutex<Option<JoinHandle<()>>>,
}

impl LobbyCoordinator {
    pub fn new(
        conference: Arc<dyn ConferenceSession>,
        chat: Arc<ChatLog>,
        events: broadcast::Sender<CoreEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            conference,
            chat,
            events,
            inner: Mutex::new(LobbyState::default()),
            message_listener: Mutex::new(None),
        })
    }

    pub async fn phase(&self) -> LobbyPhase {
        self.inner.lock().await.phase.clone()
    }

    pub async fn knocking_participants(&self) -> Vec<KnockingParticipant> {
        self.inner.lock().await.knocking.clone()
    }

    pub async fn chat_session(&self, attendee: &ParticipantId) -> Option<LobbyChatSession> {
        self.inner.lock().await.sessions.get(attendee).cloned()
    }

    pub async fn is_message_listener_registered(&self) -> bool {
        self.message_listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn emit_knocking(&self, knocking: Vec<KnockingParticipant>) {
        let _ = self
            .events
            .send(CoreEvent::KnockingParticipantsChanged(knocking));
    }

    fn emit_phase(&self, phase: LobbyPhase) {
        let _ = self.events.send(CoreEvent::LobbyPhaseChanged(phase));
    }

    fn notify(&self, notification: Notification) {
        let _ = self.events.send(CoreEvent::Notification(notification));
    }

    pub async fn on_participant_arrived_or_updated(&self, update: LobbyMemberUpdate) {
        let (arrived, snapshot) = {
            let mut guard = self.inner.lock().await;
            let arrived = match guard.find_knocking_mut(&update.id) {
                Some(existing) => {
                    let mut changed = false;
                    if let Some(name) = update.name.as_ref().filter(|name| **name != existing.name) {
                        existing.name = name.clone();
                        changed = true;
                    }
                    if update.email.is_some() && update.email != existing.email {
                        existing.email = update.email.clone();
                        changed = true;
                    }
                    if !changed {
                        return;
                    }
                    None
                }
                None => {
                    let participant = KnockingParticipant {
                        id: update.id.clone(),
                        name: update.name.clone().unwrap_or_default(),
                        email: update.email.clone(),
                        chatting_with_moderator: None,
                    };
                    guard.knocking.push(participant.clone());
                    Some(participant)
                }
            };
            (arrived, guard.knocking.clone())
        };
        self.emit_knocking(snapshot);

        if let Some(participant) = arrived {
            info!(participant_id = %participant.id, "lobby: participant knocking");
            if self.conference.local_participant().is_moderator() {
                self.notify(Notification::ParticipantKnocking {
                    participant: participant.chat_participant(),
                });
            }
        }
    }

    /// A knocking participant or a conference member is gone. Ends every
    /// lobby chat it took part in and tells the surviving side.
    pub async fn on_participant_left(&self, id: &ParticipantId) {
        let local = self.conference.local_participant();

        let (removed, ended_attendee_chat, orphaned, local_chat_closed, snapshot) = {
            let mut guard = self.inner.lock().await;

            let before = guard.knocking.len();
            guard.knocking.retain(|participant| participant.id != *id);
            let removed = guard.knocking.len() != before;

            let ended_attendee_chat = guard
                .sessions
                .get_mut(id)
                .filter(|session| session.active)
                .map(|session| {
                    session.active = false;
                    session.clone()
                });

            let mut orphaned = Vec::new();
            for session in guard.sessions.values_mut() {
                if session.active && session.moderator.id == *id {
                    session.active = false;
                    orphaned.push(session.clone());
                }
            }
            for session in &orphaned {
                if let Some(participant) = guard.find_knocking_mut(&session.attendee.id) {
                    participant.chatting_with_moderator = None;
                }
            }

            let local_chat_closed = if guard.phase.is_chatting_with(id) {
                guard.transition(LobbyInput::ChatClosed).ok().flatten()
            } else {
                None
            };

            (
                removed,
                ended_attendee_chat,
                orphaned,
                local_chat_closed,
                guard.knocking.clone(),
            )
        };

        if removed || !orphaned.is_empty() {
            self.emit_knocking(snapshot);
        }
        if removed {
            info!(participant_id = %id, "lobby: knocking participant left");
        }

        if let Some(session) = ended_attendee_chat {
            if session.moderator.id == local.id {
                self.chat.clear_lobby_chat_target(Some(id)).await;
                self.notify(Notification::LobbyChatEnded {
                    with: session.attendee,
                });
            }
        }

        if local.is_moderator() {
            for session in &orphaned {
                if session.attendee.id == local.id {
                    continue;
                }
                let message = LobbyMessage::ModeratorInChatWithLeft {
                    moderator_id: id.clone(),
                };
                if let Err(err) = self
                    .conference
                    .send_lobby_message(message, Some(&session.attendee.id))
                    .await
                {
                    CoreError::transport(format!("{err:#}")).log("lobby.moderator_left");
                }
            }
        }

        if let Some(phase) = local_chat_closed {
            self.close_local_chat(id).await;
            self.emit_phase(phase);
        }
    }

    async fn close_local_chat(&self, moderator_id: &ParticipantId) {
        let moderator = self.resolve_chat_participant(moderator_id).await;
        self.chat.clear_lobby_chat_target(Some(moderator_id)).await;
        self.notify(Notification::LobbyChatEnded { with: moderator });
    }

    pub async fn approve(&self, id: &ParticipantId) {
        self.set_knocking_participant_approval(id, true).await;
    }

    pub async fn reject(&self, id: &ParticipantId) {
        self.set_knocking_participant_approval(id, false).await;
    }

    /// Approvals go out independently; one failing does not hold up the rest.
    pub async fn admit_multiple(&self, ids: &[ParticipantId]) {
        join_all(ids.iter().map(|id| self.approve(id))).await;
    }

    async fn set_knocking_participant_approval(&self, id: &ParticipantId, approved: bool) {
        if self.inner.lock().await.find_knocking(id).is_none() {
            CoreError::stale_reference(format!("participant {id} is not in the knocking set"))
                .log("lobby.approval");
        }

        let result = if approved {
            self.conference.lobby_approve_access(id).await
        } else {
            self.conference.lobby_deny_access(id).await
        };

        match result {
            Ok(()) => info!(participant_id = %id, approved, "lobby: admission decision sent"),
            Err(err) => CoreError::transport(format!("{err:#}")).log("lobby.approval"),
        }
    }

    pub async fn set_lobby_enabled(&self, enabled: bool) {
        if !self.conference.local_participant().is_moderator() {
            CoreError::unauthorized("only moderators can toggle the lobby").log("lobby.toggle");
            return;
        }
        let result = if enabled {
            self.conference.enable_lobby().await
        } else {
            self.conference.disable_lobby().await
        };
        match result {
            Ok(()) => info!(enabled, "lobby: lobby mode change requested"),
            Err(err) => CoreError::transport(format!("{err:#}")).log("lobby.toggle"),
        }
    }

    pub async fn start_knocking(self: &Arc<Self>) {
        let local = self.conference.local_participant();
        let phase = {
            let mut guard = self.inner.lock().await;
            match guard.transition(LobbyInput::Knock) {
                Ok(phase) => phase,
                Err(err) => {
                    err.log("lobby.start_knocking");
                    return;
                }
            }
        };
        if let Some(phase) = phase {
            self.emit_phase(phase);
        }

        if let Err(err) = self
            .conference
            .join_lobby(&local.name, local.email.as_deref())
            .await
        {
            CoreError::transport(format!("{err:#}")).log("lobby.start_knocking");
        }
        info!(participant_id = %local.id, "lobby: knocking");

        self.register_message_listener().await;
    }

    pub async fn cancel_knocking(&self) {
        let phase = {
            let mut guard = self.inner.lock().await;
            match guard.transition(LobbyInput::Leave) {
                Ok(phase) => phase,
                Err(err) => {
                    err.log("lobby.cancel_knocking");
                    return;
                }
            }
        };
        self.chat.clear_lobby_chat_target(None).await;
        if let Some(phase) = phase {
            self.emit_phase(phase);
        }
        self.end_session().await;
    }

    pub async fn on_conference_joined(self: &Arc<Self>) {
        self.on_access_granted().await;
        self.register_message_listener().await;
    }

    pub async fn on_access_granted(&self) {
        let phase = self.inner.lock().await.transition(LobbyInput::AccessGranted);
        match phase {
            Ok(Some(phase)) => {
                self.chat.clear_lobby_chat_target(None).await;
                info!("lobby: access granted");
                self.emit_phase(phase);
            }
            Ok(None) => {}
            Err(err) => err.log("lobby.access_granted"),
        }
    }

    pub async fn on_access_denied(&self) {
        let phase = self.inner.lock().await.transition(LobbyInput::AccessDenied);
        match phase {
            Ok(Some(phase)) => {
                self.chat.clear_lobby_chat_target(None).await;
                info!("lobby: access denied");
                self.emit_phase(phase);
                self.notify(Notification::KnockingRejected);
            }
            Ok(None) => {}
            Err(err) => err.log("lobby.access_denied"),
        }
    }

    /// Subscribes to inbound lobby messages. Only one subscription lives per
    /// session; later calls are no-ops until [`Self::end_session`].
    pub async fn register_message_listener(self: &Arc<Self>) -> bool {
        let mut guard = self.message_listener.lock().await;
        if guard.as_ref().is_some_and(|task| !task.is_finished()) {
            CoreError::new(
                ErrorCode::DuplicateRegistration,
                "lobby message listener already registered",
            )
            .log("lobby.register_listener");
            return false;
        }

        let mut messages = self.conference.subscribe_lobby_messages();
        let coordinator = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(inbound) => {
                        coordinator
                            .on_lobby_message(inbound.message, inbound.sender_id)
                            .await
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lobby: message listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
        debug!("lobby: message listener registered");
        true
    }

    pub async fn on_lobby_message(&self, message: LobbyMessage, sender_id: ParticipantId) {
        debug!(kind = message.type_name(), %sender_id, "lobby: message received");
        match message {
            LobbyMessage::ChatMessage { message } => {
                self.on_lobby_chat_message(message, sender_id).await
            }
            LobbyMessage::ChatInitialized {
                moderator,
                attendee,
            } => self.on_lobby_chat_initialized(moderator, attendee).await,
            LobbyMessage::ModeratorInChatWithLeft { moderator_id } => {
                self.on_moderator_in_chat_with_left(&moderator_id).await
            }
        }
    }

    async fn on_lobby_chat_message(&self, text: String, sender_id: ParticipantId) {
        let local = self.conference.local_participant();
        let sender = self.resolve_chat_participant(&sender_id).await;
        self.chat
            .append(
                ChatMessage::new(ChatMessageKind::LobbyChat, sender, text)
                    .to(ChatParticipant::from(&local))
                    .incoming(),
            )
            .await;
    }

    async fn on_lobby_chat_initialized(&self, moderator: LobbyChatParty, attendee: LobbyChatParty) {
        let local = self.conference.local_participant();

        let (already_recorded, attendee_knocking, phase, snapshot) = {
            let mut guard = self.inner.lock().await;
            let previous = guard.sessions.insert(
                attendee.id.clone(),
                LobbyChatSession {
                    moderator: moderator.clone().into(),
                    attendee: attendee.clone().into(),
                    active: true,
                },
            );
            let already_recorded = match previous.filter(|session| session.active) {
                Some(session) if session.moderator.id == moderator.id => true,
                Some(session) => {
                    warn!(
                        attendee_id = %attendee.id,
                        previous_moderator = %session.moderator.id,
                        moderator_id = %moderator.id,
                        "lobby: chat pairing replaced by a later moderator"
                    );
                    false
                }
                None => false,
            };

            let attendee_knocking = match guard.find_knocking_mut(&attendee.id) {
                Some(participant) => {
                    participant.chatting_with_moderator = Some(moderator.id.clone());
                    true
                }
                None => false,
            };

            let phase = if attendee.id == local.id {
                match guard.transition(LobbyInput::ChatOpened {
                    moderator: moderator.id.clone(),
                }) {
                    Ok(phase) => phase,
                    Err(err) => {
                        err.log("lobby.chat_initialized");
                        None
                    }
                }
            } else {
                None
            };

            (already_recorded, attendee_knocking, phase, guard.knocking.clone())
        };

        if attendee_knocking {
            self.emit_knocking(snapshot);
        }

        if let Some(phase) = phase {
            self.chat
                .set_compose_target(ComposeTarget::LobbyChat(moderator.clone().into()))
                .await;
            info!(moderator_id = %moderator.id, "lobby: moderator opened chat");
            self.emit_phase(phase);
        }

        if local.is_moderator() && local.id != moderator.id && attendee_knocking && !already_recorded
        {
            self.notify(Notification::LobbyChatStarted {
                moderator: moderator.name,
                attendee: attendee.name,
            });
        }
    }

    async fn on_moderator_in_chat_with_left(&self, moderator_id: &ParticipantId) {
        let (phase, dropped, snapshot) = {
            let mut guard = self.inner.lock().await;

            let phase = if guard.phase.is_chatting_with(moderator_id) {
                guard.transition(LobbyInput::ChatClosed).ok().flatten()
            } else {
                None
            };

            let mut dropped = false;
            for session in guard.sessions.values_mut() {
                if session.active && session.moderator.id == *moderator_id {
                    session.active = false;
                    dropped = true;
                }
            }
            for participant in guard.knocking.iter_mut() {
                if participant.chatting_with_moderator.as_ref() == Some(moderator_id) {
                    participant.chatting_with_moderator = None;
                    dropped = true;
                }
            }

            (phase, dropped, guard.knocking.clone())
        };

        if dropped {
            self.emit_knocking(snapshot);
        }
        if let Some(phase) = phase {
            info!(moderator_id = %moderator_id, "lobby: moderator left the chat");
            self.close_local_chat(moderator_id).await;
            self.emit_phase(phase);
        }
    }

    /// Moderator opens a private chat with a knocking participant.
    pub async fn start_lobby_chat(&self, attendee_id: &ParticipantId) {
        let local = self.conference.local_participant();
        if !local.is_moderator() {
            CoreError::unauthorized("only moderators can start a lobby chat")
                .log("lobby.start_chat");
            return;
        }

        let attendee = self
            .inner
            .lock()
            .await
            .find_knocking(attendee_id)
            .map(KnockingParticipant::chat_participant);
        let Some(attendee) = attendee else {
            CoreError::stale_reference(format!("participant {attendee_id} is not knocking"))
                .log("lobby.start_chat");
            return;
        };

        let message = LobbyMessage::ChatInitialized {
            moderator: LobbyChatParty::from(&local),
            attendee: LobbyChatParty::from(&attendee),
        };
        self.on_lobby_message(message.clone(), local.id.clone()).await;
        self.chat
            .set_compose_target(ComposeTarget::LobbyChat(attendee))
            .await;

        if let Err(err) = self.conference.send_lobby_message(message, None).await {
            CoreError::transport(format!("{err:#}")).log("lobby.start_chat");
        }
    }

    pub async fn send_lobby_chat_message(&self, text: &str) {
        let Some(counterpart) = self.chat.compose_target().await.lobby_chat().cloned() else {
            CoreError::invalid_transition("no lobby chat is open").log("lobby.send_chat");
            return;
        };
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let message = LobbyMessage::ChatMessage {
            message: text.to_string(),
        };
        if let Err(err) = self
            .conference
            .send_lobby_message(message, Some(&counterpart.id))
            .await
        {
            CoreError::transport(format!("{err:#}")).log("lobby.send_chat");
        }

        let local = self.conference.local_participant();
        self.chat
            .append(
                ChatMessage::new(ChatMessageKind::LobbyChat, ChatParticipant::from(&local), text)
                    .to(counterpart),
            )
            .await;
    }

    /// Moderator closes the lobby chat they have open.
    pub async fn close_lobby_chat(&self) {
        let local = self.conference.local_participant();
        let Some(attendee) = self.chat.compose_target().await.lobby_chat().cloned() else {
            return;
        };
        if !local.is_moderator() {
            CoreError::invalid_transition("attendees cannot close a lobby chat")
                .log("lobby.close_chat");
            return;
        }

        let snapshot = {
            let mut guard = self.inner.lock().await;
            if let Some(session) = guard.sessions.get_mut(&attendee.id) {
                if session.moderator.id == local.id {
                    session.active = false;
                }
            }
            if let Some(participant) = guard.find_knocking_mut(&attendee.id) {
                if participant.chatting_with_moderator.as_ref() == Some(&local.id) {
                    participant.chatting_with_moderator = None;
                }
            }
            guard.knocking.clone()
        };
        self.emit_knocking(snapshot);

        let message = LobbyMessage::ModeratorInChatWithLeft {
            moderator_id: local.id.clone(),
        };
        if let Err(err) = self
            .conference
            .send_lobby_message(message, Some(&attendee.id))
            .await
        {
            CoreError::transport(format!("{err:#}")).log("lobby.close_chat");
        }

        self.chat.clear_lobby_chat_target(Some(&attendee.id)).await;
        self.chat.remove_lobby_conversation(&attendee.id).await;
    }

    /// Tears down the lobby message subscription and forgets the session's
    /// knocking set and chat pairings.
    pub async fn end_session(&self) {
        if let Some(task) = self.message_listener.lock().await.take() {
            task.abort();
        }
        let had_knocking = {
            let mut guard = self.inner.lock().await;
            guard.sessions.clear();
            let had_knocking = !guard.knocking.is_empty();
            guard.knocking.clear();
            had_knocking
        };
        if had_knocking {
            self.emit_knocking(Vec::new());
        }
    }

    async fn resolve_chat_participant(&self, id: &ParticipantId) -> ChatParticipant {
        {
            let guard = self.inner.lock().await;
            if let Some(participant) = guard.find_knocking(id) {
                return participant.chat_participant();
            }
            if let Some(session) = guard
                .sessions
                .values()
                .find(|session| session.moderator.id == *id)
            {
                return session.moderator.clone();
            }
        }
        match self.conference.participant(id) {
            Some(info) => ChatParticipant::from(&info),
            None => ChatParticipant {
                id: id.clone(),
                name: id.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[path = "tests/lobby_tests.rs"]
mod tests;
