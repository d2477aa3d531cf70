use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use conference_integration::{ConferenceSession, SoundPlayer, WebhookReporter};
use shared::{
    domain::{ParticipantId, ReactionKind},
    error::CoreError,
    protocol::{
        ConferenceCommand, EndpointMessage, InboundCommand, MuteReactionsAttributes,
        ReactionsWebhookPayload,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    chat::{ChatLog, ChatMessage, ChatMessageKind, ChatParticipant},
    config::Settings,
    moderation::authorize_command_sender,
    sounds::{sound_cues, SoundThresholds},
    CoreEvent, Notification,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionSettings {
    pub sounds_enabled: bool,
    pub start_reactions_muted: bool,
}

/// A reaction on its way across the screen. Expires on its own timer,
/// independent of when the batch it came from went out on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionQueueEntry {
    pub id: Uuid,
    pub kind: ReactionKind,
    pub order: u64,
    pub sender: Option<ParticipantId>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReactionConfig {
    pub flush_delay: Duration,
    pub max_buffer_age: Option<Duration>,
    pub display_ttl: Duration,
    pub thresholds: SoundThresholds,
}

impl From<&Settings> for ReactionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            flush_delay: settings.reaction_flush_delay,
            max_buffer_age: settings.reaction_max_buffer_age,
            display_ttl: settings.reaction_display_ttl,
            thresholds: settings.sound_thresholds.clone(),
        }
    }
}

struct ReactionState {
    buffer: Vec<ReactionKind>,
    buffer_started_at: Option<Instant>,
    flush_generation: u64,
    pending_flush: Option<JoinHandle<()>>,
    queue: Vec<ReactionQueueEntry>,
    next_order: u64,
    settings: ReactionSettings,
    sounds_notification_shown: bool,
}

impl ReactionState {
    fn take_buffer(&mut self) -> Vec<ReactionKind> {
        self.buffer_started_at = None;
        std::mem::take(&mut self.buffer)
    }
}

pub struct ReactionAggregator {
    conference: Arc<dyn ConferenceSession>,
    sounds: Arc<dyn SoundPlayer>,
    webhook: Option<Arc<dyn WebhookReporter>>,
    chat: Arc<ChatLog>,
    events: broadcast::Sender<CoreEvent>,
    config: ReactionConfig,
    inner: Mutex<ReactionState>,
}

pub fn reaction_summary(batch: &[ReactionKind]) -> String {
    batch.iter().map(|kind| kind.emoji()).collect()
}

impl ReactionAggregator {
    pub fn new(
        conference: Arc<dyn ConferenceSession>,
        sounds: Arc<dyn SoundPlayer>,
        webhook: Option<Arc<dyn WebhookReporter>>,
        chat: Arc<ChatLog>,
        events: broadcast::Sender<CoreEvent>,
        config: ReactionConfig,
        sounds_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            conference,
            sounds,
            webhook,
            chat,
            events,
            config,
            inner: Mutex::new(ReactionState {
                buffer: Vec::new(),
                buffer_started_at: None,
                flush_generation: 0,
                pending_flush: None,
                queue: Vec::new(),
                next_order: 0,
                settings: ReactionSettings {
                    sounds_enabled,
                    start_reactions_muted: false,
                },
                sounds_notification_shown: false,
            }),
        })
    }

    /// Buffers `kind` and pushes the flush deadline out by the configured
    /// delay, replacing any flush that was already scheduled.
    pub async fn add_reaction(self: &Arc<Self>, kind: ReactionKind) {
        let mut guard = self.inner.lock().await;
        guard.buffer.push(kind);

        let now = Instant::now();
        let started_at = *guard.buffer_started_at.get_or_insert(now);
        let mut deadline = now + self.config.flush_delay;
        if let Some(cap) = self.config.max_buffer_age {
            deadline = deadline.min(started_at + cap);
        }

        guard.flush_generation += 1;
        let generation = guard.flush_generation;
        if let Some(previous) = guard.pending_flush.take() {
            previous.abort();
        }

        let aggregator = Arc::clone(self);
        guard.pending_flush = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            aggregator.flush_if_current(generation).await;
        }));

        debug!(
            reaction = %kind,
            buffered = guard.buffer.len(),
            "reactions: buffered reaction"
        );
    }

    async fn flush_if_current(self: &Arc<Self>, generation: u64) {
        let batch = {
            let mut guard = self.inner.lock().await;
            if guard.flush_generation != generation {
                return;
            }
            guard.pending_flush = None;
            guard.take_buffer()
        };
        self.dispatch_batch(batch).await;
    }

    /// Flushes immediately, cancelling the pending timer.
    pub async fn flush(self: &Arc<Self>) {
        let batch = {
            let mut guard = self.inner.lock().await;
            if let Some(pending) = guard.pending_flush.take() {
                pending.abort();
            }
            guard.flush_generation += 1;
            guard.take_buffer()
        };
        self.dispatch_batch(batch).await;
    }

    async fn dispatch_batch(self: &Arc<Self>, batch: Vec<ReactionKind>) {
        if batch.is_empty() {
            return;
        }

        let local = self.conference.local_participant();
        let participant_count = self.conference.participant_count();
        if participant_count > 1 {
            let message = EndpointMessage::Reactions {
                reactions: batch.clone(),
                timestamp: Utc::now().timestamp_millis(),
            };
            if let Err(err) = self.conference.send_endpoint_message(message).await {
                CoreError::transport(format!("{err:#}")).log("reactions.send");
            }
        }

        self.chat
            .append(ChatMessage::new(
                ChatMessageKind::Reactions,
                ChatParticipant::from(&local),
                reaction_summary(&batch),
            ))
            .await;

        self.push_reactions(None, &batch).await;

        if let Some(webhook) = self.webhook.clone() {
            let payload = ReactionsWebhookPayload {
                participant_id: local.id.clone(),
                participant_name: local.name.clone(),
                reactions: batch.clone(),
                timestamp: Utc::now(),
            };
            tokio::spawn(async move {
                if let Err(err) = webhook.report_reactions(payload).await {
                    CoreError::transport(format!("{err:#}")).log("reactions.webhook");
                }
            });
        }

        info!(
            count = batch.len(),
            participant_count,
            "reactions: flushed buffer"
        );
    }

    /// Reactions another participant already flushed. Shown and sounded
    /// locally, never re-sent.
    pub async fn on_remote_reactions(
        self: &Arc<Self>,
        sender_id: ParticipantId,
        reactions: Vec<ReactionKind>,
    ) {
        if sender_id == self.conference.local_participant().id {
            debug!(%sender_id, "reactions: ignoring own endpoint echo");
            return;
        }
        self.push_reactions(Some(sender_id), &reactions).await;
    }

    async fn push_reactions(self: &Arc<Self>, sender: Option<ParticipantId>, batch: &[ReactionKind]) {
        if batch.is_empty() {
            return;
        }

        let (ids, snapshot) = {
            let mut guard = self.inner.lock().await;
            let mut ids = Vec::with_capacity(batch.len());
            for kind in batch {
                let entry = ReactionQueueEntry {
                    id: Uuid::new_v4(),
                    kind: *kind,
                    order: guard.next_order,
                    sender: sender.clone(),
                    added_at: Utc::now(),
                };
                guard.next_order += 1;
                ids.push(entry.id);
                guard.queue.push(entry);
            }
            (ids, guard.queue.clone())
        };
        let _ = self.events.send(CoreEvent::ReactionQueueUpdated(snapshot));

        let aggregator = Arc::clone(self);
        let ttl = self.config.display_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            aggregator.expire_queue_entries(&ids).await;
        });

        self.on_sound_thresholds(batch).await;
    }

    async fn expire_queue_entries(&self, ids: &[Uuid]) {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let before = guard.queue.len();
            guard.queue.retain(|entry| !ids.contains(&entry.id));
            if guard.queue.len() == before {
                return;
            }
            guard.queue.clone()
        };
        let _ = self.events.send(CoreEvent::ReactionQueueUpdated(snapshot));
    }

    /// Plays the highest crossed tier's sound once per kind in `batch`.
    pub async fn on_sound_thresholds(&self, batch: &[ReactionKind]) {
        let cues = sound_cues(batch, &self.config.thresholds);
        if cues.is_empty() {
            return;
        }

        let show_notification = {
            let mut guard = self.inner.lock().await;
            if !guard.settings.sounds_enabled {
                return;
            }
            let first = !guard.sounds_notification_shown;
            guard.sounds_notification_shown = true;
            first
        };

        for cue in &cues {
            if let Err(err) = self.sounds.play_sound(&cue.sound_id).await {
                CoreError::transport(format!("{err:#}")).log("reactions.play_sound");
            }
        }

        if show_notification {
            let offer_mute_for_everyone = self.conference.local_participant().is_moderator();
            let _ = self.events.send(CoreEvent::Notification(
                Notification::ReactionSoundsCanBeDisabled {
                    offer_mute_for_everyone,
                },
            ));
        }
    }

    pub async fn on_mute_reactions_command(&self, command: InboundCommand) {
        let ConferenceCommand::MuteReactions(attributes) = command.command;
        match authorize_command_sender(self.conference.as_ref(), command.sender_id.as_ref()) {
            Ok(sender) => {
                info!(
                    sender_id = %sender.id,
                    muted = attributes.start_reactions_muted,
                    "reactions: mute command accepted"
                );
                self.apply_start_reactions_muted(attributes.start_reactions_muted)
                    .await;
            }
            Err(err) => err.log("reactions.mute_command"),
        }
    }

    /// Moderator action: mute (or unmute) reaction sounds for everyone.
    pub async fn mute_reactions_for_everyone(&self, muted: bool) {
        let local = self.conference.local_participant();
        if !local.is_moderator() {
            CoreError::unauthorized("only moderators can mute reactions for everyone")
                .log("reactions.mute_for_everyone");
            return;
        }

        self.apply_start_reactions_muted(muted).await;
        let command = ConferenceCommand::MuteReactions(MuteReactionsAttributes {
            start_reactions_muted: muted,
        });
        if let Err(err) = self.conference.send_command(command).await {
            CoreError::transport(format!("{err:#}")).log("reactions.mute_for_everyone");
        }
    }

    /// Sets the start-muted flag and the sound toggle together. Returns
    /// whether anything changed.
    async fn apply_start_reactions_muted(&self, muted: bool) -> bool {
        let settings = {
            let mut guard = self.inner.lock().await;
            if guard.settings.start_reactions_muted == muted {
                return false;
            }
            guard.settings = ReactionSettings {
                start_reactions_muted: muted,
                sounds_enabled: !muted,
            };
            guard.settings
        };
        let _ = self.events.send(CoreEvent::ReactionSettingsChanged(settings));
        true
    }

    pub async fn set_sounds_enabled(&self, enabled: bool) {
        let settings = {
            let mut guard = self.inner.lock().await;
            if guard.settings.sounds_enabled == enabled {
                return;
            }
            guard.settings.sounds_enabled = enabled;
            guard.settings
        };
        let _ = self.events.send(CoreEvent::ReactionSettingsChanged(settings));
    }

    pub async fn settings(&self) -> ReactionSettings {
        self.inner.lock().await.settings
    }

    pub async fn pending_reactions(&self) -> Vec<ReactionKind> {
        self.inner.lock().await.buffer.clone()
    }

    pub async fn queue(&self) -> Vec<ReactionQueueEntry> {
        self.inner.lock().await.queue.clone()
    }
}

#[cfg(test)]
#[path = "tests/reactions_tests.rs"]
mod tests;
