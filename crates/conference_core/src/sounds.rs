use conference_integration::SoundPlayer;
use shared::{domain::ReactionKind, error::CoreError};
use tracing::{debug, warn};

pub const RAISE_HAND_SOUND_ID: &str = "RAISE_HAND_SOUND";
const RAISE_HAND_SOUND_FILE: &str = "reactions-raised-hand.mp3";
const DEFAULT_THRESHOLDS: [u32; 4] = [1, 5, 10, 20];

pub fn reaction_sound_id(kind: ReactionKind, tier: u32) -> String {
    format!("REACTION_SOUND_{}_{tier}", kind.as_str().to_ascii_uppercase())
}

fn reaction_sound_file(kind: ReactionKind, tier: u32) -> String {
    format!("reactions-{kind}-{tier}.mp3")
}

/// Ascending count boundaries selecting escalating sounds for a burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundThresholds(Vec<u32>);

impl SoundThresholds {
    pub fn new(tiers: Vec<u32>) -> Result<Self, CoreError> {
        if tiers.is_empty() {
            return Err(CoreError::validation("sound thresholds must not be empty"));
        }
        if tiers[0] == 0 {
            return Err(CoreError::validation("sound thresholds must start at 1 or above"));
        }
        if tiers.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CoreError::validation(format!(
                "sound thresholds must be strictly ascending, got {tiers:?}"
            )));
        }
        Ok(Self(tiers))
    }

    pub fn tiers(&self) -> &[u32] {
        &self.0
    }

    /// The largest tier not exceeding `count`.
    pub fn highest_crossed(&self, count: usize) -> Option<u32> {
        self.0
            .iter()
            .rev()
            .copied()
            .find(|tier| *tier as usize <= count)
    }
}

impl Default for SoundThresholds {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLDS.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundCue {
    pub kind: ReactionKind,
    pub tier: u32,
    pub sound_id: String,
}

/// One cue per distinct kind in `batch`, in first-appearance order.
pub fn sound_cues(batch: &[ReactionKind], thresholds: &SoundThresholds) -> Vec<SoundCue> {
    let mut counts: Vec<(ReactionKind, usize)> = Vec::new();
    for kind in batch {
        match counts.iter_mut().find(|(seen, _)| seen == kind) {
            Some((_, count)) => *count += 1,
            None => counts.push((*kind, 1)),
        }
    }

    counts
        .into_iter()
        .filter_map(|(kind, count)| {
            thresholds.highest_crossed(count).map(|tier| SoundCue {
                kind,
                tier,
                sound_id: reaction_sound_id(kind, tier),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundResource {
    pub id: String,
    pub file: String,
}

/// Every (kind, tier) reaction sound plus the raise-hand sound. Registered
/// once at application start and removed at shutdown.
pub struct SoundCatalog {
    resources: Vec<SoundResource>,
}

impl SoundCatalog {
    pub fn reactions(thresholds: &SoundThresholds) -> Self {
        let mut resources = Vec::with_capacity(ReactionKind::ALL.len() * thresholds.tiers().len() + 1);
        for kind in ReactionKind::ALL {
            for tier in thresholds.tiers() {
                resources.push(SoundResource {
                    id: reaction_sound_id(kind, *tier),
                    file: reaction_sound_file(kind, *tier),
                });
            }
        }
        resources.push(SoundResource {
            id: RAISE_HAND_SOUND_ID.to_string(),
            file: RAISE_HAND_SOUND_FILE.to_string(),
        });
        Self { resources }
    }

    pub fn resources(&self) -> &[SoundResource] {
        &self.resources
    }

    pub async fn register_all(&self, player: &dyn SoundPlayer) {
        for resource in &self.resources {
            if let Err(err) = player.register_sound(&resource.id, &resource.file).await {
                warn!(sound_id = %resource.id, "sounds: register failed: {err}");
            }
        }
        debug!(count = self.resources.len(), "sounds: catalog registered");
    }

    pub async fn unregister_all(&self, player: &dyn SoundPlayer) {
        for resource in &self.resources {
            if let Err(err) = player.unregister_sound(&resource.id).await {
                warn!(sound_id = %resource.id, "sounds: unregister failed: {err}");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/sounds_tests.rs"]
mod tests;
