use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::error::CoreError;
use url::Url;

use crate::sounds::SoundThresholds;

pub const DEFAULT_CONFIG_FILE: &str = "conference.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub reaction_flush_delay: Duration,
    /// Upper bound on how long the first buffered reaction may wait. `None`
    /// keeps pure debounce semantics.
    pub reaction_max_buffer_age: Option<Duration>,
    pub reaction_display_ttl: Duration,
    pub sound_thresholds: SoundThresholds,
    pub sounds_enabled: bool,
    pub webhook_url: Option<String>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reaction_flush_delay: Duration::from_millis(500),
            reaction_max_buffer_age: None,
            reaction_display_ttl: Duration::from_millis(5000),
            sound_thresholds: SoundThresholds::default(),
            sounds_enabled: true,
            webhook_url: None,
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    reaction_flush_delay_ms: Option<u64>,
    reaction_max_buffer_age_ms: Option<u64>,
    reaction_display_ttl_ms: Option<u64>,
    sound_thresholds: Option<Vec<u32>>,
    sounds_enabled: Option<bool>,
    webhook_url: Option<String>,
    log_filter: Option<String>,
}

/// Defaults, then the TOML file (an explicit `path` must exist; otherwise
/// `conference.toml` is read when present), then `APP__*` environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut file_cfg = match path {
        Some(path) => read_file_settings(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            read_file_settings(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => FileSettings::default(),
    };
    apply_env_overrides(&mut file_cfg, |key| std::env::var(key).ok())?;
    let settings = build_settings(file_cfg)?;
    Ok(settings)
}

fn read_file_settings(path: &Path) -> Result<FileSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    parse_file_settings(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
}

fn parse_file_settings(raw: &str) -> Result<FileSettings> {
    Ok(toml::from_str::<FileSettings>(raw)?)
}

fn apply_env_overrides(
    file_cfg: &mut FileSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = lookup("APP__REACTION_FLUSH_DELAY_MS") {
        file_cfg.reaction_flush_delay_ms =
            Some(v.trim().parse().context("APP__REACTION_FLUSH_DELAY_MS")?);
    }
    if let Some(v) = lookup("APP__REACTION_MAX_BUFFER_AGE_MS") {
        file_cfg.reaction_max_buffer_age_ms =
            Some(v.trim().parse().context("APP__REACTION_MAX_BUFFER_AGE_MS")?);
    }
    if let Some(v) = lookup("APP__REACTION_DISPLAY_TTL_MS") {
        file_cfg.reaction_display_ttl_ms =
            Some(v.trim().parse().context("APP__REACTION_DISPLAY_TTL_MS")?);
    }
    if let Some(v) = lookup("APP__SOUND_THRESHOLDS") {
        let tiers = v
            .split(',')
            .map(|tier| tier.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .context("APP__SOUND_THRESHOLDS")?;
        file_cfg.sound_thresholds = Some(tiers);
    }
    if let Some(v) = lookup("APP__SOUNDS_ENABLED") {
        file_cfg.sounds_enabled = Some(v.trim().parse().context("APP__SOUNDS_ENABLED")?);
    }
    if let Some(v) = lookup("APP__WEBHOOK_URL") {
        file_cfg.webhook_url = Some(v);
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        file_cfg.log_filter = Some(v);
    }
    Ok(())
}

fn build_settings(file_cfg: FileSettings) -> Result<Settings, CoreError> {
    let mut settings = Settings::default();

    if let Some(ms) = file_cfg.reaction_flush_delay_ms {
        if ms == 0 {
            return Err(CoreError::validation("reaction_flush_delay_ms must be positive"));
        }
        settings.reaction_flush_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = file_cfg.reaction_max_buffer_age_ms {
        let cap = Duration::from_millis(ms);
        if cap < settings.reaction_flush_delay {
            return Err(CoreError::validation(
                "reaction_max_buffer_age_ms must not be shorter than the flush delay",
            ));
        }
        settings.reaction_max_buffer_age = Some(cap);
    }
    if let Some(ms) = file_cfg.reaction_display_ttl_ms {
        settings.reaction_display_ttl = Duration::from_millis(ms);
    }
    if let Some(tiers) = file_cfg.sound_thresholds {
        settings.sound_thresholds = SoundThresholds::new(tiers)?;
    }
    if let Some(enabled) = file_cfg.sounds_enabled {
        settings.sounds_enabled = enabled;
    }
    if let Some(url) = file_cfg.webhook_url.filter(|url| !url.trim().is_empty()) {
        let parsed = Url::parse(url.trim())
            .map_err(|err| CoreError::validation(format!("invalid webhook_url: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CoreError::validation("webhook_url must use http or https"));
        }
        settings.webhook_url = Some(url.trim().to_string());
    }
    if let Some(filter) = file_cfg.log_filter {
        settings.log_filter = filter;
    }

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
