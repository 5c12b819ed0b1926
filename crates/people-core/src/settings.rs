//! People settings: defaults, per-field sanitization, and a watchable store.
//!
//! Settings persist as a camelCase JSON file. Loading never fails on bad
//! content; each field that does not validate falls back to its default.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

pub const SETTINGS_VERSION: u32 = 1;
pub const DEFAULT_DIRECTORY: &str = "People";
pub const DEFAULT_NOTIFICATION_CHECK_INTERVAL_MINUTES: u32 = 60;
pub const DEFAULT_NOTIFICATION_LEAD_TIME_HOURS: u32 = 24;

/// File name of the settings file inside a vault
pub const SETTINGS_FILE_NAME: &str = ".people-manager.json";

const CHECK_INTERVAL_RANGE: std::ops::RangeInclusive<u32> = 1..=1440;
const LEAD_TIME_RANGE: std::ops::RangeInclusive<u32> = 0..=168;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Frontmatter key names used for each person property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySettings {
    pub segment_prop: String,
    pub city_prop: String,
    pub original_city_prop: String,
    pub born_on_prop: String,
    pub first_contact_prop: String,
    pub second_contact_prop: String,
    pub last_contact_prop: String,
    pub contact_channel_prop: String,
    pub position_prop: String,
    pub status_prop: String,
    pub status_business_prop: String,
    pub told_about_business_prop: String,
    pub urgency_prop: String,
    pub likability_prop: String,
    pub social_energy_prop: String,
    pub reliability_prop: String,
    pub relationship_goal_prop: String,
    pub relationship_prop: String,
    pub ambitions_prop: String,
    pub dreams_prop: String,
    pub interests_prop: String,
    pub values_prop: String,
    pub personality_type_prop: String,
    pub next_step_prop: String,
    pub follow_up_date_prop: String,
    pub dates_prop: String,
    pub history_note_prop: String,
}

impl Default for PropertySettings {
    fn default() -> Self {
        Self {
            segment_prop: "segment".into(),
            city_prop: "city".into(),
            original_city_prop: "original-city".into(),
            born_on_prop: "born-on".into(),
            first_contact_prop: "first-contact".into(),
            second_contact_prop: "second-contact".into(),
            last_contact_prop: "last-contact".into(),
            contact_channel_prop: "contact-channel".into(),
            position_prop: "position".into(),
            status_prop: "status".into(),
            status_business_prop: "status-business".into(),
            told_about_business_prop: "told-about-business".into(),
            urgency_prop: "urgency".into(),
            likability_prop: "likability".into(),
            social_energy_prop: "social-energy".into(),
            reliability_prop: "reliability".into(),
            relationship_goal_prop: "relationship-goal".into(),
            relationship_prop: "relationship".into(),
            ambitions_prop: "ambitions".into(),
            dreams_prop: "dreams".into(),
            interests_prop: "interests".into(),
            values_prop: "values".into(),
            personality_type_prop: "personality-type".into(),
            next_step_prop: "next-step".into(),
            follow_up_date_prop: "follow-up-date-notification".into(),
            dates_prop: "dates".into(),
            history_note_prop: "history-note".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub version: u32,
    /// Scope directory of person notes; empty means the whole vault
    pub directory: String,
    pub enabled: bool,
    pub debug_mode: bool,
    pub enable_notifications: bool,
    pub notification_check_interval_minutes: u32,
    pub notification_lead_time_hours: u32,
    pub show_notification_on_startup: bool,
    #[serde(flatten)]
    pub props: PropertySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            directory: DEFAULT_DIRECTORY.into(),
            enabled: true,
            debug_mode: false,
            enable_notifications: true,
            notification_check_interval_minutes: DEFAULT_NOTIFICATION_CHECK_INTERVAL_MINUTES,
            notification_lead_time_hours: DEFAULT_NOTIFICATION_LEAD_TIME_HOURS,
            show_notification_on_startup: true,
            props: PropertySettings::default(),
        }
    }
}

impl Settings {
    /// Every numeric field within its accepted range
    pub fn is_valid(&self) -> bool {
        self.version >= 1
            && CHECK_INTERVAL_RANGE.contains(&self.notification_check_interval_minutes)
            && LEAD_TIME_RANGE.contains(&self.notification_lead_time_hours)
    }

    /// Build settings from arbitrary JSON, keeping defaults for invalid fields.
    ///
    /// Each provided key is tried on its own against the defaults, so one bad
    /// value never discards the others. Unknown keys are dropped.
    pub fn sanitize(value: &JsonValue) -> Self {
        let defaults = Self::default();
        let Some(input) = value.as_object() else {
            return defaults;
        };
        let Ok(JsonValue::Object(base)) = serde_json::to_value(&defaults) else {
            return defaults;
        };

        let mut merged = base.clone();
        for (key, candidate) in input {
            if !base.contains_key(key) {
                continue;
            }
            let mut trial = base.clone();
            trial.insert(key.clone(), candidate.clone());
            match serde_json::from_value::<Settings>(JsonValue::Object(trial)) {
                Ok(settings) if settings.is_valid() => {
                    merged.insert(key.clone(), candidate.clone());
                }
                _ => debug!("Ignoring invalid setting {}: {}", key, candidate),
            }
        }

        serde_json::from_value(JsonValue::Object(merged)).unwrap_or(defaults)
    }

    /// Scope directory with surrounding slashes removed
    pub fn scope_directory(&self) -> &str {
        obsidian_fs::normalize_directory(&self.directory)
    }
}

/// Shared, watchable settings.
///
/// Clones share the same value. Subscribers are notified only when a change
/// actually alters the settings.
#[derive(Clone)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<Settings>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(settings);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Apply a change; the result is re-sanitized before it is published.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Settings {
        self.tx.send_if_modified(|settings| {
            let mut next = settings.clone();
            change(&mut next);
            let next = match serde_json::to_value(&next) {
                Ok(value) => Settings::sanitize(&value),
                Err(_) => settings.clone(),
            };
            if next == *settings {
                return false;
            }
            *settings = next;
            true
        });
        self.current()
    }

    pub fn replace(&self, settings: Settings) {
        self.tx.send_if_modified(|current| {
            if *current == settings {
                return false;
            }
            *current = settings;
            true
        });
    }

    /// Read settings from a JSON file.
    ///
    /// A missing file yields defaults. Unparseable JSON is logged and yields defaults.
    pub async fn load(path: &Path) -> Result<Settings, ConfigError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        match serde_json::from_str::<JsonValue>(&content) {
            Ok(value) => Ok(Settings::sanitize(&value)),
            Err(e) => {
                warn!("Invalid settings file {}: {}. Using defaults", path.display(), e);
                Ok(Settings::default())
            }
        }
    }

    /// Reload from `path` and publish the result.
    pub async fn reload(&self, path: &Path) -> Result<Settings, ConfigError> {
        let settings = Self::load(path).await?;
        self.replace(settings.clone());
        Ok(settings)
    }

    /// Write the current settings as pretty JSON, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(&self.current())?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::write(path, json).await.map_err(write_err)
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
