use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::model::{TeamColor, WvwMap};

fn default_refresh_interval_ms() -> u64 {
    2000
}

fn default_full_refresh_every() -> u32 {
    4
}

fn default_notification_duration_secs() -> u64 {
    10
}

fn default_reset_notifications_interval_mins() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

/// User settings consulted by eligibility policies and by the engine's
/// interval/duration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base scheduler tick, milliseconds.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Full fetch+diff runs every Nth tick; cheap recomputes run every tick.
    #[serde(default = "default_full_refresh_every")]
    pub full_refresh_every: u32,
    /// Seconds a notification stays visible. 0 = sticky (only clears when
    /// eligibility later turns false).
    #[serde(default = "default_notification_duration_secs")]
    pub notification_duration_secs: u64,
    /// Minutes before a dismissed-and-reshown boundary can re-notify.
    #[serde(default = "default_reset_notifications_interval_mins")]
    pub reset_notifications_interval_mins: u64,

    // Home-affinity rules
    #[serde(default)]
    pub home_team: TeamColor,
    #[serde(default = "default_true")]
    pub notify_when_home_takes_objective: bool,
    #[serde(default = "default_true")]
    pub notify_when_home_loses_objective: bool,

    // Per-category enable flags
    #[serde(default = "default_true")]
    pub notify_world_bosses: bool,
    #[serde(default = "default_true")]
    pub notify_meta_events: bool,
    #[serde(default = "default_true")]
    pub notify_price_watches: bool,
    #[serde(default = "default_true")]
    pub notify_task_completion: bool,
    #[serde(default = "default_true")]
    pub notify_task_proximity: bool,

    /// Per-map opt-out for WvW notifications; empty = all maps enabled.
    #[serde(default)]
    pub disabled_wvw_maps: HashSet<WvwMap>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            full_refresh_every: default_full_refresh_every(),
            notification_duration_secs: default_notification_duration_secs(),
            reset_notifications_interval_mins: default_reset_notifications_interval_mins(),
            home_team: TeamColor::Neutral,
            notify_when_home_takes_objective: true,
            notify_when_home_loses_objective: true,
            notify_world_bosses: true,
            notify_meta_events: true,
            notify_price_watches: true,
            notify_task_completion: true,
            notify_task_proximity: true,
            disabled_wvw_maps: HashSet::new(),
        }
    }
}

impl Settings {
    /// Fallback used when the settings file exists but cannot be read or
    /// parsed: every notification category is disabled.
    pub fn safe_defaults() -> Self {
        Self {
            notify_when_home_takes_objective: false,
            notify_when_home_loses_objective: false,
            notify_world_bosses: false,
            notify_meta_events: false,
            notify_price_watches: false,
            notify_task_completion: false,
            notify_task_proximity: false,
            ..Self::default()
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_secs(self.notification_duration_secs)
    }

    pub fn reset_cooldown(&self) -> Duration {
        Duration::from_secs(self.reset_notifications_interval_mins * 60)
    }

    pub fn wvw_map_enabled(&self, map: WvwMap) -> bool {
        !self.disabled_wvw_maps.contains(&map)
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Load settings. A missing file is a fresh install and yields defaults;
    /// an unreadable or unparsable file yields safe defaults (all
    /// notifications disabled) so a corrupt file never re-enables spam.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            return Settings::default();
        }
        match fs::read_to_string(&self.config_path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!(
                        "Failed to parse settings at {:?}: {}; using safe defaults",
                        self.config_path,
                        e
                    );
                    Settings::safe_defaults()
                }
            },
            Err(e) => {
                log::warn!(
                    "Failed to read settings at {:?}: {}; using safe defaults",
                    self.config_path,
                    e
                );
                Settings::safe_defaults()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
