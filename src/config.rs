use crate::playback::reconnect::DEFAULT_MAX_ATTEMPTS;
use crate::playback::surface::HandoffMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_VOLUME: u8 = 80;
pub const DEFAULT_NETWORK_CACHING_MS: u32 = 1000;

/// Settings the controller consumes from the surrounding application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Retry cap for automatic reconnection, changeable at runtime
    pub max_reconnect_attempts: u32,
    pub volume: u8,
    pub muted: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            volume: DEFAULT_VOLUME,
            muted: false,
        }
    }
}

/// Application configuration
/// In debug builds: loads a .env file first, then reads the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub player: PlayerSettings,
    /// Engine network buffer for every session
    pub network_caching_ms: u32,
    pub handoff_mode: HandoffMode,
    /// Where the watch history is kept
    pub history_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            player: PlayerSettings::default(),
            network_caching_ms: DEFAULT_NETWORK_CACHING_MS,
            handoff_mode: HandoffMode::default(),
            history_path: default_history_path(),
        }
    }
}

impl Config {
    /// Load configuration based on build mode
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                info!("Config: Dev mode activated - loaded .env file");
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults and
    /// unparsable ones log a warning and keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(attempts) = parse_var(&lookup, "TUNER_MAX_RECONNECT_ATTEMPTS") {
            config.player.max_reconnect_attempts = attempts;
        }
        if let Some(volume) = parse_var::<u32, _>(&lookup, "TUNER_VOLUME") {
            config.player.volume = volume.min(100) as u8;
        }
        if let Some(muted) = lookup("TUNER_MUTED") {
            config.player.muted = matches!(muted.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(caching) = parse_var(&lookup, "TUNER_NETWORK_CACHING_MS") {
            config.network_caching_ms = caching;
        }
        if let Some(mode) = lookup("TUNER_HANDOFF_MODE") {
            match mode.to_lowercase().as_str() {
                "transfer" => config.handoff_mode = HandoffMode::Transfer,
                "recreate" => config.handoff_mode = HandoffMode::Recreate,
                other => warn!("Config: Unknown TUNER_HANDOFF_MODE '{}', using transfer", other),
            }
        }
        if let Some(path) = lookup("TUNER_HISTORY_PATH") {
            config.history_path = Some(PathBuf::from(path));
        }

        info!(
            "Config: max reconnect attempts {}, volume {}{}, handoff {:?}",
            config.player.max_reconnect_attempts,
            config.player.volume,
            if config.player.muted { " (muted)" } else { "" },
            config.handoff_mode
        );

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Config: Ignoring invalid {}='{}'", key, raw);
            None
        }
    }
}

/// `<data dir>/tuner/history.json`
fn default_history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("tuner").join("history.json"))
}
