use serde::{Deserialize, Serialize};

/// Application settings from `OBS Refresh Config.yaml`
///
/// Every field has a default so a missing file (or a partially filled one)
/// still yields a usable configuration. Environment variables prefixed with
/// `OBS_REFRESH` override file values, see [`crate::config::ConfigManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub obs: ObsSettings,
    pub refresh: RefreshSettings,
    pub debug_mode: bool,
}

/// Where and how to reach the obs-websocket server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsSettings {
    pub host: String,
    pub port: u16,

    /// Empty when the server has authentication disabled
    pub password: String,

    /// Socket read timeout for a single request/response exchange
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Mapping document, relative paths resolve against the config directory
    pub mapping_file: String,

    /// Interval pre-filled in the UI, in seconds
    pub default_interval: u64,

    /// Name of the input setting that holds the file path (`file` for image sources)
    pub path_field: String,
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
            password: String::new(),
            timeout_secs: 5,
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            mapping_file: "data.json".to_string(),
            default_interval: 1,
            path_field: "file".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            obs: ObsSettings::default(),
            refresh: RefreshSettings::default(),
            debug_mode: false,
        }
    }
}

impl ObsSettings {
    /// WebSocket URL of the obs-websocket server
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}
