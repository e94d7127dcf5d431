//! Application configuration
//!
//! Loaded from `config.toml` in the platform configuration directory.
//! Every section has defaults, so a missing or partial file still yields a
//! usable configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::Error;
use crate::protocol::Framing;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub audio: AudioConfig,
    pub presentation: PresentationConfig,
    pub session: SessionConfig,
    pub ui: UiConfig,
}

/// Tracking backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket URL of the tracking service
    pub endpoint: String,
    /// `socket_io` for a Socket.IO server, `json` for plain JSON frames
    pub framing: Framing,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            framing: Framing::default(),
        }
    }
}

/// Playback graph parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Audio file played by the graph
    pub media_path: PathBuf,
    /// Output device id (`output:<name>`); empty selects the default device
    pub output_device: String,
    /// Length of pan and gain ramps in milliseconds
    pub ramp_ms: u32,
    /// Volume applied at startup, 0..=100
    pub initial_volume: f32,
    /// Loop the media when it reaches the end
    pub looped: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            media_path: PathBuf::from("song.mp3"),
            output_device: String::new(),
            ramp_ms: DEFAULT_RAMP_MS,
            initial_volume: 100.0,
            looped: true,
        }
    }
}

impl AudioConfig {
    pub fn ramp(&self) -> Duration {
        Duration::from_millis(self.ramp_ms as u64)
    }
}

/// Display behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// How long the calibration banner stays visible
    pub notification_ms: u64,
    /// |pan| below this shows the neutral meter colour
    pub neutral_band: f64,
    /// Camera previews closer together than this are dropped
    pub preview_interval_ms: u64,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            notification_ms: DEFAULT_NOTIFICATION_MS,
            neutral_band: DEFAULT_NEUTRAL_BAND,
            preview_interval_ms: DEFAULT_PREVIEW_INTERVAL_MS,
        }
    }
}

impl PresentationConfig {
    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }

    pub fn preview_interval(&self) -> Duration {
        Duration::from_millis(self.preview_interval_ms)
    }
}

/// How camera permission requests are answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionPolicy {
    /// Always grant
    #[default]
    Grant,
    /// Always deny
    Deny,
    /// Grant only if a capture device is present
    Device,
}

/// Session controller behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub camera_permission: PermissionPolicy,
}

/// Dashboard server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "headpan", "head-pan-player")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Load from the default location, writing defaults if no file exists
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            tracing::warn!("No configuration directory available, using defaults");
            return Self::default();
        };

        if path.exists() {
            match Self::from_file(&path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Ignoring invalid configuration {}: {}", path.display(), e);
                    return Self::default();
                }
            }
        }

        let config = Self::default();
        if let Err(e) = config.save(&path) {
            tracing::warn!("Could not write default configuration: {}", e);
        } else {
            tracing::info!("Wrote default configuration to {}", path.display());
        }
        config
    }

    /// Reject values the rest of the system cannot honour
    pub fn validate(&self) -> Result<(), Error> {
        if self.connection.endpoint.is_empty() {
            return Err(Error::Config("connection.endpoint is empty".into()));
        }
        if !(0.0..=100.0).contains(&self.audio.initial_volume) {
            return Err(Error::Config(format!(
                "audio.initial_volume must be within 0..=100, got {}",
                self.audio.initial_volume
            )));
        }
        if !(0.0..=1.0).contains(&self.presentation.neutral_band) {
            return Err(Error::Config(format!(
                "presentation.neutral_band must be within 0..=1, got {}",
                self.presentation.neutral_band
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.audio.ramp(), Duration::from_millis(100));
        assert_eq!(config.presentation.notification_duration(), Duration::from_secs(2));
        assert_eq!(config.session.camera_permission, PermissionPolicy::Grant);
        assert_eq!(config.connection.framing, Framing::SocketIo);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [connection]
            endpoint = "ws://tracker.local:5000/ws"
            framing = "json"

            [audio]
            ramp_ms = 250

            [session]
            camera_permission = "deny"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.endpoint, "ws://tracker.local:5000/ws");
        assert_eq!(config.connection.framing, Framing::Json);
        assert_eq!(config.audio.ramp_ms, 250);
        assert!(config.audio.looped);
        assert_eq!(config.session.camera_permission, PermissionPolicy::Deny);
        assert_eq!(config.ui.http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_invalid_volume_rejected() {
        let result = AppConfig::from_toml("[audio]\ninitial_volume = 150.0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_roundtrip_keeps_policy() {
        let mut config = AppConfig::default();
        config.session.camera_permission = PermissionPolicy::Device;
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.session.camera_permission, PermissionPolicy::Device);
    }
}
