/// Broadcast transport configuration
///
/// Chosen once per transport: the layout in particular is fixed for the
/// lifetime of a `BroadcastTransport`.

use super::layout::{RadioLayout, EVENTMESH_COMPANY_ID};
use super::radio::{AdvertiseMode, AdvertiseSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Packet layout for both directions
    pub layout: RadioLayout,
    /// Settings for every broadcast request
    pub advertise: AdvertiseSettings,
    /// Only scan legacy advertisements
    pub scan_legacy_only: bool,
    /// Upper bound for the wait-for-grant variants (milliseconds)
    pub grant_wait_timeout_ms: u64,
    /// Buffered transport events per subscriber
    pub event_channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            layout: RadioLayout::ManufacturerData {
                company_id: EVENTMESH_COMPANY_ID,
            },
            advertise: AdvertiseSettings {
                mode: AdvertiseMode::LowLatency,
                connectable: false,
            },
            scan_legacy_only: false,
            grant_wait_timeout_ms: 30_000,
            event_channel_capacity: 64,
        }
    }
}

impl TransportConfig {
    pub fn with_layout(mut self, layout: RadioLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn grant_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.grant_wait_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.advertise.connectable {
            return Err(ConfigError::Invalid(
                "broadcast advertisements must not be connectable".to_string(),
            ));
        }
        if self.grant_wait_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "grant_wait_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: TransportConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TransportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layout, RadioLayout::manufacturer());
        assert_eq!(config.grant_wait_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_connectable_rejected() {
        let mut config = TransportConfig::default();
        config.advertise.connectable = true;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = TransportConfig {
            grant_wait_timeout_ms: 0,
            ..TransportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"layout":{"kind":"length_prefixed"}}"#).unwrap();
        assert_eq!(config.layout, RadioLayout::LengthPrefixed);
        assert_eq!(config.event_channel_capacity, 64);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transport.json");

        let config = TransportConfig::default().with_layout(RadioLayout::UuidServiceData);
        config.save(&path).unwrap();

        let loaded = TransportConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = TransportConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
