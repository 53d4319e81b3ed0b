// Configuration management for the EventMesh CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/eventmesh/config.json
// - Linux: ~/.config/eventmesh/config.json
// - Windows: %APPDATA%\eventmesh\config.json

use anyhow::{Context, Result};
use eventmesh_core::transport::ble::{AdvertiseMode, RadioLayout, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transport settings used by `simulate`
    pub transport: TransportConfig,

    /// Default tracing directive when RUST_LOG is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("eventmesh");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .transport
                .validate()
                .context("Config file holds an invalid transport section")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value in memory; the result must still validate
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        match key {
            "layout" => {
                let layout: RadioLayout = value.parse().map_err(anyhow::Error::msg)?;
                next.transport.layout = match (layout, self.transport.layout) {
                    // Re-selecting manufacturer data keeps the current company id
                    (
                        RadioLayout::ManufacturerData { .. },
                        RadioLayout::ManufacturerData { company_id },
                    ) => RadioLayout::ManufacturerData { company_id },
                    (layout, _) => layout,
                };
            }
            "company_id" => {
                let company_id = parse_u16(value).context("Invalid company id")?;
                match next.transport.layout {
                    RadioLayout::ManufacturerData { .. } => {
                        next.transport.layout = RadioLayout::ManufacturerData { company_id };
                    }
                    other => anyhow::bail!(
                        "company_id only applies to manufacturer data, layout is {}",
                        other
                    ),
                }
            }
            "advertise_mode" => {
                next.transport.advertise.mode = parse_mode(value)?;
            }
            "scan_legacy_only" => {
                next.transport.scan_legacy_only = value.parse().context("Invalid boolean value")?;
            }
            "grant_wait_timeout_ms" => {
                next.transport.grant_wait_timeout_ms = value.parse().context("Invalid number")?;
            }
            "event_channel_capacity" => {
                next.transport.event_channel_capacity = value.parse().context("Invalid number")?;
            }
            "log_level" => {
                next.log_level = value.to_string();
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        next.transport.validate()?;
        *self = next;
        Ok(())
    }

    /// Set a config value and persist it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let company_id = match self.transport.layout {
            RadioLayout::ManufacturerData { company_id } => format!("0x{:04X}", company_id),
            _ => "(n/a)".to_string(),
        };
        vec![
            ("layout".to_string(), layout_key(&self.transport.layout).to_string()),
            ("company_id".to_string(), company_id),
            ("advertise_mode".to_string(), mode_key(self.transport.advertise.mode).to_string()),
            ("scan_legacy_only".to_string(), self.transport.scan_legacy_only.to_string()),
            ("grant_wait_timeout_ms".to_string(), self.transport.grant_wait_timeout_ms.to_string()),
            ("event_channel_capacity".to_string(), self.transport.event_channel_capacity.to_string()),
            ("log_level".to_string(), self.log_level.clone()),
        ]
    }
}

fn layout_key(layout: &RadioLayout) -> &'static str {
    match layout {
        RadioLayout::UuidServiceData => "uuid",
        RadioLayout::ManufacturerData { .. } => "manufacturer",
        RadioLayout::LengthPrefixed => "length-prefixed",
    }
}

fn mode_key(mode: AdvertiseMode) -> &'static str {
    match mode {
        AdvertiseMode::LowPower => "low_power",
        AdvertiseMode::Balanced => "balanced",
        AdvertiseMode::LowLatency => "low_latency",
    }
}

fn parse_mode(value: &str) -> Result<AdvertiseMode> {
    match value {
        "low_power" => Ok(AdvertiseMode::LowPower),
        "balanced" => Ok(AdvertiseMode::Balanced),
        "low_latency" => Ok(AdvertiseMode::LowLatency),
        other => anyhow::bail!("Unknown advertise mode: {}", other),
    }
}

fn parse_u16(value: &str) -> Result<u16> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex_digits) => u16::from_str_radix(hex_digits, 16)?,
        None => value.parse()?,
    };
    Ok(parsed)
}
