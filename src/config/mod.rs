//! Configuration management for the slider bridge
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration file.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::dispatch::PublishMode;
use crate::reload::DEFAULT_RESET_DELAY_MS;
use crate::slider::{NoiseReduction, TrackerSettings, DEFAULT_SEPARATOR};
use crate::transport::http::DEFAULT_BIND_ADDRESS;
use crate::transport::{HttpLineSource, LineSource, StreamLineSource};

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub sliders: SliderConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Which transport delivers device lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Http,
    Stream,
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// Local endpoint address (http)
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Device address `host:port` (stream)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Line decoding and change detection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SliderConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_full_scale")]
    pub full_scale: f32,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub noise_reduction: NoiseReduction,
    /// Explicit tolerance in percent points, overrides `noise_reduction`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f32>,
    #[serde(default = "default_true")]
    pub snap_to_edges: bool,
}

/// Reload behaviour
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReloadConfig {
    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,
}

/// Event fan-out behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Per-subscriber publish deadline; blocking when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_timeout_ms: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            bind: default_bind(),
            address: None,
        }
    }
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            full_scale: default_full_scale(),
            invert: false,
            noise_reduction: NoiseReduction::default(),
            tolerance: None,
            snap_to_edges: true,
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            reset_delay_ms: default_reset_delay_ms(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty file means all defaults
        let config: BridgeConfig = if contents.trim().is_empty() {
            BridgeConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        match self.transport.kind {
            TransportKind::Http => {
                if self.transport.bind.is_empty() {
                    anyhow::bail!("transport.bind cannot be empty");
                }
            }
            TransportKind::Stream => match &self.transport.address {
                Some(address) if !address.is_empty() => {}
                _ => anyhow::bail!("transport.address is required for the stream transport"),
            },
        }

        if self.sliders.separator.is_empty() {
            anyhow::bail!("sliders.separator cannot be empty");
        }
        if !(self.sliders.full_scale.is_finite() && self.sliders.full_scale > 0.0) {
            anyhow::bail!(
                "sliders.full_scale must be a positive number (got {})",
                self.sliders.full_scale
            );
        }
        if let Some(tolerance) = self.sliders.tolerance {
            if !(tolerance.is_finite() && tolerance >= 0.0) {
                anyhow::bail!("sliders.tolerance must be >= 0 (got {})", tolerance);
            }
        }

        Ok(())
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            separator: self.sliders.separator.clone(),
            full_scale: self.sliders.full_scale,
            invert: self.sliders.invert,
            tolerance: self
                .sliders
                .tolerance
                .unwrap_or_else(|| self.sliders.noise_reduction.tolerance()),
            snap_to_edges: self.sliders.snap_to_edges,
        }
    }

    pub fn publish_mode(&self) -> PublishMode {
        match self.dispatch.publish_timeout_ms {
            Some(ms) => PublishMode::Bounded(Duration::from_millis(ms)),
            None => PublishMode::Blocking,
        }
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reload.reset_delay_ms)
    }

    /// Build the configured line source
    pub fn line_source(&self) -> Result<Box<dyn LineSource>> {
        match self.transport.kind {
            TransportKind::Http => Ok(Box::new(HttpLineSource::bind(self.transport.bind.clone()))),
            TransportKind::Stream => {
                let address = self
                    .transport
                    .address
                    .clone()
                    .context("transport.address is required for the stream transport")?;
                Ok(Box::new(StreamLineSource::connect(address)))
            }
        }
    }
}

// Default value functions
fn default_bind() -> String { DEFAULT_BIND_ADDRESS.to_string() }
fn default_separator() -> String { DEFAULT_SEPARATOR.to_string() }
fn default_full_scale() -> f32 { 100.0 }
fn default_true() -> bool { true }
fn default_reset_delay_ms() -> u64 { DEFAULT_RESET_DELAY_MS }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BridgeConfig::from_yaml("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.transport.kind, TransportKind::Http);
        assert_eq!(config.transport.bind, "localhost:6332");
        assert_eq!(config.reset_delay(), Duration::from_millis(50));
        assert_eq!(config.publish_mode(), PublishMode::Blocking);
        assert_eq!(config.tracker_settings(), TrackerSettings::default());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
transport:
  kind: stream
  address: "192.168.1.40:7777"
sliders:
  separator: ","
  full_scale: 1023
  invert: true
  noise_reduction: high
  snap_to_edges: false
reload:
  reset_delay_ms: 75
dispatch:
  publish_timeout_ms: 250
"#;
        let config = BridgeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Stream);
        assert_eq!(config.transport.address.as_deref(), Some("192.168.1.40:7777"));

        let settings = config.tracker_settings();
        assert_eq!(settings.separator, ",");
        assert_eq!(settings.full_scale, 1023.0);
        assert!(settings.invert);
        assert_eq!(settings.tolerance, 3.5);
        assert!(!settings.snap_to_edges);

        assert_eq!(config.reset_delay(), Duration::from_millis(75));
        assert_eq!(
            config.publish_mode(),
            PublishMode::Bounded(Duration::from_millis(250))
        );
        assert_eq!(config.line_source().unwrap().name(), "stream:192.168.1.40:7777");
    }

    #[test]
    fn test_explicit_tolerance_overrides_preset() {
        let yaml = r#"
sliders:
  noise_reduction: low
  tolerance: 0.5
"#;
        let config = BridgeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tracker_settings().tolerance, 0.5);
    }

    #[test]
    fn test_stream_requires_address() {
        let err = BridgeConfig::from_yaml("transport:\n  kind: stream\n").unwrap_err();
        assert!(err.to_string().contains("transport.address"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(BridgeConfig::from_yaml("sliders:\n  full_scale: 0\n").is_err());
        assert!(BridgeConfig::from_yaml("sliders:\n  tolerance: -1\n").is_err());
        assert!(BridgeConfig::from_yaml("sliders:\n  separator: \"\"\n").is_err());
        assert!(BridgeConfig::from_yaml("transport:\n  kind: serial\n").is_err());
    }

    #[test]
    fn test_http_line_source() {
        let config = BridgeConfig::from_yaml("transport:\n  bind: \"127.0.0.1:9000\"\n").unwrap();
        assert_eq!(config.line_source().unwrap().name(), "http:127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = BridgeConfig::load("/nonexistent/slider-bridge.yaml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
