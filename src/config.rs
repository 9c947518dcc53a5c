//! TOML configuration
//!
//! Supports `~/.config/lumen/config.toml` as a persistent config source.
//! All fields are optional and overlay the built-in defaults.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::capture::DEFAULT_BLOCK_SAMPLES;
use crate::device::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Audio device and framing tunables
    pub audio: AudioConfig,
}

/// Audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Microphone sample rate in Hz
    pub capture_sample_rate: u32,

    /// Playback sample rate in Hz (the service's output format)
    pub playback_sample_rate: u32,

    /// Capture block size in samples (~256 ms at 16 kHz by default)
    pub block_samples: usize,

    /// Input device name; host default if unset
    pub input_device: Option<String>,

    /// Output device name; host default if unset
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            block_samples: DEFAULT_BLOCK_SAMPLES,
            input_device: None,
            output_device: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
        }
    }
}

impl Config {
    /// Load the configuration file if present, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let Some(path) = Self::config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Path of the persistent config file, if a home directory exists
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "lumen", "lumen").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = Config::default();
        assert_eq!(config.audio.capture_sample_rate, 16000);
        assert_eq!(config.audio.playback_sample_rate, 24000);
        assert_eq!(config.audio.block_samples, 4096);
        assert!(config.audio.input_device.is_none());
    }

    #[test]
    fn partial_file_overlays_defaults() {
        let config: Config = toml::from_str(
            r#"
            [audio]
            block_samples = 2048
            output_device = "pipewire"
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.block_samples, 2048);
        assert_eq!(config.audio.output_device.as_deref(), Some("pipewire"));
        // Untouched fields keep their defaults
        assert_eq!(config.audio.capture_sample_rate, 16000);
    }
}
