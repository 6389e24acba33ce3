//! Configuration file management for yarec.
//!
//! Loads and validates the application configuration from TOML files.
//! Configuration is stored in the user's config directory.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::recording::{QualityPreset, SessionOptions};

/// Audio recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `yarec list-devices`
    /// - device name from `yarec list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Requested sample rate in Hz (the device's native rate is used if it differs)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Capture quality preset: "high" or "low"
    #[serde(default)]
    pub quality: QualityPreset,
    /// Peak volume threshold for visual indicator (0-100, percentage of reference level)
    #[serde(default = "default_peak_volume_threshold")]
    pub peak_volume_threshold: u8,
    /// Reference level in dBFS for 100% meter display (typical: -20 to -6 dBFS)
    #[serde(default = "default_reference_level_db")]
    pub reference_level_db: i8,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_peak_volume_threshold() -> u8 {
    90
}

fn default_reference_level_db() -> i8 {
    -20
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            quality: QualityPreset::default(),
            peak_volume_threshold: default_peak_volume_threshold(),
            reference_level_db: default_reference_level_db(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecorderConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionOptions,
}

impl RecorderConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read
    /// - If the TOML is malformed or values are out of range
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: RecorderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(anyhow!("audio.sample_rate must be positive"));
        }
        if self.audio.peak_volume_threshold > 100 {
            return Err(anyhow!(
                "audio.peak_volume_threshold must be between 0 and 100, got {}",
                self.audio.peak_volume_threshold
            ));
        }
        if self.audio.device.trim().is_empty() {
            return Err(anyhow!("audio.device must not be empty (use \"default\")"));
        }
        Ok(())
    }
}

/// Directory holding the config file.
///
/// # Errors
/// - If the home directory cannot be determined
pub fn config_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))?
        .join(".config")
        .join("yarec"))
}

/// Retrieves the path to the config file, creating its directory if needed.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn config_path() -> anyhow::Result<PathBuf> {
    let dir = config_dir()?;
    fs::create_dir_all(&dir)
        .map_err(|e| anyhow!("Failed to create config directory: {e}"))?;
    Ok(dir.join("yarec.toml"))
}
