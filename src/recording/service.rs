//! Seam between the recording controller and the host audio stack.
//!
//! The controller never touches devices, files or streams directly. It drives an
//! [`AudioService`], whose session and buffer handles are opaque to it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::RecorderError;

/// Outcome of a microphone authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Capture quality requested when a session begins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// Device rate, stereo when the device delivers two channels
    #[default]
    High,
    /// Mono, decimated toward 16 kHz
    Low,
}

impl QualityPreset {
    /// Number of channels written for a device delivering `device_channels`.
    pub fn output_channels(self, device_channels: u16) -> u16 {
        match self {
            Self::High if device_channels == 2 => 2,
            _ => 1,
        }
    }

    /// Integer decimation factor applied to the device sample rate.
    pub fn decimation(self, device_rate: u32) -> u32 {
        match self {
            Self::High => 1,
            Self::Low => (device_rate / LOW_QUALITY_TARGET_RATE).max(1),
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
        }
    }
}

const LOW_QUALITY_TARGET_RATE: u32 = 16_000;

/// Fixed audio-session configuration applied once per start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionOptions {
    #[serde(default = "default_true")]
    pub allow_background_capture: bool,
    #[serde(default = "default_true")]
    pub duck_other_audio: bool,
    #[serde(default)]
    pub route_to_earpiece: bool,
    /// Refuse playback while a capture session is live
    #[serde(default = "default_true")]
    pub exclusive_capture_during_recording: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            allow_background_capture: true,
            duck_other_audio: true,
            route_to_earpiece: false,
            exclusive_capture_during_recording: true,
        }
    }
}

/// Host capability for capturing and replaying audio.
///
/// Methods that wait on hardware or disk are `async`; the rest return
/// immediately. Handles are consumed by `finalize` and the `release_*` calls,
/// so a released resource cannot be used again.
#[allow(async_fn_in_trait)]
pub trait AudioService {
    /// Live capture stream handle.
    type Session;
    /// Loaded, replayable audio handle.
    type Buffer;

    async fn request_microphone_permission(&mut self) -> Result<Permission, RecorderError>;

    async fn configure_session(&mut self, options: &SessionOptions) -> Result<(), RecorderError>;

    async fn begin_capture(&mut self, preset: QualityPreset) -> Result<Self::Session, RecorderError>;

    fn pause(&mut self, session: &mut Self::Session) -> Result<(), RecorderError>;

    fn resume(&mut self, session: &mut Self::Session) -> Result<(), RecorderError>;

    /// Flushes and closes the stream, returning where the recording landed.
    async fn finalize(&mut self, session: Self::Session) -> Result<PathBuf, RecorderError>;

    async fn load_buffer(&mut self, location: &Path) -> Result<Self::Buffer, RecorderError>;

    /// Plays `buffer` from position zero, interrupting any playback in progress.
    fn play(&mut self, buffer: &Self::Buffer) -> Result<(), RecorderError>;

    fn release_session(&mut self, session: Self::Session);

    fn release_buffer(&mut self, buffer: Self::Buffer);

    /// Mono samples from the last `window` of a live session, for level metering.
    fn recent_samples(&self, _session: &Self::Session, _window: Duration) -> Vec<i16> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_channels() {
        assert_eq!(QualityPreset::High.output_channels(2), 2);
        assert_eq!(QualityPreset::High.output_channels(1), 1);
        assert_eq!(QualityPreset::High.output_channels(6), 1);
        assert_eq!(QualityPreset::Low.output_channels(2), 1);
    }

    #[test]
    fn test_decimation() {
        assert_eq!(QualityPreset::High.decimation(48_000), 1);
        assert_eq!(QualityPreset::Low.decimation(48_000), 3);
        assert_eq!(QualityPreset::Low.decimation(44_100), 2);
        assert_eq!(QualityPreset::Low.decimation(8_000), 1);
    }

    #[test]
    fn test_session_options_defaults_from_empty_table() {
        let options: SessionOptions = toml::from_str("").unwrap();
        assert_eq!(options, SessionOptions::default());
        assert!(!options.route_to_earpiece);
    }
}
