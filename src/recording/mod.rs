//! Audio recording feature for yarec.
//!
//! The [`RecordingController`] owns the record/pause/stop/play state machine and
//! drives an [`AudioService`]; [`CpalAudioService`] is the host implementation
//! and [`RecorderTui`] the screen that feeds it user intents.

pub mod audio;
pub mod controller;
pub mod error;
pub mod service;
pub mod ui;
pub mod visualizations;

pub use audio::{recording_path, CpalAudioService};
pub use controller::{RecordingController, SessionMode};
pub use error::RecorderError;
pub use service::{AudioService, Permission, QualityPreset, SessionOptions};
pub use ui::{RecorderIntent, RecorderTui, RecorderView, StatusLine};
