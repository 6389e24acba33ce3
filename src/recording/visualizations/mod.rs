//! Level visualizations for the recorder screen.

pub mod meter;
pub mod waveform;

pub use meter::LevelMeter;
pub use waveform::{resize_waveform, update_waveform};
