//! Configuration management for yarec.
//!
//! Loads the TOML configuration stored in the user's config
//! directory (`~/.config/yarec/yarec.toml`).

pub mod file;

pub use file::{config_dir, config_path, AudioConfig, RecorderConfig};
