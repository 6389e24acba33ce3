//! Application command handlers for yarec.
//!
//! # Commands
//! - `record`: Interactive recorder screen (default)
//! - `replay`: Play the last saved recording
//! - `list_devices`: List available audio input devices
//! - `logs`: Display recent log entries
//! - `config`: Open configuration file in user's preferred editor

pub mod config;
pub mod list_devices;
pub mod logs;
pub mod record;
pub mod replay;

pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use record::handle_record;
pub use replay::handle_replay;
