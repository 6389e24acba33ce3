//! Shared terminal views.

pub mod error;

pub use error::ErrorScreen;
