//! yarec: a single-screen terminal audio recorder.

pub mod app;
pub mod commands;
pub mod config;
pub mod logging;
pub mod recording;
pub mod setup;
pub mod ui;
