//! UI layer for desktop GUI: app shell, controls, canvas and notice log.

pub mod app;

pub use app::{KmeansApp, StartupConfig};
