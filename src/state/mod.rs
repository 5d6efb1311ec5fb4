//! Persistent settings and the status types shown to the user.

pub mod config;
pub mod events;
pub mod settings;
pub mod status;

pub use config::ConfigManager;
pub use events::StatusEvent;
pub use settings::{AppSettings, UpdateSettings};
pub use status::{StatusLevel, StatusMessage};
