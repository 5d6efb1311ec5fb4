//! Update status events for the presentation layer

use serde::Serialize;

/// Events emitted by the update controller, in order, on a single channel.
///
/// Consumers must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusEvent {
    /// Human-readable phase transition.
    Status { message: String },
    /// Download progress, 0..=100.
    Progress { message: String, progress: f64 },
    /// Download finished; always carries progress 100.
    Complete { message: String, progress: f64 },
    /// A classified failure, with whether a retry may be offered.
    Error { message: String, retryable: bool },
}

impl StatusEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status { message: message.into() }
    }

    pub fn progress(percent: f64) -> Self {
        Self::Progress {
            message: format!("Downloading update... {}%", percent.round()),
            progress: percent,
        }
    }

    pub fn complete() -> Self {
        Self::Complete { message: "Update downloaded.".to_string(), progress: 100.0 }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Status { message }
            | Self::Progress { message, .. }
            | Self::Complete { message, .. }
            | Self::Error { message, .. } => message,
        }
    }
}
