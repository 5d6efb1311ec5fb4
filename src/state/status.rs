//! Status messages for UI feedback.

use crate::state::events::StatusEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Clone, Debug)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
    /// Download progress to render as a bar, when relevant.
    pub progress: Option<u8>,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: StatusLevel::Info, text: text.into(), progress: None }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: StatusLevel::Error, text: text.into(), progress: None }
    }

    pub fn from_event(event: &StatusEvent) -> Self {
        match event {
            StatusEvent::Status { message } => Self::info(message.clone()),
            StatusEvent::Progress { message, progress }
            | StatusEvent::Complete { message, progress } => {
                let progress = Some(progress.clamp(0.0, 100.0).round() as u8);
                Self { progress, ..Self::info(message.clone()) }
            }
            StatusEvent::Error { message, .. } => Self::error(message.clone()),
        }
    }
}
