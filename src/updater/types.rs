//! Value types shared by the update controller and its collaborators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classify::ClassifiedError;

/// A candidate update as described by the release feed.
///
/// Produced once per check and never mutated; a newer check replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub version: String,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub package_size: Option<u64>,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub package_url: Option<String>,
    #[serde(default)]
    pub sha512: Option<String>,
}

impl UpdateInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            release_notes: None,
            package_size: None,
            release_date: None,
            package_url: None,
            sha512: None,
        }
    }
}

/// Byte counts reported while a package download is in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

impl DownloadProgress {
    /// Percent is derived from the byte counts and clamped to 0..=100.
    /// An unknown total (0) reports 0%.
    pub fn new(transferred_bytes: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            0.0
        } else {
            (transferred_bytes as f64 * 100.0 / total_bytes as f64).min(100.0)
        };
        Self { transferred_bytes, total_bytes, percent }
    }
}

/// Discrete lifecycle phase of the update controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Checking,
    Available,
    Downloading,
    Downloaded,
    Installing,
    Error,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Checking => "Checking",
            Phase::Available => "Available",
            Phase::Downloading => "Downloading",
            Phase::Downloaded => "Downloaded",
            Phase::Installing => "Installing",
            Phase::Error => "Error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Observable state of the controller. Only the controller writes it;
/// everyone else sees clones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub phase: Phase,
    pub pending_update_info: Option<UpdateInfo>,
    pub download_complete: bool,
    pub last_error: Option<ClassifiedError>,
}

/// Which gate a consent request guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentKind {
    Download,
    Install,
}

impl ConsentKind {
    /// Prompt text shown by the presentation layer.
    pub fn prompt(self, info: &UpdateInfo) -> String {
        match self {
            ConsentKind::Download => format!(
                "Version {} is available. Would you like to download it?",
                info.version
            ),
            ConsentKind::Install => {
                "Update downloaded. Would you like to install it now?".to_string()
            }
        }
    }
}

/// A yes/no question tied to one specific pending update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub id: u64,
    pub kind: ConsentKind,
    pub info: UpdateInfo,
}

impl ConsentRequest {
    pub fn accept(self) -> ConsentResponse {
        ConsentResponse { request: self, accepted: true }
    }

    pub fn decline(self) -> ConsentResponse {
        ConsentResponse { request: self, accepted: false }
    }
}

/// The user's answer, echoing the request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentResponse {
    pub request: ConsentRequest,
    pub accepted: bool,
}
