//! Maps raw update failures onto a closed taxonomy with a retry disposition.

use std::io;

use serde::Serialize;

use crate::error::Error;

/// Closed set of failure categories the presentation layer knows how to explain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NetworkUnreachable,
    InvalidSignature,
    ManifestNotFound,
    Unknown,
}

impl ErrorKind {
    /// Whether the user may be offered an explicit retry.
    pub fn retryable(self) -> bool {
        matches!(self, ErrorKind::NetworkUnreachable | ErrorKind::ManifestNotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retryable: kind.retryable() }
    }
}

/// Classify a failure raised by the update source.
pub fn classify(error: &Error) -> ClassifiedError {
    let kind = kind_of(error);
    let message = match kind {
        ErrorKind::NetworkUnreachable => {
            "Update server is unreachable. Please check your internet connection.".to_string()
        }
        ErrorKind::ManifestNotFound => "No update found. You might be offline.".to_string(),
        ErrorKind::InvalidSignature => {
            "Update has invalid signature. Please download the application again.".to_string()
        }
        ErrorKind::Unknown => error.to_string(),
    };
    ClassifiedError::new(kind, message)
}

fn kind_of(error: &Error) -> ErrorKind {
    match error {
        Error::Http(e) => {
            if e.status() == Some(reqwest::StatusCode::NOT_FOUND) {
                ErrorKind::ManifestNotFound
            } else if e.is_connect() || e.is_timeout() {
                ErrorKind::NetworkUnreachable
            } else {
                ErrorKind::Unknown
            }
        }
        Error::Io(e) => io_kind(e.kind()),
        Error::Timeout(_) => ErrorKind::NetworkUnreachable,
        Error::ManifestNotFound(_) => ErrorKind::ManifestNotFound,
        Error::ChecksumMismatch { .. } => ErrorKind::InvalidSignature,
        Error::Json(_)
        | Error::Version(_)
        | Error::InvalidManifest(_)
        | Error::NothingStaged
        | Error::Installer(_) => ErrorKind::Unknown,
    }
}

fn io_kind(kind: io::ErrorKind) -> ErrorKind {
    match kind {
        // ENOENT from the resolver/transport means the feed host could not be reached
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::TimedOut
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => ErrorKind::NetworkUnreachable,
        _ => ErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_refused_is_retryable_network_failure() {
        let err = Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        let classified = classify(&err);
        assert_eq!(classified.kind, ErrorKind::NetworkUnreachable);
        assert!(classified.retryable);
        assert!(classified.message.contains("unreachable"));
    }

    #[test]
    fn enoent_counts_as_unreachable() {
        let err = Error::Io(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(classify(&err).kind, ErrorKind::NetworkUnreachable);
    }

    #[test]
    fn missing_manifest_is_retryable() {
        let err = Error::ManifestNotFound("https://example.test/latest.json".into());
        let classified = classify(&err);
        assert_eq!(classified.kind, ErrorKind::ManifestNotFound);
        assert!(classified.retryable);
        assert_eq!(classified.message, "No update found. You might be offline.");
    }

    #[test]
    fn checksum_mismatch_is_never_retryable() {
        let classified = classify(&Error::ChecksumMismatch {
            expected: "abc".into(),
            actual: "def".into(),
        });
        assert_eq!(classified.kind, ErrorKind::InvalidSignature);
        assert!(!classified.retryable);
        assert!(classified.message.contains("download the application again"));
    }

    #[test]
    fn unknown_errors_keep_raw_message() {
        let err = Error::InvalidManifest("missing field `version`".into());
        let classified = classify(&err);
        assert_eq!(classified.kind, ErrorKind::Unknown);
        assert!(!classified.retryable);
        assert_eq!(classified.message, err.to_string());
    }

    #[test]
    fn timeout_is_network_failure() {
        assert_eq!(classify(&Error::Timeout("feed".into())).kind, ErrorKind::NetworkUnreachable);
    }

    #[test]
    fn permission_denied_is_unknown() {
        let err = Error::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(classify(&err).kind, ErrorKind::Unknown);
    }
}
