use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version error: {0}")]
    Version(#[from] semver::Error),

    #[error("Update manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("sha512 checksum mismatch, expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid update manifest: {0}")]
    InvalidManifest(String),

    #[error("No downloaded update package is staged")]
    NothingStaged,

    #[error("Installer failed: {0}")]
    Installer(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Convenience Result type using our Error
pub type Result<T> = std::result::Result<T, Error>;
