//! Capability the controller drives to fetch metadata, fetch the package, and apply it.

use std::convert::Infallible;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;

use super::types::{DownloadProgress, UpdateInfo};

/// Progress callback type for reporting package download progress.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Opaque update backend. Futures are `'static` so the controller can run them
/// on its runtime without borrowing the source.
pub trait UpdateSource: Send + Sync {
    /// Describe the latest published release.
    fn fetch_metadata(&self) -> BoxFuture<'static, Result<UpdateInfo>>;

    /// Download (and verify) the package for `info`, reporting progress as bytes arrive.
    fn fetch_package(
        &self,
        info: &UpdateInfo,
        on_progress: ProgressCallback,
    ) -> BoxFuture<'static, Result<()>>;

    /// Hand the staged package to the installer. On success the process exits,
    /// so the future only ever resolves to an error.
    fn apply(&self) -> BoxFuture<'static, Result<Infallible>>;
}
