//! Release-feed backed update source.
//!
//! The feed is a directory of release assets (a GitHub "latest release download"
//! URL by default) containing a per-platform JSON manifest:
//!
//! ```json
//! { "version": "1.4.0", "path": "Vidshelf-1.4.0.AppImage", "sha512": "<base64>",
//!   "releaseNotes": "...", "releaseDate": "2026-03-01T12:00:00Z", "size": 81234567 }
//! ```

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use futures::StreamExt as _;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use tokio::io::AsyncWriteExt as _;

use crate::error::{Error, Result};

use super::source::{ProgressCallback, UpdateSource};
use super::types::{DownloadProgress, UpdateInfo};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const FALLBACK_PACKAGE_NAME: &str = "vidshelf-update.bin";

#[cfg(target_os = "windows")]
const MANIFEST_NAME: &str = "latest.json";
#[cfg(target_os = "macos")]
const MANIFEST_NAME: &str = "latest-mac.json";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const MANIFEST_NAME: &str = "latest-linux.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    version: String,
    path: String,
    sha512: String,
    #[serde(default)]
    release_notes: Option<String>,
    #[serde(default)]
    release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    size: Option<u64>,
}

/// Update source that reads a JSON manifest and package from a release feed.
#[derive(Clone)]
pub struct FeedSource {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    client: reqwest::Client,
    feed_url: String,
    cache_dir: PathBuf,
    staged: Mutex<Option<PathBuf>>,
}

impl FeedSource {
    pub fn new(feed_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("Vidshelf/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let feed_url = feed_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            inner: Arc::new(FeedInner {
                client,
                feed_url,
                cache_dir: cache_dir.into(),
                staged: Mutex::new(None),
            }),
        })
    }

    /// Default download location for update packages.
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("vidshelf").join("updates")
    }

    pub fn manifest_url(&self) -> String {
        format!("{}/{}", self.inner.feed_url, MANIFEST_NAME)
    }

    /// Path of the verified package awaiting installation, if any.
    pub fn staged_package(&self) -> Option<PathBuf> {
        self.inner.staged.lock().clone()
    }
}

impl UpdateSource for FeedSource {
    fn fetch_metadata(&self) -> BoxFuture<'static, Result<UpdateInfo>> {
        Box::pin(fetch_manifest(self.inner.clone(), self.manifest_url()))
    }

    fn fetch_package(
        &self,
        info: &UpdateInfo,
        on_progress: ProgressCallback,
    ) -> BoxFuture<'static, Result<()>> {
        Box::pin(download_package(self.inner.clone(), info.clone(), on_progress))
    }

    fn apply(&self) -> BoxFuture<'static, Result<Infallible>> {
        Box::pin(launch_installer(self.inner.clone()))
    }
}

async fn fetch_manifest(inner: Arc<FeedInner>, url: String) -> Result<UpdateInfo> {
    log::info!("Fetching update manifest from {url}");
    let resp = inner.client.get(&url).send().await?;
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(Error::ManifestNotFound(url));
    }
    let body = resp.error_for_status()?.bytes().await?;
    parse_manifest(&inner.feed_url, &body)
}

/// Parse a feed manifest, resolving the package path against the feed URL.
fn parse_manifest(feed_url: &str, body: &[u8]) -> Result<UpdateInfo> {
    let manifest: Manifest = serde_json::from_slice(body)?;
    let version = manifest.version.strip_prefix('v').unwrap_or(&manifest.version);
    if semver::Version::parse(version).is_err() {
        return Err(Error::InvalidManifest(format!("unparseable version {:?}", manifest.version)));
    }
    if manifest.path.is_empty() {
        return Err(Error::InvalidManifest("empty package path".to_string()));
    }

    let is_absolute = manifest.path.starts_with("http://") || manifest.path.starts_with("https://");
    let package_url = if is_absolute {
        manifest.path
    } else {
        format!("{}/{}", feed_url.trim_end_matches('/'), manifest.path.trim_start_matches('/'))
    };

    Ok(UpdateInfo {
        version: version.to_string(),
        release_notes: manifest.release_notes,
        package_size: manifest.size,
        release_date: manifest.release_date,
        package_url: Some(package_url),
        sha512: Some(manifest.sha512),
    })
}

async fn download_package(
    inner: Arc<FeedInner>,
    info: UpdateInfo,
    on_progress: ProgressCallback,
) -> Result<()> {
    let Some(url) = info.package_url.clone() else {
        return Err(Error::InvalidManifest(format!("no package for version {}", info.version)));
    };
    let Some(expected) = info.sha512.clone() else {
        return Err(Error::InvalidManifest(format!("no sha512 for version {}", info.version)));
    };

    let resp = inner.client.get(&url).send().await?.error_for_status()?;
    let total = resp.content_length().or(info.package_size).unwrap_or(0);

    tokio::fs::create_dir_all(&inner.cache_dir).await?;
    let file_name = package_file_name(&url);
    let final_path = inner.cache_dir.join(&file_name);
    let partial_path = inner.cache_dir.join(format!("{file_name}.partial"));

    log::info!("Downloading update {} from {url} ({total} bytes)", info.version);

    // Removed on every exit path, including the task being aborted
    let partial = PartialFile(partial_path);
    let digest = stream_to_file(resp, &partial.0, total, &on_progress).await?;

    let actual = BASE64.encode(digest);
    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    tokio::fs::rename(&partial.0, &final_path).await?;
    log::info!("Update {} verified and staged at {}", info.version, final_path.display());
    *inner.staged.lock() = Some(final_path);
    Ok(())
}

async fn stream_to_file(
    resp: reqwest::Response,
    path: &Path,
    total: u64,
    on_progress: &ProgressCallback,
) -> Result<Vec<u8>> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut hasher = Sha512::new();
    let mut downloaded: u64 = 0;
    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        // An unknown total (0) reports 0% until the download completes
        on_progress(DownloadProgress::new(downloaded, total));
    }
    file.flush().await?;

    Ok(hasher.finalize().to_vec())
}

/// A download in progress; the file is deleted when this goes out of scope.
/// After a successful rename there is nothing left to delete.
struct PartialFile(PathBuf);

impl Drop for PartialFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => log::debug!("Removed partial download {}", self.0.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {e}", self.0.display()),
        }
    }
}

/// Last URL path segment, without query string.
fn package_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if name.contains('.') => name.to_string(),
        _ => FALLBACK_PACKAGE_NAME.to_string(),
    }
}

async fn launch_installer(inner: Arc<FeedInner>) -> Result<Infallible> {
    let staged = inner.staged.lock().clone().ok_or(Error::NothingStaged)?;
    if !staged.exists() {
        return Err(Error::NothingStaged);
    }

    let mut command = installer_command(&staged)?;
    log::info!("Launching installer for {}", staged.display());
    command.spawn().map_err(|e| Error::Installer(format!("{}: {e}", staged.display())))?;

    log::info!("Installer started, exiting");
    std::process::exit(0)
}

#[cfg(target_os = "windows")]
fn installer_command(package: &Path) -> Result<Command> {
    let mut command = Command::new(package);
    command.args(["--updated", "--force-run"]);
    Ok(command)
}

#[cfg(target_os = "macos")]
fn installer_command(package: &Path) -> Result<Command> {
    let mut command = Command::new("open");
    command.arg(package);
    Ok(command)
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn installer_command(package: &Path) -> Result<Command> {
    use std::os::unix::fs::PermissionsExt as _;

    let is_appimage = package.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("appimage"));
    if is_appimage {
        let mut perms = std::fs::metadata(package)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        std::fs::set_permissions(package, perms)?;
        return Ok(Command::new(package));
    }

    let mut command = Command::new("xdg-open");
    command.arg(package);
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "https://github.com/vidshelf/vidshelf/releases/latest/download";

    #[test]
    fn parse_manifest_resolves_relative_path() {
        let body = br#"{
            "version": "v1.4.0",
            "path": "Vidshelf-1.4.0.AppImage",
            "sha512": "AAAA",
            "releaseNotes": "Faster thumbnails",
            "releaseDate": "2026-03-01T12:00:00Z",
            "size": 1024
        }"#;
        let info = parse_manifest(FEED, body).expect("valid manifest");
        assert_eq!(info.version, "1.4.0");
        assert_eq!(info.package_url.as_deref(), Some(&*format!("{FEED}/Vidshelf-1.4.0.AppImage")));
        assert_eq!(info.package_size, Some(1024));
        assert_eq!(info.release_notes.as_deref(), Some("Faster thumbnails"));
        assert!(info.release_date.is_some());
    }

    #[test]
    fn parse_manifest_keeps_absolute_path() {
        let body = br#"{"version":"2.0.0","path":"https://cdn.example.test/v.exe","sha512":"x"}"#;
        let info = parse_manifest(FEED, body).expect("valid manifest");
        assert_eq!(info.package_url.as_deref(), Some("https://cdn.example.test/v.exe"));
    }

    #[test]
    fn parse_manifest_rejects_bad_version() {
        let body = br#"{"version":"latest","path":"a.zip","sha512":"x"}"#;
        assert!(matches!(parse_manifest(FEED, body), Err(Error::InvalidManifest(_))));
    }

    #[test]
    fn parse_manifest_requires_sha512() {
        let body = br#"{"version":"1.0.0","path":"a.zip"}"#;
        assert!(matches!(parse_manifest(FEED, body), Err(Error::Json(_))));
    }

    #[test]
    fn package_file_name_strips_query() {
        assert_eq!(
            package_file_name("https://x.test/dl/Vidshelf-1.2.0.dmg?token=1"),
            "Vidshelf-1.2.0.dmg"
        );
        assert_eq!(package_file_name("https://x.test/dl/"), FALLBACK_PACKAGE_NAME);
    }
}
