// Configuration management for persistent settings

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::fs;
use std::path::PathBuf;

use crate::state::settings::AppSettings;

#[cfg(debug_assertions)]
const APP_NAME: &str = "vidshelf-dev";

#[cfg(not(debug_assertions))]
const APP_NAME: &str = "vidshelf";

/// Manages persistent configuration files
#[derive(Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, initializing the config directory if needed
    pub fn new() -> Result<Self> {
        Self::with_config_dir(Self::get_config_dir()?)
    }

    /// Use an explicit directory instead of the platform default
    pub fn with_config_dir(config_dir: PathBuf) -> Result<Self> {
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        }

        Ok(Self { config_dir })
    }

    /// Get the platform-specific config directory
    fn get_config_dir() -> Result<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_NAME)).context("Could not determine config directory")
    }

    /// Get path to a specific config file
    fn file_path(&self, filename: &str) -> PathBuf {
        self.config_dir.join(filename)
    }

    /// Load data from a JSON file
    fn load_json<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);

        if !path.exists() {
            return Ok(None);
        }

        let data =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", filename))?;

        let value: T = serde_json::from_str(&data)
            .with_context(|| format!("Failed to deserialize {}", filename))?;

        Ok(Some(value))
    }

    /// Save data to a JSON file (atomic via temp + rename).
    fn save_json<T: Serialize + ?Sized>(&self, filename: &str, data: &T) -> Result<()> {
        let path = self.file_path(filename);

        let json = serde_json::to_string_pretty(data)
            .with_context(|| format!("Failed to serialize {}", filename))?;

        atomic_write(&path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", filename))?;

        Ok(())
    }

    const SETTINGS_FILE: &'static str = "settings.json";

    /// Load application settings from disk, falling back to defaults
    pub fn load_settings(&self) -> Result<AppSettings> {
        Ok(self.load_json(Self::SETTINGS_FILE)?.unwrap_or_default())
    }

    /// Save application settings to disk
    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        self.save_json(Self::SETTINGS_FILE, settings)
    }
}

/// Write `data` to `path` atomically: write to a sibling temp file first, then
/// rename. Readers see either the old content or the new content.
fn atomic_write(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(path);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn load_settings_defaults_when_missing() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let manager = ConfigManager::with_config_dir(temp_dir.path().join("nested"))
            .expect("failed to create manager");

        let loaded = manager.load_settings().expect("failed to load settings");
        assert_eq!(loaded, AppSettings::default());
        assert!(temp_dir.path().join("nested").is_dir());
    }

    #[test]
    fn save_then_load_settings() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let manager = ConfigManager::with_config_dir(temp_dir.path().to_path_buf())
            .expect("failed to create manager");

        let mut settings = AppSettings::default();
        settings.updates.allow_prerelease = true;
        settings.updates.check_interval_hours = 12;
        manager.save_settings(&settings).expect("failed to save settings");

        assert!(temp_dir.path().join(ConfigManager::SETTINGS_FILE).exists());
        let loaded = manager.load_settings().expect("failed to load settings");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn corrupt_settings_is_an_error() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let manager = ConfigManager::with_config_dir(temp_dir.path().to_path_buf())
            .expect("failed to create manager");
        fs::write(temp_dir.path().join(ConfigManager::SETTINGS_FILE), "{not json")
            .expect("failed to write settings");

        assert!(manager.load_settings().is_err());
    }
}
