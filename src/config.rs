use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::filesystem;

/// Static configuration loaded once at startup from `patrol.toml`.
///
/// Everything here seeds the `sync_settings` row on first run; after that
/// the database row is the live copy and can be changed without restarts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub photo: PhotoConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub interval_seconds: u64,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    pub max_photo_bytes: usize,
    pub thumbnail_edge: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub proximity_radius_m: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://patrol.example.com/api/v1".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            retention_days: 30,
        }
    }
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_photo_bytes: 10 * 1024 * 1024,
            thumbnail_edge: 320,
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            proximity_radius_m: 100.0,
        }
    }
}

impl AppConfig {
    pub fn from_toml(s: &str) -> Result<Self, AppError> {
        toml::from_str(s).map_err(|e| AppError::Validation(format!("Invalid config file: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String, AppError> {
        toml::to_string_pretty(self)
            .map_err(|e| AppError::Other(format!("Failed to serialize config: {}", e)))
    }
}

/// Path of the config file next to the data directory
pub fn config_path() -> PathBuf {
    filesystem::get_app_data_dir().join("patrol.toml")
}

/// Load `patrol.toml`, falling back to defaults when the file is absent.
/// A present but malformed file is an error so typos do not silently
/// reset the backend URL.
pub fn load_or_default(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        log::info!("No config file at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config = AppConfig::from_toml(&raw)?;
    log::info!("Loaded config from {:?}", path);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sync.interval_seconds, 60);
        assert_eq!(config.sync.retention_days, 30);
        assert_eq!(config.photo.max_photo_bytes, 10 * 1024 * 1024);
        assert_eq!(config.checkpoint.proximity_radius_m, 100.0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [api]
            base_url = "https://patrol.internal/api/v1"

            [sync]
            interval_seconds = 120
            retention_days = 14
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://patrol.internal/api/v1");
        assert_eq!(config.sync.interval_seconds, 120);
        assert_eq!(config.sync.retention_days, 14);
        // Untouched sections fall back to defaults
        assert_eq!(config.photo.thumbnail_edge, 320);
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let result = AppConfig::from_toml("[api\nbase_url = broken");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let raw = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&raw).unwrap();
        assert_eq!(parsed.api.base_url, config.api.base_url);
        assert_eq!(parsed.sync.interval_seconds, config.sync.interval_seconds);
    }
}
