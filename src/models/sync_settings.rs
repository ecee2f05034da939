use serde::{Deserialize, Serialize};

/// Sync tuning and backend endpoint, persisted as the latest row of the
/// `sync_settings` table. Seeded from `patrol.toml` on first run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    pub id: i64,
    pub server_url: String,
    /// Stable per-install identifier, generated on first run
    pub device_id: Option<String>,
    pub enabled: bool,
    pub sync_interval_seconds: i64,
    pub retention_days: i64,
    pub last_sync: Option<String>,
    pub last_cleanup: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SyncSettings {
    pub fn new(server_url: String, sync_interval_seconds: i64, retention_days: i64) -> Self {
        Self {
            id: 0,
            server_url,
            device_id: None,
            enabled: true,
            sync_interval_seconds,
            retention_days,
            last_sync: None,
            last_cleanup: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server_url.trim().is_empty() {
            return Err("Server URL must not be empty".to_string());
        }
        if self.sync_interval_seconds <= 0 {
            return Err("Sync interval must be positive".to_string());
        }
        if self.retention_days <= 0 {
            return Err("Retention must be at least one day".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = SyncSettings::new("https://patrol.example.com/api/v1".to_string(), 60, 30);
        assert!(settings.validate().is_ok());
        assert!(settings.enabled);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let settings = SyncSettings::new("https://patrol.example.com/api/v1".to_string(), 0, 30);
        assert!(settings.validate().is_err());
    }
}
