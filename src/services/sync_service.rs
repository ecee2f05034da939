use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::SyncSettings;
use rusqlite::Connection;

/// Loads the sync settings from the database
pub fn load_sync_settings(conn: &Connection) -> Result<Option<SyncSettings>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, server_url, device_id, enabled, sync_interval_seconds, retention_days,
                last_sync, last_cleanup, created_at, updated_at
         FROM sync_settings
         ORDER BY id DESC
         LIMIT 1",
    )?;

    let result = stmt.query_row([], |row| {
        Ok(SyncSettings {
            id: row.get(0)?,
            server_url: row.get(1)?,
            device_id: row.get(2)?,
            enabled: row.get(3)?,
            sync_interval_seconds: row.get(4)?,
            retention_days: row.get(5)?,
            last_sync: row.get(6)?,
            last_cleanup: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    });

    match result {
        Ok(settings) => Ok(Some(settings)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

/// Saves or updates the sync settings
pub fn save_sync_settings(conn: &Connection, settings: &SyncSettings) -> Result<i64, AppError> {
    settings.validate().map_err(AppError::Validation)?;

    let existing = load_sync_settings(conn)?;

    if let Some(existing) = existing {
        conn.execute(
            "UPDATE sync_settings
             SET server_url = ?1, device_id = ?2, enabled = ?3,
                 sync_interval_seconds = ?4, retention_days = ?5
             WHERE id = ?6",
            (
                &settings.server_url,
                &settings.device_id,
                settings.enabled,
                settings.sync_interval_seconds,
                settings.retention_days,
                existing.id,
            ),
        )?;
        Ok(existing.id)
    } else {
        conn.execute(
            "INSERT INTO sync_settings (server_url, device_id, enabled, sync_interval_seconds, retention_days)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                &settings.server_url,
                &settings.device_id,
                settings.enabled,
                settings.sync_interval_seconds,
                settings.retention_days,
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// Returns the current settings, seeding them from the config file on
/// first run. The database row is the live copy afterwards.
pub fn ensure_sync_settings(
    conn: &Connection,
    config: &AppConfig,
) -> Result<SyncSettings, AppError> {
    if let Some(settings) = load_sync_settings(conn)? {
        return Ok(settings);
    }

    let seeded = SyncSettings::new(
        config.api.base_url.clone(),
        config.sync.interval_seconds as i64,
        config.sync.retention_days,
    );
    save_sync_settings(conn, &seeded)?;
    log::info!("Seeded sync settings from config");

    load_sync_settings(conn)?.ok_or_else(|| AppError::NotFound("Sync settings".to_string()))
}

/// Returns the stable device id, generating and storing one if missing
pub fn get_device_id(conn: &Connection) -> Result<String, AppError> {
    if let Some(mut settings) = load_sync_settings(conn)? {
        if let Some(id) = &settings.device_id {
            return Ok(id.clone());
        }
        let new_id = uuid::Uuid::new_v4().to_string();
        settings.device_id = Some(new_id.clone());
        save_sync_settings(conn, &settings)?;
        Ok(new_id)
    } else {
        // Settings not configured yet, ephemeral id
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

/// Updates the timestamp of the last completed sync cycle
pub fn update_last_sync(conn: &Connection) -> Result<(), AppError> {
    conn.execute(
        "UPDATE sync_settings SET last_sync = CURRENT_TIMESTAMP WHERE id = (SELECT MAX(id) FROM sync_settings)",
        [],
    )?;
    Ok(())
}

/// Updates the timestamp of the last retention cleanup
pub fn update_last_cleanup(conn: &Connection) -> Result<(), AppError> {
    conn.execute(
        "UPDATE sync_settings SET last_cleanup = CURRENT_TIMESTAMP WHERE id = (SELECT MAX(id) FROM sync_settings)",
        [],
    )?;
    Ok(())
}

/// Enables or disables synchronization
pub fn set_sync_enabled(conn: &Connection, enabled: bool) -> Result<(), AppError> {
    conn.execute(
        "UPDATE sync_settings SET enabled = ?1 WHERE id = (SELECT MAX(id) FROM sync_settings)",
        [enabled],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    #[test]
    fn test_seed_from_config_once() {
        let conn = database::open_test_database();
        let config = AppConfig::default();

        assert!(load_sync_settings(&conn).unwrap().is_none());

        let settings = ensure_sync_settings(&conn, &config).unwrap();
        assert_eq!(settings.server_url, config.api.base_url);
        assert_eq!(settings.sync_interval_seconds, 60);
        assert_eq!(settings.retention_days, 30);

        // Second call returns the stored row, not a new seed
        let mut stored = ensure_sync_settings(&conn, &config).unwrap();
        assert_eq!(stored.id, settings.id);

        stored.retention_days = 14;
        save_sync_settings(&conn, &stored).unwrap();
        let reloaded = ensure_sync_settings(&conn, &config).unwrap();
        assert_eq!(reloaded.retention_days, 14);
    }

    #[test]
    fn test_device_id_is_stable() {
        let conn = database::open_test_database();
        ensure_sync_settings(&conn, &AppConfig::default()).unwrap();

        let first = get_device_id(&conn).unwrap();
        let second = get_device_id(&conn).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let conn = database::open_test_database();
        let settings = SyncSettings::new("https://patrol.example.com".to_string(), 0, 30);
        assert!(save_sync_settings(&conn, &settings).is_err());
    }
}
