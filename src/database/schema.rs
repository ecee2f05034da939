use rusqlite::{Connection, Result};

/// Initialize the complete database schema for the Security Patrol client
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Schema version table for future migrations
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Check if schema already exists
    let current_version: i32 = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        create_schema(conn)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

/// Create the complete schema (version 1)
///
/// Every captured entity table carries the same sync columns:
/// `is_synced` starts at 0 and is flipped to 1 exactly once by the sync
/// engine, which also fills `remote_id` and `synced_at` from the server
/// response. `captured_at` is the event time in epoch milliseconds.
fn create_schema(conn: &Connection) -> Result<()> {
    // Table: time_records (clock-in / clock-out events)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS time_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            record_type TEXT CHECK(record_type IN ('clock_in', 'clock_out')) NOT NULL,
            captured_at INTEGER NOT NULL,
            latitude REAL NOT NULL CHECK(latitude BETWEEN -90 AND 90),
            longitude REAL NOT NULL CHECK(longitude BETWEEN -180 AND 180),
            is_synced INTEGER NOT NULL DEFAULT 0 CHECK(is_synced IN (0,1)),
            remote_id TEXT,
            synced_at INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Indexes for time_records
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_time_records_pending ON time_records(is_synced, captured_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_time_records_user ON time_records(user_id, captured_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_time_records_uuid ON time_records(uuid)",
        [],
    )?;

    // Trigger for updated_at in time_records
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_time_records_timestamp
         AFTER UPDATE ON time_records
         BEGIN
            UPDATE time_records SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    // Table: location_records (GPS track points)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS location_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            latitude REAL NOT NULL CHECK(latitude BETWEEN -90 AND 90),
            longitude REAL NOT NULL CHECK(longitude BETWEEN -180 AND 180),
            accuracy_m REAL NOT NULL CHECK(accuracy_m >= 0),
            is_synced INTEGER NOT NULL DEFAULT 0 CHECK(is_synced IN (0,1)),
            remote_id TEXT,
            synced_at INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Indexes for location_records
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_location_records_pending ON location_records(is_synced, captured_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_location_records_uuid ON location_records(uuid)",
        [],
    )?;

    // Trigger for updated_at in location_records
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_location_records_timestamp
         AFTER UPDATE ON location_records
         BEGIN
            UPDATE location_records SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    // Table: checkpoint_verifications (patrol proof at a checkpoint)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkpoint_verifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            checkpoint_id TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            latitude REAL NOT NULL CHECK(latitude BETWEEN -90 AND 90),
            longitude REAL NOT NULL CHECK(longitude BETWEEN -180 AND 180),
            is_synced INTEGER NOT NULL DEFAULT 0 CHECK(is_synced IN (0,1)),
            remote_id TEXT,
            synced_at INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Indexes for checkpoint_verifications
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checkpoint_verifications_pending ON checkpoint_verifications(is_synced, captured_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checkpoint_verifications_checkpoint ON checkpoint_verifications(checkpoint_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checkpoint_verifications_uuid ON checkpoint_verifications(uuid)",
        [],
    )?;

    // Trigger for updated_at in checkpoint_verifications
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_checkpoint_verifications_timestamp
         AFTER UPDATE ON checkpoint_verifications
         BEGIN
            UPDATE checkpoint_verifications SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    // Table: incident_reports (free-text reports, position optional)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS incident_reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            body TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            latitude REAL CHECK(latitude IS NULL OR latitude BETWEEN -90 AND 90),
            longitude REAL CHECK(longitude IS NULL OR longitude BETWEEN -180 AND 180),
            is_synced INTEGER NOT NULL DEFAULT 0 CHECK(is_synced IN (0,1)),
            remote_id TEXT,
            synced_at INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Indexes for incident_reports
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_incident_reports_pending ON incident_reports(is_synced, captured_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_incident_reports_uuid ON incident_reports(uuid)",
        [],
    )?;

    // Trigger for updated_at in incident_reports
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_incident_reports_timestamp
         AFTER UPDATE ON incident_reports
         BEGIN
            UPDATE incident_reports SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    // Table: patrol_locations (backend reference data, cached for offline use)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS patrol_locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            latitude REAL NOT NULL CHECK(latitude BETWEEN -90 AND 90),
            longitude REAL NOT NULL CHECK(longitude BETWEEN -180 AND 180),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Trigger for updated_at in patrol_locations
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_patrol_locations_timestamp
         AFTER UPDATE ON patrol_locations
         BEGIN
            UPDATE patrol_locations SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    // Table: checkpoints (backend reference data, cached for offline validation)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkpoints (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT NOT NULL UNIQUE,
            location_id TEXT NOT NULL,
            name TEXT NOT NULL,
            latitude REAL NOT NULL CHECK(latitude BETWEEN -90 AND 90),
            longitude REAL NOT NULL CHECK(longitude BETWEEN -180 AND 180),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Indexes for checkpoints
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checkpoints_location ON checkpoints(location_id)",
        [],
    )?;

    // Trigger for updated_at in checkpoints
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_checkpoints_timestamp
         AFTER UPDATE ON checkpoints
         BEGIN
            UPDATE checkpoints SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    // Table: sync_settings (backend URL and sync tuning, latest row wins)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_url TEXT NOT NULL,
            device_id TEXT,
            enabled INTEGER NOT NULL DEFAULT 1 CHECK(enabled IN (0,1)),
            sync_interval_seconds INTEGER NOT NULL DEFAULT 60 CHECK(sync_interval_seconds > 0),
            retention_days INTEGER NOT NULL DEFAULT 30 CHECK(retention_days > 0),
            last_sync TEXT,
            last_cleanup TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Trigger for updated_at in sync_settings
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_sync_settings_timestamp
         AFTER UPDATE ON sync_settings
         BEGIN
            UPDATE sync_settings SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    // Table: auth_session (current signed-in session, latest row wins)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS auth_session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            phone_number TEXT NOT NULL,
            access_token TEXT NOT NULL,
            refresh_token TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Trigger for updated_at in auth_session
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_auth_session_timestamp
         AFTER UPDATE ON auth_session
         BEGIN
            UPDATE auth_session SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_entity_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        for table in [
            "time_records",
            "location_records",
            "checkpoint_verifications",
            "incident_reports",
            "patrol_locations",
            "checkpoints",
            "sync_settings",
            "auth_session",
        ] {
            let found: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(found, "missing table {}", table);
        }
    }

    #[test]
    fn test_coordinate_bounds_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO location_records (uuid, user_id, captured_at, latitude, longitude, accuracy_m)
             VALUES ('u1', 'officer', 0, 1234.5, 0.0, 1.0)",
            [],
        );
        assert!(result.is_err());
    }
}
