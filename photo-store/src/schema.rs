use rusqlite::{Connection, Result};

/// Initialize the photo store schema, versioned separately from the
/// application schema so both can evolve on their own
pub fn init_photo_schema(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS photo_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT version FROM photo_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        create_photo_schema_v1(conn)?;
        conn.execute("INSERT INTO photo_schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

fn create_photo_schema_v1(conn: &Connection) -> Result<()> {
    // Table: photos - one row per captured image, blobs live on disk
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            latitude REAL CHECK(latitude IS NULL OR latitude BETWEEN -90 AND 90),
            longitude REAL CHECK(longitude IS NULL OR longitude BETWEEN -180 AND 180),
            file_name TEXT NOT NULL,
            thumbnail_name TEXT,
            content_type TEXT NOT NULL DEFAULT 'image/jpeg',
            size_bytes INTEGER NOT NULL,
            checksum_sha256 TEXT NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0 CHECK(is_synced IN (0,1)),
            remote_id TEXT,
            synced_at INTEGER,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Indexes for photos
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_photos_pending ON photos(is_synced, captured_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_photos_uuid ON photos(uuid)",
        [],
    )?;

    // Trigger for updated_at in photos
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_photos_timestamp
         AFTER UPDATE ON photos
         BEGIN
            UPDATE photos SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;
         END",
        [],
    )?;

    Ok(())
}
