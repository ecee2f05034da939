use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::{NewPhotoCapture, PhotoRecord, PhotoStoreConfig};
use crate::thumbnail::{self, ThumbnailError};

/// Error type for photo store operations
#[derive(Debug)]
pub enum PhotoStoreError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Image(String),
    Validation(String),
    NotFound(String),
}

impl std::fmt::Display for PhotoStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhotoStoreError::Database(e) => write!(f, "Database error: {}", e),
            PhotoStoreError::Io(e) => write!(f, "IO error: {}", e),
            PhotoStoreError::Image(msg) => write!(f, "Image error: {}", msg),
            PhotoStoreError::Validation(msg) => write!(f, "Validation error: {}", msg),
            PhotoStoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for PhotoStoreError {}

impl From<rusqlite::Error> for PhotoStoreError {
    fn from(err: rusqlite::Error) -> Self {
        PhotoStoreError::Database(err)
    }
}

impl From<std::io::Error> for PhotoStoreError {
    fn from(err: std::io::Error) -> Self {
        PhotoStoreError::Io(err)
    }
}

impl From<ThumbnailError> for PhotoStoreError {
    fn from(err: ThumbnailError) -> Self {
        match err {
            ThumbnailError::ImageLoadError(msg) => PhotoStoreError::Image(msg),
            ThumbnailError::ImageSaveError(msg) => PhotoStoreError::Image(msg),
            ThumbnailError::IoError(e) => PhotoStoreError::Io(e),
        }
    }
}

/// Photo store service: image blobs on disk, bookkeeping rows in SQLite
pub struct PhotoStore {
    config: PhotoStoreConfig,
}

impl PhotoStore {
    pub fn new(config: PhotoStoreConfig) -> Self {
        Self { config }
    }

    /// Absolute path of a stored file
    pub fn photo_path(&self, file_name: &str) -> PathBuf {
        self.config.storage_dir.join(file_name)
    }

    /// Validates, normalizes and durably stores a new capture.
    ///
    /// Nothing is written for an invalid capture. The stored original is
    /// the re-encoded JPEG, `checksum_sha256` is computed over exactly
    /// those bytes so uploads can be verified end to end. Image work runs
    /// on a blocking thread.
    pub async fn save_capture(
        &self,
        conn: &Connection,
        capture: NewPhotoCapture,
    ) -> Result<PhotoRecord, PhotoStoreError> {
        let NewPhotoCapture {
            user_id,
            captured_at,
            latitude,
            longitude,
            bytes,
        } = capture;

        if user_id.trim().is_empty() {
            return Err(PhotoStoreError::Validation(
                "User id must not be empty".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(PhotoStoreError::Validation("Photo is empty".to_string()));
        }
        if bytes.len() > self.config.max_photo_bytes {
            return Err(PhotoStoreError::Validation(format!(
                "Photo exceeds {} bytes",
                self.config.max_photo_bytes
            )));
        }
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => {
                if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
                    return Err(PhotoStoreError::Validation(format!(
                        "Latitude out of range: {}",
                        lat
                    )));
                }
                if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
                    return Err(PhotoStoreError::Validation(format!(
                        "Longitude out of range: {}",
                        lon
                    )));
                }
            }
            (None, None) => {}
            _ => {
                return Err(PhotoStoreError::Validation(
                    "Position requires both latitude and longitude".to_string(),
                ))
            }
        }

        std::fs::create_dir_all(&self.config.storage_dir)?;

        let uuid = Uuid::new_v4().to_string();
        let storage_dir = self.config.storage_dir.clone();
        let edge = self.config.thumbnail_edge;
        let task_uuid = uuid.clone();

        let (file_name, thumbnail_name, size_bytes, checksum) =
            tokio::task::spawn_blocking(move || {
                let (img, jpeg_bytes) = thumbnail::decode_and_reencode(&bytes)?;
                let checksum = format!("{:x}", Sha256::digest(&jpeg_bytes));
                let file_name = format!("{}.jpg", task_uuid);
                std::fs::write(storage_dir.join(&file_name), &jpeg_bytes)
                    .map_err(ThumbnailError::IoError)?;
                let thumbnail_name =
                    thumbnail::create_thumbnail(&img, &storage_dir, &task_uuid, edge)?;
                Ok::<_, ThumbnailError>((
                    file_name,
                    thumbnail_name,
                    jpeg_bytes.len() as i64,
                    checksum,
                ))
            })
            .await
            .map_err(|e| PhotoStoreError::Image(format!("Task join error: {}", e)))??;

        conn.execute(
            "INSERT INTO photos (uuid, user_id, captured_at, latitude, longitude, file_name,
                                 thumbnail_name, content_type, size_bytes, checksum_sha256)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                uuid,
                user_id,
                captured_at.timestamp_millis(),
                latitude,
                longitude,
                file_name,
                thumbnail_name,
                "image/jpeg",
                size_bytes,
                checksum,
            ],
        )?;

        log::info!("Stored photo {} ({} bytes)", uuid, size_bytes);

        Ok(PhotoRecord {
            id: Some(conn.last_insert_rowid()),
            uuid,
            user_id,
            captured_at,
            latitude,
            longitude,
            file_name,
            thumbnail_name: Some(thumbnail_name),
            content_type: "image/jpeg".to_string(),
            size_bytes,
            checksum_sha256: checksum,
            is_synced: false,
            remote_id: None,
            synced_at: None,
        })
    }

    pub fn get_photo(
        &self,
        conn: &Connection,
        uuid: &str,
    ) -> Result<Option<PhotoRecord>, PhotoStoreError> {
        let photo = conn
            .query_row("SELECT * FROM photos WHERE uuid = ?1", params![uuid], |row| {
                PhotoRecord::try_from(row)
            })
            .optional()?;
        Ok(photo)
    }

    pub fn list_photos(&self, conn: &Connection) -> Result<Vec<PhotoRecord>, PhotoStoreError> {
        let mut stmt = conn.prepare("SELECT * FROM photos ORDER BY captured_at DESC, id DESC")?;
        let rows = stmt.query_map([], |row| PhotoRecord::try_from(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Photos still waiting for upload, oldest capture first
    pub fn pending_photos(&self, conn: &Connection) -> Result<Vec<PhotoRecord>, PhotoStoreError> {
        let mut stmt = conn.prepare(
            "SELECT * FROM photos WHERE is_synced = 0 ORDER BY captured_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| PhotoRecord::try_from(row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_pending(&self, conn: &Connection) -> Result<usize, PhotoStoreError> {
        let count: usize = conn.query_row(
            "SELECT COUNT(*) FROM photos WHERE is_synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Records a successful upload. The pending guard in the WHERE clause
    /// keeps the unsynced to synced transition a one-way, one-time step.
    pub fn mark_synced(
        &self,
        conn: &Connection,
        uuid: &str,
        remote_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), PhotoStoreError> {
        let rows = conn.execute(
            "UPDATE photos SET is_synced = 1, remote_id = ?1, synced_at = ?2
             WHERE uuid = ?3 AND is_synced = 0",
            params![remote_id, synced_at.timestamp_millis(), uuid],
        )?;
        if rows == 0 {
            return Err(PhotoStoreError::NotFound(format!(
                "No pending photo {}",
                uuid
            )));
        }
        Ok(())
    }

    /// Reads the stored original from disk
    pub fn load_original(&self, conn: &Connection, uuid: &str) -> Result<Vec<u8>, PhotoStoreError> {
        let photo = self
            .get_photo(conn, uuid)?
            .ok_or_else(|| PhotoStoreError::NotFound(format!("Photo {} not found", uuid)))?;

        let path = self.photo_path(&photo.file_name);
        if !path.exists() {
            return Err(PhotoStoreError::NotFound(format!(
                "Photo file missing: {:?}",
                path
            )));
        }
        Ok(std::fs::read(path)?)
    }

    /// Removes the row and both image files. File removal is best effort,
    /// leftovers are picked up by the orphan sweep.
    pub fn delete_photo(&self, conn: &Connection, uuid: &str) -> Result<(), PhotoStoreError> {
        let photo = self
            .get_photo(conn, uuid)?
            .ok_or_else(|| PhotoStoreError::NotFound(format!("Photo {} not found", uuid)))?;

        conn.execute("DELETE FROM photos WHERE uuid = ?1", params![uuid])?;

        let original = self.photo_path(&photo.file_name);
        if let Err(e) = std::fs::remove_file(&original) {
            log::warn!("Could not remove {:?}: {}", original, e);
        }
        if let Some(thumbnail_name) = &photo.thumbnail_name {
            let thumbnail = self.photo_path(thumbnail_name);
            if let Err(e) = std::fs::remove_file(&thumbnail) {
                log::warn!("Could not remove {:?}: {}", thumbnail, e);
            }
        }

        Ok(())
    }

    /// Synced photos whose capture time lies before the cutoff.
    /// Unsynced photos are never returned here, whatever their age.
    pub fn expired_synced_photos(
        &self,
        conn: &Connection,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PhotoRecord>, PhotoStoreError> {
        let mut stmt = conn.prepare(
            "SELECT * FROM photos WHERE is_synced = 1 AND captured_at < ?1
             ORDER BY captured_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![cutoff.timestamp_millis()], |row| {
            PhotoRecord::try_from(row)
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Deletes image files in the storage directory that no row references
    pub fn remove_orphaned_files(&self, conn: &Connection) -> Result<usize, PhotoStoreError> {
        if !self.config.storage_dir.exists() {
            return Ok(0);
        }

        let mut known = HashSet::new();
        let mut stmt = conn.prepare("SELECT file_name, thumbnail_name FROM photos")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        for row in rows {
            let (file_name, thumbnail_name) = row?;
            known.insert(file_name);
            if let Some(name) = thumbnail_name {
                known.insert(name);
            }
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.config.storage_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !(name.ends_with(".jpg") || name.ends_with(".webp")) {
                continue;
            }
            if !known.contains(&name) {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    log::warn!("Could not remove orphan {}: {}", name, e);
                } else {
                    log::info!("Removed orphaned file {}", name);
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn setup() -> (Connection, PhotoStore, PathBuf) {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::init_photo_schema(&conn).unwrap();

        let dir = std::env::temp_dir().join(format!("photo-store-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let store = PhotoStore::new(PhotoStoreConfig {
            storage_dir: dir.clone(),
            max_photo_bytes: 10 * 1024 * 1024,
            thumbnail_edge: 64,
        });
        (conn, store, dir)
    }

    fn sample_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(80, 60, image::Rgb([10, 160, 90]));
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }

    fn capture(bytes: Vec<u8>) -> NewPhotoCapture {
        NewPhotoCapture {
            user_id: "officer-7".to_string(),
            captured_at: Utc::now(),
            latitude: Some(52.52),
            longitude: Some(13.405),
            bytes,
        }
    }

    #[tokio::test]
    async fn test_save_capture_writes_row_and_files() {
        let (conn, store, _dir) = setup();

        let photo = store.save_capture(&conn, capture(sample_jpeg())).await.unwrap();
        assert!(!photo.is_synced);
        assert!(photo.remote_id.is_none());
        assert!(store.photo_path(&photo.file_name).exists());
        assert!(store
            .photo_path(photo.thumbnail_name.as_ref().unwrap())
            .exists());

        // Checksum covers exactly the stored bytes
        let stored = store.load_original(&conn, &photo.uuid).unwrap();
        let checksum = format!("{:x}", Sha256::digest(&stored));
        assert_eq!(checksum, photo.checksum_sha256);
    }

    #[tokio::test]
    async fn test_invalid_captures_leave_no_trace() {
        let (conn, store, dir) = setup();

        assert!(store.save_capture(&conn, capture(Vec::new())).await.is_err());
        assert!(store
            .save_capture(&conn, capture(b"not an image".to_vec()))
            .await
            .is_err());

        let mut bad_position = capture(sample_jpeg());
        bad_position.longitude = None;
        assert!(store.save_capture(&conn, bad_position).await.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_capture_is_rejected() {
        let (conn, _store, dir) = setup();
        let store = PhotoStore::new(PhotoStoreConfig {
            storage_dir: dir,
            max_photo_bytes: 128,
            thumbnail_edge: 64,
        });

        let result = store.save_capture(&conn, capture(sample_jpeg())).await;
        assert!(matches!(result, Err(PhotoStoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_mark_synced_is_one_way() {
        let (conn, store, _dir) = setup();
        let photo = store.save_capture(&conn, capture(sample_jpeg())).await.unwrap();

        store
            .mark_synced(&conn, &photo.uuid, "srv-900", Utc::now())
            .unwrap();

        let synced = store.get_photo(&conn, &photo.uuid).unwrap().unwrap();
        assert!(synced.is_synced);
        assert_eq!(synced.remote_id.as_deref(), Some("srv-900"));
        assert!(synced.synced_at.is_some());

        // Second transition attempt is refused
        let again = store.mark_synced(&conn, &photo.uuid, "srv-901", Utc::now());
        assert!(matches!(again, Err(PhotoStoreError::NotFound(_))));

        assert!(store.pending_photos(&conn).unwrap().is_empty());
        assert_eq!(store.count_pending(&conn).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_photo_removes_row_and_files() {
        let (conn, store, _dir) = setup();
        let photo = store.save_capture(&conn, capture(sample_jpeg())).await.unwrap();
        let original = store.photo_path(&photo.file_name);

        store.delete_photo(&conn, &photo.uuid).unwrap();

        assert!(store.get_photo(&conn, &photo.uuid).unwrap().is_none());
        assert!(!original.exists());
    }

    #[tokio::test]
    async fn test_expired_query_skips_unsynced() {
        let (conn, store, _dir) = setup();

        let mut old_synced = capture(sample_jpeg());
        old_synced.captured_at = Utc::now() - chrono::Duration::days(40);
        let old_synced = store.save_capture(&conn, old_synced).await.unwrap();
        store
            .mark_synced(&conn, &old_synced.uuid, "srv-1", Utc::now())
            .unwrap();

        let mut old_unsynced = capture(sample_jpeg());
        old_unsynced.captured_at = Utc::now() - chrono::Duration::days(40);
        let old_unsynced = store.save_capture(&conn, old_unsynced).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(30);
        let expired = store.expired_synced_photos(&conn, cutoff).unwrap();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].uuid, old_synced.uuid);
        assert_ne!(expired[0].uuid, old_unsynced.uuid);
    }

    #[tokio::test]
    async fn test_orphan_sweep_keeps_known_files() {
        let (conn, store, dir) = setup();
        let photo = store.save_capture(&conn, capture(sample_jpeg())).await.unwrap();

        std::fs::write(dir.join("stray.jpg"), b"stale").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let removed = store.remove_orphaned_files(&conn).unwrap();
        assert_eq!(removed, 1);
        assert!(store.photo_path(&photo.file_name).exists());
        assert!(dir.join("notes.txt").exists());
        assert!(!dir.join("stray.jpg").exists());
    }
}
