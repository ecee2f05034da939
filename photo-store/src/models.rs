use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the photo store
#[derive(Debug, Clone)]
pub struct PhotoStoreConfig {
    /// Directory holding originals and thumbnails
    pub storage_dir: PathBuf,
    /// Largest accepted capture in bytes
    pub max_photo_bytes: usize,
    /// Longest edge of the generated thumbnail in pixels
    pub thumbnail_edge: u32,
}

impl Default for PhotoStoreConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("photos"),
            max_photo_bytes: 10 * 1024 * 1024,
            thumbnail_edge: 320,
        }
    }
}

/// Input for a new photo capture
#[derive(Debug, Clone)]
pub struct NewPhotoCapture {
    pub user_id: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub bytes: Vec<u8>,
}

/// A stored photo row. The image itself lives on disk under `file_name`,
/// the row carries the sync bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: Option<i64>,
    pub uuid: String,
    pub user_id: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub file_name: String,
    pub thumbnail_name: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    pub is_synced: bool,
    pub remote_id: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl TryFrom<&Row<'_>> for PhotoRecord {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let synced_at: Option<i64> = row.get("synced_at")?;
        Ok(PhotoRecord {
            id: Some(row.get("id")?),
            uuid: row.get("uuid")?,
            user_id: row.get("user_id")?,
            captured_at: datetime_from_millis(row.get("captured_at")?)?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            file_name: row.get("file_name")?,
            thumbnail_name: row.get("thumbnail_name")?,
            content_type: row.get("content_type")?,
            size_bytes: row.get("size_bytes")?,
            checksum_sha256: row.get("checksum_sha256")?,
            is_synced: row.get("is_synced")?,
            remote_id: row.get("remote_id")?,
            synced_at: synced_at.map(datetime_from_millis).transpose()?,
        })
    }
}

pub(crate) fn datetime_from_millis(ms: i64) -> Result<DateTime<Utc>, rusqlite::Error> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Integer,
            format!("timestamp out of range: {}", ms).into(),
        )
    })
}
