use crate::error::AppError;
use crate::services::sync_service;
use chrono::Utc;
use photo_store::PhotoStore;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const EXPORT_FORMAT_VERSION: u32 = 1;

/// Tables included in a backup. The auth session is deliberately not
/// on this list, tokens never leave the device.
const EXPORTED_TABLES: [&str; 8] = [
    "time_records",
    "location_records",
    "checkpoint_verifications",
    "incident_reports",
    "photos",
    "patrol_locations",
    "checkpoints",
    "sync_settings",
];

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub format_version: u32,
    pub exported_at: String,
    pub app_version: String,
    pub device_id: Option<String>,
    pub entity_counts: BTreeMap<String, usize>,
}

/// Writes a zip backup of the local store into `target_dir`.
///
/// Layout: `metadata.json`, one `data/<table>.json` per table, photo
/// originals under `photos/`. Thumbnails are skipped, they can be
/// rebuilt from the originals.
pub fn export_backup(
    conn: &Connection,
    store: &PhotoStore,
    target_dir: &Path,
) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(target_dir)?;

    let file_name = format!(
        "security-patrol-backup-{}.zip",
        Utc::now().format("%Y%m%d-%H%M%S")
    );
    let zip_path = target_dir.join(&file_name);

    let file = File::create(&zip_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options: zip::write::FileOptions<'_, ()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut dumps = Vec::with_capacity(EXPORTED_TABLES.len());
    let mut entity_counts = BTreeMap::new();
    for table in EXPORTED_TABLES {
        let rows = dump_table(conn, table)?;
        entity_counts.insert(
            table.to_string(),
            rows.as_array().map(|a| a.len()).unwrap_or(0),
        );
        dumps.push((table, rows));
    }

    let metadata = ExportMetadata {
        format_version: EXPORT_FORMAT_VERSION,
        exported_at: Utc::now().to_rfc3339(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        device_id: sync_service::load_sync_settings(conn)?.and_then(|s| s.device_id),
        entity_counts,
    };
    zip.start_file("metadata.json", options)
        .map_err(zip_error)?;
    zip.write_all(
        serde_json::to_string_pretty(&metadata)
            .map_err(|e| AppError::Other(format!("Failed to serialize metadata: {}", e)))?
            .as_bytes(),
    )?;

    for (table, rows) in dumps {
        zip.start_file(format!("data/{}.json", table), options)
            .map_err(zip_error)?;
        zip.write_all(
            serde_json::to_string_pretty(&rows)
                .map_err(|e| AppError::Other(format!("Failed to serialize {}: {}", table, e)))?
                .as_bytes(),
        )?;
    }

    let mut photo_files = 0usize;
    for photo in store.list_photos(conn)? {
        let path = store.photo_path(&photo.file_name);
        if !path.exists() {
            log::warn!("Photo file {} missing, left out of backup", photo.file_name);
            continue;
        }
        zip.start_file(format!("photos/{}", photo.file_name), options)
            .map_err(zip_error)?;
        zip.write_all(&std::fs::read(&path)?)?;
        photo_files += 1;
    }

    zip.finish().map_err(zip_error)?;

    log::info!(
        "Exported backup to {:?} ({} photo files)",
        zip_path,
        photo_files
    );

    Ok(zip_path)
}

fn zip_error(e: zip::result::ZipError) -> AppError {
    AppError::Other(format!("Zip error: {}", e))
}

/// All rows of a table as a JSON array of objects keyed by column name
fn dump_table(conn: &Connection, table: &str) -> Result<serde_json::Value, AppError> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", table))?;
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = serde_json::Map::new();
        for (i, name) in column_names.iter().enumerate() {
            object.insert(name.clone(), value_to_json(row.get_ref(i)?));
        }
        out.push(serde_json::Value::Object(object));
    }
    Ok(serde_json::Value::Array(out))
}

fn value_to_json(value: rusqlite::types::ValueRef<'_>) -> serde_json::Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(text) => serde_json::Value::from(String::from_utf8_lossy(text).into_owned()),
        // No exported table stores blobs, photo bytes live as files
        ValueRef::Blob(_) => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::services::report_service;
    use crate::services::report_service::ReportInput;
    use photo_store::{NewPhotoCapture, PhotoStoreConfig};
    use std::io::Read;

    fn test_store() -> PhotoStore {
        let dir = std::env::temp_dir().join(format!("patrol-export-{}", uuid::Uuid::new_v4()));
        PhotoStore::new(PhotoStoreConfig {
            storage_dir: dir,
            ..PhotoStoreConfig::default()
        })
    }

    fn sample_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_fn(32, 32, |x, y| image::Rgb([x as u8, y as u8, 40]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut bytes, image::ImageFormat::Jpeg)
            .unwrap();
        bytes.into_inner()
    }

    #[tokio::test]
    async fn test_backup_round_trips_through_zip() {
        let conn = database::open_test_database();
        let store = test_store();

        let report = report_service::capture_report(
            &conn,
            ReportInput {
                user_id: "officer-7".to_string(),
                body: "Side door found unlocked".to_string(),
                captured_at: Utc::now(),
                position: Some((52.52, 13.405)),
            },
        )
        .unwrap();

        let photo = store
            .save_capture(
                &conn,
                NewPhotoCapture {
                    user_id: "officer-7".to_string(),
                    captured_at: Utc::now(),
                    latitude: None,
                    longitude: None,
                    bytes: sample_jpeg(),
                },
            )
            .await
            .unwrap();

        let target = std::env::temp_dir().join(format!("patrol-export-out-{}", uuid::Uuid::new_v4()));
        let zip_path = export_backup(&conn, &store, &target).unwrap();
        assert!(zip_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("security-patrol-backup-"));

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();

        let mut raw = String::new();
        archive
            .by_name("metadata.json")
            .unwrap()
            .read_to_string(&mut raw)
            .unwrap();
        let metadata: ExportMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(metadata.format_version, EXPORT_FORMAT_VERSION);
        assert_eq!(metadata.entity_counts["incident_reports"], 1);
        assert_eq!(metadata.entity_counts["photos"], 1);
        assert_eq!(metadata.entity_counts["time_records"], 0);

        let mut raw = String::new();
        archive
            .by_name("data/incident_reports.json")
            .unwrap()
            .read_to_string(&mut raw)
            .unwrap();
        let rows: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["uuid"], serde_json::json!(report.uuid));
        assert_eq!(rows[0]["body"], serde_json::json!("Side door found unlocked"));
        assert_eq!(rows[0]["is_synced"], serde_json::json!(0));

        let mut bytes = Vec::new();
        archive
            .by_name(&format!("photos/{}", photo.file_name))
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert_eq!(bytes.len() as i64, photo.size_bytes);
    }

    #[test]
    fn test_auth_session_is_never_exported() {
        assert!(!EXPORTED_TABLES.contains(&"auth_session"));

        let conn = database::open_test_database();
        let store = test_store();
        let target = std::env::temp_dir().join(format!("patrol-export-out-{}", uuid::Uuid::new_v4()));
        let zip_path = export_backup(&conn, &store, &target).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert!(archive.by_name("data/auth_session.json").is_err());
        // Every listed table made it in
        for table in EXPORTED_TABLES {
            assert!(archive.by_name(&format!("data/{}.json", table)).is_ok());
        }
    }
}
