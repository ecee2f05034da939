use crate::config;
use crate::database;
use crate::error::AppError;
use crate::models::SyncSettings;
use crate::services::{photo_service, sync_service};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use photo_store::PhotoStore;
use rusqlite::{params, Connection};

/// Cleanup runs at most once per day
const CLEANUP_MIN_INTERVAL_HOURS: i64 = 24;

/// Rows and files removed by one retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub time_records: usize,
    pub location_records: usize,
    pub checkpoint_verifications: usize,
    pub reports: usize,
    pub photos: usize,
    pub orphan_files: usize,
}

impl CleanupStats {
    pub fn total_rows(&self) -> usize {
        self.time_records
            + self.location_records
            + self.checkpoint_verifications
            + self.reports
            + self.photos
    }
}

/// Deletes synced entities whose capture time is older than the
/// retention window.
///
/// Only rows with `is_synced = 1` are ever touched; anything still
/// waiting for upload is kept regardless of age. Photo rows take their
/// stored files with them, and files no row references any more are
/// swept afterwards.
pub fn run_retention_cleanup(
    conn: &Connection,
    store: &PhotoStore,
    retention_days: i64,
) -> Result<CleanupStats, AppError> {
    if retention_days <= 0 {
        return Err(AppError::Validation(
            "Retention must be at least one day".to_string(),
        ));
    }

    let cutoff = Utc::now() - Duration::days(retention_days);
    let mut stats = CleanupStats {
        time_records: delete_expired(conn, "time_records", cutoff)?,
        location_records: delete_expired(conn, "location_records", cutoff)?,
        checkpoint_verifications: delete_expired(conn, "checkpoint_verifications", cutoff)?,
        reports: delete_expired(conn, "incident_reports", cutoff)?,
        photos: 0,
        orphan_files: 0,
    };

    for photo in store.expired_synced_photos(conn, cutoff)? {
        store.delete_photo(conn, &photo.uuid)?;
        stats.photos += 1;
    }
    stats.orphan_files = store.remove_orphaned_files(conn)?;

    sync_service::update_last_cleanup(conn)?;

    if stats.total_rows() > 0 || stats.orphan_files > 0 {
        log::info!(
            "Retention cleanup removed {} rows and {} orphan files (older than {} days)",
            stats.total_rows(),
            stats.orphan_files,
            retention_days
        );
    }

    Ok(stats)
}

fn delete_expired(
    conn: &Connection,
    table: &str,
    cutoff: DateTime<Utc>,
) -> Result<usize, AppError> {
    let rows = conn.execute(
        &format!(
            "DELETE FROM {} WHERE is_synced = 1 AND captured_at < ?1",
            table
        ),
        params![cutoff.timestamp_millis()],
    )?;
    Ok(rows)
}

/// True once the last cleanup lies more than a day back
pub fn cleanup_due(settings: &SyncSettings) -> bool {
    let last = match settings.last_cleanup.as_deref() {
        Some(last) => last,
        None => return true,
    };
    match NaiveDateTime::parse_from_str(last, "%Y-%m-%d %H:%M:%S") {
        Ok(parsed) => {
            parsed.and_utc() + Duration::hours(CLEANUP_MIN_INTERVAL_HOURS) <= Utc::now()
        }
        Err(_) => {
            log::warn!("Unreadable last_cleanup timestamp {:?}, running cleanup", last);
            true
        }
    }
}

/// Runs a retention pass against the configured store when one is due.
/// Returns `Ok(None)` when the last pass is recent enough.
pub fn run_cleanup_if_due() -> Result<Option<CleanupStats>, AppError> {
    let conn = database::init_database()?;
    let app_config = config::load_or_default(&config::config_path())?;
    let settings = sync_service::ensure_sync_settings(&conn, &app_config)?;

    if !cleanup_due(&settings) {
        return Ok(None);
    }

    let store = photo_service::build_store(&app_config);
    run_retention_cleanup(&conn, &store, settings.retention_days).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeRecordType;
    use crate::services::{report_service, time_service};
    use crate::services::report_service::ReportInput;
    use crate::services::time_service::TimeCaptureInput;
    use photo_store::{NewPhotoCapture, PhotoStoreConfig};

    fn test_store() -> PhotoStore {
        let dir = std::env::temp_dir().join(format!("patrol-cleanup-{}", uuid::Uuid::new_v4()));
        PhotoStore::new(PhotoStoreConfig {
            storage_dir: dir,
            ..PhotoStoreConfig::default()
        })
    }

    fn sample_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_fn(48, 48, |x, y| image::Rgb([x as u8, y as u8, 80]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut bytes, image::ImageFormat::Jpeg)
            .unwrap();
        bytes.into_inner()
    }

    async fn photo_days_old(
        conn: &Connection,
        store: &PhotoStore,
        days: i64,
    ) -> photo_store::PhotoRecord {
        store
            .save_capture(
                conn,
                NewPhotoCapture {
                    user_id: "officer-7".to_string(),
                    captured_at: Utc::now() - Duration::days(days),
                    latitude: None,
                    longitude: None,
                    bytes: sample_jpeg(),
                },
            )
            .await
            .unwrap()
    }

    fn report_days_old(conn: &Connection, days: i64) -> crate::models::IncidentReport {
        report_service::capture_report(
            conn,
            ReportInput {
                user_id: "officer-7".to_string(),
                body: "Fence damage on the east side".to_string(),
                captured_at: Utc::now() - Duration::days(days),
                position: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_photo_retention_deletes_exactly_the_expired_synced_one() {
        let conn = crate::database::open_test_database();
        let store = test_store();

        let old = photo_days_old(&conn, &store, 35).await;
        let middle = photo_days_old(&conn, &store, 25).await;
        let fresh = photo_days_old(&conn, &store, 15).await;
        for photo in [&old, &middle, &fresh] {
            store
                .mark_synced(&conn, &photo.uuid, "srv-1", Utc::now())
                .unwrap();
        }

        let stats = run_retention_cleanup(&conn, &store, 30).unwrap();
        assert_eq!(stats.photos, 1);

        assert!(store.get_photo(&conn, &old.uuid).unwrap().is_none());
        assert!(!store.photo_path(&old.file_name).exists());

        assert!(store.get_photo(&conn, &middle.uuid).unwrap().is_some());
        assert!(store.photo_path(&middle.file_name).exists());
        assert!(store.get_photo(&conn, &fresh.uuid).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unsynced_is_kept_regardless_of_age() {
        let conn = crate::database::open_test_database();
        let store = test_store();

        // 40 days old but never uploaded
        let pending_photo = photo_days_old(&conn, &store, 40).await;
        let pending_report = report_days_old(&conn, 40);

        let synced_report = report_days_old(&conn, 40);
        report_service::mark_report_synced(&conn, &synced_report.uuid, "srv-9", Utc::now())
            .unwrap();

        let stats = run_retention_cleanup(&conn, &store, 30).unwrap();
        assert_eq!(stats.photos, 0);
        assert_eq!(stats.reports, 1);

        assert!(store.get_photo(&conn, &pending_photo.uuid).unwrap().is_some());
        assert!(store.photo_path(&pending_photo.file_name).exists());
        assert!(report_service::get_report(&conn, &pending_report.uuid).is_ok());
        assert!(report_service::get_report(&conn, &synced_report.uuid).is_err());
    }

    #[test]
    fn test_time_records_follow_the_same_rule() {
        let conn = crate::database::open_test_database();
        let store = test_store();

        let old_in = time_service::capture_time_record(
            &conn,
            TimeCaptureInput {
                user_id: "officer-7".to_string(),
                record_type: TimeRecordType::ClockIn,
                captured_at: Utc::now() - Duration::days(45),
                latitude: 52.52,
                longitude: 13.405,
            },
        )
        .unwrap();
        let old_out = time_service::capture_time_record(
            &conn,
            TimeCaptureInput {
                user_id: "officer-7".to_string(),
                record_type: TimeRecordType::ClockOut,
                captured_at: Utc::now() - Duration::days(45) + Duration::hours(8),
                latitude: 52.52,
                longitude: 13.405,
            },
        )
        .unwrap();

        time_service::mark_time_record_synced(&conn, &old_in.uuid, "srv-1", Utc::now()).unwrap();
        // old_out stays pending

        let stats = run_retention_cleanup(&conn, &store, 30).unwrap();
        assert_eq!(stats.time_records, 1);
        assert!(time_service::get_time_record(&conn, &old_in.uuid).is_err());
        assert!(time_service::get_time_record(&conn, &old_out.uuid).is_ok());
    }

    #[test]
    fn test_zero_retention_is_rejected() {
        let conn = crate::database::open_test_database();
        let store = test_store();
        assert!(run_retention_cleanup(&conn, &store, 0).is_err());
    }

    #[test]
    fn test_cleanup_due_checks_the_interval() {
        let mut settings = SyncSettings::new("https://patrol.test/api/v1".to_string(), 60, 30);
        assert!(cleanup_due(&settings));

        settings.last_cleanup = Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
        assert!(!cleanup_due(&settings));

        settings.last_cleanup = Some(
            (Utc::now() - Duration::hours(30))
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        );
        assert!(cleanup_due(&settings));
    }

    #[test]
    fn test_cleanup_records_its_run() {
        let conn = crate::database::open_test_database();
        let store = test_store();
        let settings = SyncSettings::new("https://patrol.test/api/v1".to_string(), 60, 30);
        crate::services::sync_service::save_sync_settings(&conn, &settings).unwrap();

        run_retention_cleanup(&conn, &store, 30).unwrap();

        let stored = crate::services::sync_service::load_sync_settings(&conn)
            .unwrap()
            .unwrap();
        assert!(stored.last_cleanup.is_some());
    }
}
