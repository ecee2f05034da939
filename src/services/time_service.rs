use crate::error::AppError;
use crate::models::{TimeRecord, TimeRecordType};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Input for a new clock-in or clock-out capture
#[derive(Debug, Clone)]
pub struct TimeCaptureInput {
    pub user_id: String,
    pub record_type: TimeRecordType,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Captures a time record.
///
/// Clock-ins and clock-outs must alternate per user: the first capture is
/// a clock-in, afterwards each capture must be the opposite of the user's
/// latest one. Invalid input writes nothing.
pub fn capture_time_record(
    conn: &Connection,
    input: TimeCaptureInput,
) -> Result<TimeRecord, AppError> {
    let mut record = TimeRecord::new(
        input.user_id,
        input.record_type,
        input.captured_at,
        input.latitude,
        input.longitude,
    );
    record.validate().map_err(AppError::Validation)?;

    match latest_record_type(conn, &record.user_id)? {
        None => {
            if record.record_type != TimeRecordType::ClockIn {
                return Err(AppError::Validation(
                    "First time record must be a clock-in".to_string(),
                ));
            }
        }
        Some(previous) => {
            if record.record_type != previous.opposite() {
                return Err(AppError::Validation(format!(
                    "Expected {} after {}",
                    previous.opposite().as_str(),
                    previous.as_str()
                )));
            }
        }
    }

    conn.execute(
        "INSERT INTO time_records (uuid, user_id, record_type, captured_at, latitude, longitude)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.uuid,
            record.user_id,
            record.record_type.as_str(),
            record.captured_at.timestamp_millis(),
            record.latitude,
            record.longitude,
        ],
    )?;
    record.id = Some(conn.last_insert_rowid());

    log::info!(
        "Captured {} for {} at {}",
        record.record_type.as_str(),
        record.user_id,
        record.captured_at
    );

    Ok(record)
}

/// Type of the user's most recent record, by capture time
fn latest_record_type(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<TimeRecordType>, AppError> {
    let latest: Option<String> = conn
        .query_row(
            "SELECT record_type FROM time_records
             WHERE user_id = ?1
             ORDER BY captured_at DESC, id DESC
             LIMIT 1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;

    match latest {
        None => Ok(None),
        Some(s) => TimeRecordType::from_str(&s)
            .map(Some)
            .ok_or_else(|| AppError::Other(format!("Corrupt record type: {}", s))),
    }
}

/// On-duty state derived from the user's latest time record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStatus {
    ClockedIn,
    ClockedOut,
}

pub fn current_status(conn: &Connection, user_id: &str) -> Result<ClockStatus, AppError> {
    match latest_record_type(conn, user_id)? {
        Some(TimeRecordType::ClockIn) => Ok(ClockStatus::ClockedIn),
        Some(TimeRecordType::ClockOut) | None => Ok(ClockStatus::ClockedOut),
    }
}

pub fn get_time_record(conn: &Connection, uuid: &str) -> Result<TimeRecord, AppError> {
    conn.query_row(
        "SELECT * FROM time_records WHERE uuid = ?1",
        params![uuid],
        |row| TimeRecord::try_from(row),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("Time record {}", uuid)))
}

pub fn list_time_records(conn: &Connection, user_id: &str) -> Result<Vec<TimeRecord>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM time_records WHERE user_id = ?1 ORDER BY captured_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| TimeRecord::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Records still waiting for upload, oldest capture first
pub fn unsynced_time_records(conn: &Connection) -> Result<Vec<TimeRecord>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM time_records WHERE is_synced = 0 ORDER BY captured_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], |row| TimeRecord::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Records a successful upload in one statement. The pending guard makes
/// the transition one-way: a record can never return to unsynced.
pub fn mark_time_record_synced(
    conn: &Connection,
    uuid: &str,
    remote_id: &str,
    synced_at: DateTime<Utc>,
) -> Result<(), AppError> {
    let rows = conn.execute(
        "UPDATE time_records SET is_synced = 1, remote_id = ?1, synced_at = ?2
         WHERE uuid = ?3 AND is_synced = 0",
        params![remote_id, synced_at.timestamp_millis(), uuid],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("No pending time record {}", uuid)));
    }
    Ok(())
}

/// Corrective edit of position or capture time, only while unsynced
pub fn update_time_record(conn: &Connection, record: &TimeRecord) -> Result<(), AppError> {
    record.validate().map_err(AppError::Validation)?;

    let existing = get_time_record(conn, &record.uuid)?;
    if existing.sync.is_synced {
        return Err(AppError::Validation(
            "Record is already synced and can no longer be edited".to_string(),
        ));
    }

    conn.execute(
        "UPDATE time_records SET captured_at = ?1, latitude = ?2, longitude = ?3
         WHERE uuid = ?4 AND is_synced = 0",
        params![
            record.captured_at.timestamp_millis(),
            record.latitude,
            record.longitude,
            record.uuid,
        ],
    )?;
    Ok(())
}

pub fn delete_time_record(conn: &Connection, uuid: &str) -> Result<(), AppError> {
    let rows = conn.execute("DELETE FROM time_records WHERE uuid = ?1", params![uuid])?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Time record {}", uuid)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use chrono::Duration;

    fn input(record_type: TimeRecordType, minutes_ago: i64) -> TimeCaptureInput {
        TimeCaptureInput {
            user_id: "officer-7".to_string(),
            record_type,
            captured_at: Utc::now() - Duration::minutes(minutes_ago),
            latitude: 52.52,
            longitude: 13.405,
        }
    }

    #[test]
    fn test_capture_starts_unsynced() {
        let conn = database::open_test_database();
        let record = capture_time_record(&conn, input(TimeRecordType::ClockIn, 10)).unwrap();

        assert!(record.id.is_some());
        assert!(!record.sync.is_synced);
        assert!(record.sync.remote_id.is_none());

        let stored = get_time_record(&conn, &record.uuid).unwrap();
        assert_eq!(stored.record_type, TimeRecordType::ClockIn);
        assert!(!stored.sync.is_synced);
    }

    #[test]
    fn test_clock_events_must_alternate() {
        let conn = database::open_test_database();

        // First record must be a clock-in
        assert!(capture_time_record(&conn, input(TimeRecordType::ClockOut, 30)).is_err());

        capture_time_record(&conn, input(TimeRecordType::ClockIn, 20)).unwrap();
        assert!(capture_time_record(&conn, input(TimeRecordType::ClockIn, 10)).is_err());

        capture_time_record(&conn, input(TimeRecordType::ClockOut, 5)).unwrap();
        capture_time_record(&conn, input(TimeRecordType::ClockIn, 1)).unwrap();

        // Rejected captures wrote nothing
        assert_eq!(list_time_records(&conn, "officer-7").unwrap().len(), 3);
    }

    #[test]
    fn test_alternation_is_per_user() {
        let conn = database::open_test_database();
        capture_time_record(&conn, input(TimeRecordType::ClockIn, 10)).unwrap();

        let mut other = input(TimeRecordType::ClockIn, 5);
        other.user_id = "officer-9".to_string();
        capture_time_record(&conn, other).unwrap();
    }

    #[test]
    fn test_current_status_follows_the_latest_record() {
        let conn = database::open_test_database();
        assert_eq!(
            current_status(&conn, "officer-7").unwrap(),
            ClockStatus::ClockedOut
        );

        capture_time_record(&conn, input(TimeRecordType::ClockIn, 10)).unwrap();
        assert_eq!(
            current_status(&conn, "officer-7").unwrap(),
            ClockStatus::ClockedIn
        );

        capture_time_record(&conn, input(TimeRecordType::ClockOut, 5)).unwrap();
        assert_eq!(
            current_status(&conn, "officer-7").unwrap(),
            ClockStatus::ClockedOut
        );
    }

    #[test]
    fn test_invalid_coordinates_write_nothing() {
        let conn = database::open_test_database();
        let mut bad = input(TimeRecordType::ClockIn, 10);
        bad.latitude = 95.0;

        assert!(capture_time_record(&conn, bad).is_err());
        assert!(list_time_records(&conn, "officer-7").unwrap().is_empty());
    }

    #[test]
    fn test_mark_synced_is_one_way() {
        let conn = database::open_test_database();
        let record = capture_time_record(&conn, input(TimeRecordType::ClockIn, 10)).unwrap();

        mark_time_record_synced(&conn, &record.uuid, "srv-100", Utc::now()).unwrap();

        let stored = get_time_record(&conn, &record.uuid).unwrap();
        assert!(stored.sync.is_synced);
        assert_eq!(stored.sync.remote_id.as_deref(), Some("srv-100"));
        assert!(stored.sync.synced_at.is_some());

        assert!(mark_time_record_synced(&conn, &record.uuid, "srv-101", Utc::now()).is_err());
        assert!(unsynced_time_records(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_unsynced_ordered_by_capture_time_not_insertion() {
        let conn = database::open_test_database();
        let newer = capture_time_record(&conn, input(TimeRecordType::ClockIn, 5)).unwrap();
        // Inserted later but captured earlier
        let older = capture_time_record(&conn, input(TimeRecordType::ClockOut, 60)).unwrap();

        let pending = unsynced_time_records(&conn).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].uuid, older.uuid);
        assert_eq!(pending[1].uuid, newer.uuid);
    }

    #[test]
    fn test_synced_record_refuses_edits() {
        let conn = database::open_test_database();
        let mut record = capture_time_record(&conn, input(TimeRecordType::ClockIn, 10)).unwrap();

        record.latitude = 48.137;
        update_time_record(&conn, &record).unwrap();

        mark_time_record_synced(&conn, &record.uuid, "srv-100", Utc::now()).unwrap();
        record.latitude = 50.0;
        assert!(update_time_record(&conn, &record).is_err());

        // Stored value unchanged after the refused edit
        let stored = get_time_record(&conn, &record.uuid).unwrap();
        assert_eq!(stored.latitude, 48.137);
    }
}
