use crate::error::AppError;
use crate::models::LocationRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// One GPS reading handed in by the tracking loop
#[derive(Debug, Clone)]
pub struct LocationPointInput {
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
}

/// Captures a batch of GPS track points for one user.
///
/// The whole batch is validated first and inserted in a single
/// transaction: either every point is durably stored or none is.
pub fn capture_location_batch(
    conn: &Connection,
    user_id: &str,
    points: Vec<LocationPointInput>,
) -> Result<Vec<LocationRecord>, AppError> {
    if points.is_empty() {
        return Err(AppError::Validation(
            "Location batch must not be empty".to_string(),
        ));
    }

    let mut records = Vec::with_capacity(points.len());
    for point in points {
        let record = LocationRecord::new(
            user_id.to_string(),
            point.captured_at,
            point.latitude,
            point.longitude,
            point.accuracy_m,
        );
        record.validate().map_err(AppError::Validation)?;
        records.push(record);
    }

    let tx = conn.unchecked_transaction()?;
    for record in &mut records {
        tx.execute(
            "INSERT INTO location_records (uuid, user_id, captured_at, latitude, longitude, accuracy_m)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.uuid,
                record.user_id,
                record.captured_at.timestamp_millis(),
                record.latitude,
                record.longitude,
                record.accuracy_m,
            ],
        )?;
        record.id = Some(tx.last_insert_rowid());
    }
    tx.commit()?;

    log::debug!("Captured {} track points for {}", records.len(), user_id);

    Ok(records)
}

/// Captures a single GPS reading
pub fn capture_position(
    conn: &Connection,
    user_id: &str,
    point: LocationPointInput,
) -> Result<LocationRecord, AppError> {
    let mut records = capture_location_batch(conn, user_id, vec![point])?;
    Ok(records.remove(0))
}

pub fn get_location_record(conn: &Connection, uuid: &str) -> Result<LocationRecord, AppError> {
    conn.query_row(
        "SELECT * FROM location_records WHERE uuid = ?1",
        params![uuid],
        |row| LocationRecord::try_from(row),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("Location record {}", uuid)))
}

pub fn list_location_records(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<LocationRecord>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM location_records WHERE user_id = ?1 ORDER BY captured_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| LocationRecord::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Track points still waiting for upload, oldest capture first
pub fn unsynced_location_records(conn: &Connection) -> Result<Vec<LocationRecord>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM location_records WHERE is_synced = 0 ORDER BY captured_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], |row| LocationRecord::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Marks every point of an uploaded batch in one transaction. All points
/// share the server-assigned batch id.
pub fn mark_location_batch_synced(
    conn: &Connection,
    uuids: &[String],
    remote_id: &str,
    synced_at: DateTime<Utc>,
) -> Result<(), AppError> {
    let tx = conn.unchecked_transaction()?;
    for uuid in uuids {
        let rows = tx.execute(
            "UPDATE location_records SET is_synced = 1, remote_id = ?1, synced_at = ?2
             WHERE uuid = ?3 AND is_synced = 0",
            params![remote_id, synced_at.timestamp_millis(), uuid],
        )?;
        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "No pending location record {}",
                uuid
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn delete_location_record(conn: &Connection, uuid: &str) -> Result<(), AppError> {
    let rows = conn.execute(
        "DELETE FROM location_records WHERE uuid = ?1",
        params![uuid],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Location record {}", uuid)));
    }
    Ok(())
}
