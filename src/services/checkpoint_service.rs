use crate::error::AppError;
use crate::models::{Checkpoint, CheckpointVerification, PatrolLocation};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use patrol_api::{CheckpointDto, PatrolLocationDto};
use rusqlite::{params, Connection, OptionalExtension};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Replaces the cached patrol locations with the server's list.
/// An empty list is ignored so a flaky response cannot wipe the cache
/// the offline validation depends on.
pub fn replace_patrol_locations(
    conn: &Connection,
    locations: &[PatrolLocationDto],
) -> Result<usize, AppError> {
    if locations.is_empty() {
        log::warn!("Server returned no patrol locations, keeping cached set");
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM patrol_locations", [])?;
    for location in locations {
        tx.execute(
            "INSERT INTO patrol_locations (remote_id, name, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                location.id,
                location.name,
                location.latitude,
                location.longitude
            ],
        )?;
    }
    tx.commit()?;
    Ok(locations.len())
}

/// Replaces the cached checkpoints with the server's list
pub fn replace_checkpoints(
    conn: &Connection,
    checkpoints: &[CheckpointDto],
) -> Result<usize, AppError> {
    if checkpoints.is_empty() {
        log::warn!("Server returned no checkpoints, keeping cached set");
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM checkpoints", [])?;
    for checkpoint in checkpoints {
        tx.execute(
            "INSERT INTO checkpoints (remote_id, location_id, name, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                checkpoint.id,
                checkpoint.location_id,
                checkpoint.name,
                checkpoint.latitude,
                checkpoint.longitude
            ],
        )?;
    }
    tx.commit()?;
    Ok(checkpoints.len())
}

pub fn list_patrol_locations(conn: &Connection) -> Result<Vec<PatrolLocation>, AppError> {
    let mut stmt = conn.prepare("SELECT * FROM patrol_locations ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| PatrolLocation::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_checkpoints(conn: &Connection) -> Result<Vec<Checkpoint>, AppError> {
    let mut stmt = conn.prepare("SELECT * FROM checkpoints ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| Checkpoint::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn get_checkpoint(conn: &Connection, remote_id: &str) -> Result<Option<Checkpoint>, AppError> {
    let checkpoint = conn
        .query_row(
            "SELECT * FROM checkpoints WHERE remote_id = ?1",
            params![remote_id],
            |row| Checkpoint::try_from(row),
        )
        .optional()?;
    Ok(checkpoint)
}

/// Input for a new checkpoint verification
#[derive(Debug, Clone)]
pub struct CheckpointVerifyInput {
    pub user_id: String,
    pub checkpoint_id: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Captures a checkpoint verification.
///
/// Validated entirely against the local cache so it works offline:
/// the checkpoint must be known, the officer must be within the
/// proximity radius, and each checkpoint counts once per user per
/// UTC day. Invalid input writes nothing.
pub fn capture_checkpoint_verification(
    conn: &Connection,
    input: CheckpointVerifyInput,
    proximity_radius_m: f64,
) -> Result<CheckpointVerification, AppError> {
    let mut verification = CheckpointVerification::new(
        input.user_id,
        input.checkpoint_id,
        input.captured_at,
        input.latitude,
        input.longitude,
    );
    verification.validate().map_err(AppError::Validation)?;

    let checkpoint = get_checkpoint(conn, &verification.checkpoint_id)?.ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown checkpoint: {}",
            verification.checkpoint_id
        ))
    })?;

    let distance = distance_m(
        verification.latitude,
        verification.longitude,
        checkpoint.latitude,
        checkpoint.longitude,
    );
    if distance > proximity_radius_m {
        return Err(AppError::Validation(format!(
            "Too far from checkpoint {}: {:.0} m",
            checkpoint.name, distance
        )));
    }

    let day_start = verification
        .captured_at
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc();
    let day_end = day_start + Duration::days(1);
    let already: i64 = conn.query_row(
        "SELECT COUNT(*) FROM checkpoint_verifications
         WHERE user_id = ?1 AND checkpoint_id = ?2 AND captured_at >= ?3 AND captured_at < ?4",
        params![
            verification.user_id,
            verification.checkpoint_id,
            day_start.timestamp_millis(),
            day_end.timestamp_millis(),
        ],
        |row| row.get(0),
    )?;
    if already > 0 {
        return Err(AppError::Validation(format!(
            "Checkpoint {} already verified today",
            checkpoint.name
        )));
    }

    conn.execute(
        "INSERT INTO checkpoint_verifications (uuid, user_id, checkpoint_id, captured_at, latitude, longitude)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            verification.uuid,
            verification.user_id,
            verification.checkpoint_id,
            verification.captured_at.timestamp_millis(),
            verification.latitude,
            verification.longitude,
        ],
    )?;
    verification.id = Some(conn.last_insert_rowid());

    log::info!(
        "Verified checkpoint {} for {} ({:.0} m away)",
        verification.checkpoint_id,
        verification.user_id,
        distance
    );

    Ok(verification)
}

pub fn get_verification(
    conn: &Connection,
    uuid: &str,
) -> Result<CheckpointVerification, AppError> {
    conn.query_row(
        "SELECT * FROM checkpoint_verifications WHERE uuid = ?1",
        params![uuid],
        |row| CheckpointVerification::try_from(row),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("Verification {}", uuid)))
}

pub fn list_verifications(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<CheckpointVerification>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM checkpoint_verifications WHERE user_id = ?1 ORDER BY captured_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| CheckpointVerification::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Verifications still waiting for upload, oldest capture first
pub fn unsynced_verifications(conn: &Connection) -> Result<Vec<CheckpointVerification>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM checkpoint_verifications WHERE is_synced = 0 ORDER BY captured_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], |row| CheckpointVerification::try_from(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn mark_verification_synced(
    conn: &Connection,
    uuid: &str,
    remote_id: &str,
    synced_at: DateTime<Utc>,
) -> Result<(), AppError> {
    let rows = conn.execute(
        "UPDATE checkpoint_verifications SET is_synced = 1, remote_id = ?1, synced_at = ?2
         WHERE uuid = ?3 AND is_synced = 0",
        params![remote_id, synced_at.timestamp_millis(), uuid],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!(
            "No pending verification {}",
            uuid
        )));
    }
    Ok(())
}

pub fn delete_verification(conn: &Connection, uuid: &str) -> Result<(), AppError> {
    let rows = conn.execute(
        "DELETE FROM checkpoint_verifications WHERE uuid = ?1",
        params![uuid],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Verification {}", uuid)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    fn seed_checkpoint(conn: &Connection) {
        replace_checkpoints(
            conn,
            &[CheckpointDto {
                id: "cp-14".to_string(),
                location_id: "loc-3".to_string(),
                name: "North gate".to_string(),
                latitude: 52.5200,
                longitude: 13.4050,
            }],
        )
        .unwrap();
    }

    fn verify_input(latitude: f64, longitude: f64) -> CheckpointVerifyInput {
        CheckpointVerifyInput {
            user_id: "officer-7".to_string(),
            checkpoint_id: "cp-14".to_string(),
            captured_at: Utc::now(),
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_distance_sanity() {
        // 0.01 degrees of latitude is roughly 1.1 km
        let d = distance_m(52.52, 13.405, 52.53, 13.405);
        assert!((1_000.0..1_200.0).contains(&d), "got {}", d);
        assert!(distance_m(52.52, 13.405, 52.52, 13.405) < 0.001);
    }

    #[test]
    fn test_verification_within_radius() {
        let conn = database::open_test_database();
        seed_checkpoint(&conn);

        // About 45 m north of the checkpoint
        let verification =
            capture_checkpoint_verification(&conn, verify_input(52.5204, 13.4050), 100.0).unwrap();
        assert!(!verification.sync.is_synced);
    }

    #[test]
    fn test_verification_too_far_away() {
        let conn = database::open_test_database();
        seed_checkpoint(&conn);

        // About 550 m north
        let result = capture_checkpoint_verification(&conn, verify_input(52.5250, 13.4050), 100.0);
        assert!(result.is_err());
        assert!(list_verifications(&conn, "officer-7").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_checkpoint_is_rejected() {
        let conn = database::open_test_database();
        seed_checkpoint(&conn);

        let mut input = verify_input(52.5200, 13.4050);
        input.checkpoint_id = "cp-99".to_string();
        assert!(capture_checkpoint_verification(&conn, input, 100.0).is_err());
    }

    #[test]
    fn test_once_per_user_per_day() {
        let conn = database::open_test_database();
        seed_checkpoint(&conn);

        capture_checkpoint_verification(&conn, verify_input(52.5200, 13.4050), 100.0).unwrap();
        let again = capture_checkpoint_verification(&conn, verify_input(52.5201, 13.4050), 100.0);
        assert!(again.is_err());

        // A different officer can still verify the same checkpoint
        let mut other = verify_input(52.5200, 13.4050);
        other.user_id = "officer-9".to_string();
        capture_checkpoint_verification(&conn, other, 100.0).unwrap();
    }

    #[test]
    fn test_empty_reference_list_keeps_cache() {
        let conn = database::open_test_database();
        seed_checkpoint(&conn);

        replace_checkpoints(&conn, &[]).unwrap();
        assert_eq!(list_checkpoints(&conn).unwrap().len(), 1);
    }
}
