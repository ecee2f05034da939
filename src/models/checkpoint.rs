use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sync_state::{datetime_from_millis, SyncState};
use super::time_record::validate_coordinates;

/// A patrol site served by the backend, cached locally for offline use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatrolLocation {
    pub id: Option<i64>,
    pub remote_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl TryFrom<&Row<'_>> for PatrolLocation {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(PatrolLocation {
            id: Some(row.get("id")?),
            remote_id: row.get("remote_id")?,
            name: row.get("name")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
        })
    }
}

/// A physical checkpoint within a patrol location, cached locally so
/// verifications can be validated without a network connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Option<i64>,
    pub remote_id: String,
    pub location_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl TryFrom<&Row<'_>> for Checkpoint {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Checkpoint {
            id: Some(row.get("id")?),
            remote_id: row.get("remote_id")?,
            location_id: row.get("location_id")?,
            name: row.get("name")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
        })
    }
}

/// Proof that an officer stood at a checkpoint at a given time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointVerification {
    pub id: Option<i64>,
    pub uuid: String,
    pub user_id: String,
    /// Remote id of the verified checkpoint
    pub checkpoint_id: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub sync: SyncState,
}

impl CheckpointVerification {
    pub fn new(
        user_id: String,
        checkpoint_id: String,
        captured_at: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4().to_string(),
            user_id,
            checkpoint_id,
            captured_at,
            latitude,
            longitude,
            sync: SyncState::local(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("User id must not be empty".to_string());
        }
        if self.checkpoint_id.trim().is_empty() {
            return Err("Checkpoint id must not be empty".to_string());
        }
        validate_coordinates(self.latitude, self.longitude)?;
        Ok(())
    }
}

impl TryFrom<&Row<'_>> for CheckpointVerification {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(CheckpointVerification {
            id: Some(row.get("id")?),
            uuid: row.get("uuid")?,
            user_id: row.get("user_id")?,
            checkpoint_id: row.get("checkpoint_id")?,
            captured_at: datetime_from_millis(row.get("captured_at")?)?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            sync: SyncState::from_row(row)?,
        })
    }
}
