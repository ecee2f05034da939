use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sync_state::{datetime_from_millis, SyncState};
use super::time_record::validate_coordinates;

/// A single GPS track point recorded while a patrol is active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: Option<i64>,
    pub uuid: String,
    pub user_id: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Reported GPS accuracy radius in meters
    pub accuracy_m: f64,
    pub sync: SyncState,
}

impl LocationRecord {
    pub fn new(
        user_id: String,
        captured_at: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        accuracy_m: f64,
    ) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4().to_string(),
            user_id,
            captured_at,
            latitude,
            longitude,
            accuracy_m,
            sync: SyncState::local(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("User id must not be empty".to_string());
        }
        validate_coordinates(self.latitude, self.longitude)?;
        if !self.accuracy_m.is_finite() || self.accuracy_m < 0.0 {
            return Err(format!("Accuracy out of range: {}", self.accuracy_m));
        }
        Ok(())
    }
}

impl TryFrom<&Row<'_>> for LocationRecord {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(LocationRecord {
            id: Some(row.get("id")?),
            uuid: row.get("uuid")?,
            user_id: row.get("user_id")?,
            captured_at: datetime_from_millis(row.get("captured_at")?)?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            accuracy_m: row.get("accuracy_m")?,
            sync: SyncState::from_row(row)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_point() {
        let point = LocationRecord::new("officer-7".to_string(), Utc::now(), 48.137, 11.575, 4.5);
        assert!(point.validate().is_ok());
    }

    #[test]
    fn test_negative_accuracy_is_rejected() {
        let point = LocationRecord::new("officer-7".to_string(), Utc::now(), 48.137, 11.575, -1.0);
        assert!(point.validate().is_err());
    }
}
