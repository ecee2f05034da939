use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sync_state::{datetime_from_millis, SyncState};

/// Whether a time record starts or ends a shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRecordType {
    ClockIn,
    ClockOut,
}

impl TimeRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRecordType::ClockIn => "clock_in",
            TimeRecordType::ClockOut => "clock_out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "clock_in" => Some(TimeRecordType::ClockIn),
            "clock_out" => Some(TimeRecordType::ClockOut),
            _ => None,
        }
    }

    /// The record type a user must capture next after this one
    pub fn opposite(&self) -> Self {
        match self {
            TimeRecordType::ClockIn => TimeRecordType::ClockOut,
            TimeRecordType::ClockOut => TimeRecordType::ClockIn,
        }
    }
}

/// A clock-in or clock-out event captured on the device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRecord {
    pub id: Option<i64>,
    pub uuid: String,
    pub user_id: String,
    pub record_type: TimeRecordType,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub sync: SyncState,
}

impl TimeRecord {
    pub fn new(
        user_id: String,
        record_type: TimeRecordType,
        captured_at: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4().to_string(),
            user_id,
            record_type,
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
        validate_coordinates(self.latitude, self.longitude)?;
        Ok(())
    }
}

/// Shared coordinate check used by every capture that carries a position
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), String> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("Latitude out of range: {}", latitude));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("Longitude out of range: {}", longitude));
    }
    Ok(())
}

impl TryFrom<&Row<'_>> for TimeRecord {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let type_str: String = row.get("record_type")?;
        let record_type = TimeRecordType::from_str(&type_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown record type: {}", type_str).into(),
            )
        })?;

        Ok(TimeRecord {
            id: Some(row.get("id")?),
            uuid: row.get("uuid")?,
            user_id: row.get("user_id")?,
            record_type,
            captured_at: datetime_from_millis(row.get("captured_at")?)?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            sync: SyncState::from_row(row)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_time_record_starts_local() {
        let record = TimeRecord::new(
            "officer-7".to_string(),
            TimeRecordType::ClockIn,
            Utc::now(),
            52.52,
            13.405,
        );
        assert!(record.id.is_none());
        assert!(!record.sync.is_synced);
        assert!(record.sync.remote_id.is_none());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_record_type_roundtrip() {
        assert_eq!(TimeRecordType::from_str("clock_in"), Some(TimeRecordType::ClockIn));
        assert_eq!(TimeRecordType::from_str("clock_out"), Some(TimeRecordType::ClockOut));
        assert_eq!(TimeRecordType::from_str("lunch"), None);
        assert_eq!(TimeRecordType::ClockIn.opposite(), TimeRecordType::ClockOut);
    }

    #[test]
    fn test_coordinates_out_of_range() {
        let mut record = TimeRecord::new(
            "officer-7".to_string(),
            TimeRecordType::ClockIn,
            Utc::now(),
            91.0,
            0.0,
        );
        assert!(record.validate().is_err());

        record.latitude = 0.0;
        record.longitude = -181.0;
        assert!(record.validate().is_err());

        record.longitude = f64::NAN;
        assert!(record.validate().is_err());
    }
}
