use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sync_state::{datetime_from_millis, SyncState};
use super::time_record::validate_coordinates;

/// Longest accepted report body in characters
pub const MAX_REPORT_LENGTH: usize = 2000;

/// A free-text incident or activity report, optionally tagged with the
/// position where it was written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: Option<i64>,
    pub uuid: String,
    pub user_id: String,
    pub body: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sync: SyncState,
}

impl IncidentReport {
    pub fn new(
        user_id: String,
        body: String,
        captured_at: DateTime<Utc>,
        position: Option<(f64, f64)>,
    ) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4().to_string(),
            user_id,
            body,
            captured_at,
            latitude: position.map(|(lat, _)| lat),
            longitude: position.map(|(_, lon)| lon),
            sync: SyncState::local(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("User id must not be empty".to_string());
        }
        if self.body.trim().is_empty() {
            return Err("Report text must not be empty".to_string());
        }
        if self.body.chars().count() > MAX_REPORT_LENGTH {
            return Err(format!(
                "Report text exceeds {} characters",
                MAX_REPORT_LENGTH
            ));
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => validate_coordinates(lat, lon)?,
            (None, None) => {}
            _ => return Err("Position requires both latitude and longitude".to_string()),
        }
        Ok(())
    }
}

impl TryFrom<&Row<'_>> for IncidentReport {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(IncidentReport {
            id: Some(row.get("id")?),
            uuid: row.get("uuid")?,
            user_id: row.get("user_id")?,
            body: row.get("body")?,
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
    fn test_blank_body_is_rejected() {
        let report = IncidentReport::new(
            "officer-7".to_string(),
            "   \n\t ".to_string(),
            Utc::now(),
            None,
        );
        assert!(report.validate().is_err());
    }

    #[test]
    fn test_overlong_body_is_rejected() {
        let report = IncidentReport::new(
            "officer-7".to_string(),
            "x".repeat(MAX_REPORT_LENGTH + 1),
            Utc::now(),
            None,
        );
        assert!(report.validate().is_err());
    }

    #[test]
    fn test_position_is_optional_but_complete() {
        let mut report = IncidentReport::new(
            "officer-7".to_string(),
            "Broken gate at the north entrance".to_string(),
            Utc::now(),
            Some((52.52, 13.405)),
        );
        assert!(report.validate().is_ok());

        report.longitude = None;
        assert!(report.validate().is_err());

        report.latitude = None;
        assert!(report.validate().is_ok());
    }
}
