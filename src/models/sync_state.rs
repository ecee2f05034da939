use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Sync bookkeeping shared by every captured entity.
///
/// A freshly captured record starts as `local()`. The sync engine flips
/// `is_synced` exactly once, at the same time it stores the server-assigned
/// `remote_id` and the `synced_at` instant. `remote_id` is never set on an
/// unsynced record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub is_synced: bool,
    pub remote_id: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// State of a record that only exists on this device
    pub fn local() -> Self {
        Self {
            is_synced: false,
            remote_id: None,
            synced_at: None,
        }
    }

    /// Reads the three sync columns shared by all entity tables
    pub fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let synced_at: Option<i64> = row.get("synced_at")?;
        Ok(Self {
            is_synced: row.get("is_synced")?,
            remote_id: row.get("remote_id")?,
            synced_at: synced_at.map(datetime_from_millis).transpose()?,
        })
    }
}

/// Converts an epoch-milliseconds column value to a UTC timestamp
pub fn datetime_from_millis(ms: i64) -> Result<DateTime<Utc>, rusqlite::Error> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Integer,
            format!("timestamp out of range: {}", ms).into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_state_is_unsynced() {
        let state = SyncState::local();
        assert!(!state.is_synced);
        assert!(state.remote_id.is_none());
        assert!(state.synced_at.is_none());
    }

    #[test]
    fn test_millis_roundtrip() {
        let now = Utc::now();
        let restored = datetime_from_millis(now.timestamp_millis()).unwrap();
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }
}
