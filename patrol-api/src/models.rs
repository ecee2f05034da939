use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire payload for a clock-in or clock-out event.
///
/// `client_ref` is the device-generated UUID of the record. The server
/// treats it as an idempotency key, so re-sending after a lost response
/// does not create a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRecordUpload {
    pub client_ref: String,
    pub user_id: String,
    pub record_type: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// One GPS point inside a location batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPointUpload {
    pub client_ref: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
}

/// Wire payload for a batch of GPS track points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBatchUpload {
    pub batch_ref: String,
    pub user_id: String,
    pub points: Vec<LocationPointUpload>,
}

/// Wire payload for a captured photo, image bytes inline as base64
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUpload {
    pub client_ref: String,
    pub user_id: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub content_type: String,
    pub checksum_sha256: String,
    pub image_base64: String,
}

impl PhotoUpload {
    /// Encodes raw image bytes for the JSON payload
    pub fn encode_image(bytes: &[u8]) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }
}

/// Wire payload for a checkpoint verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointVerifyUpload {
    pub client_ref: String,
    pub user_id: String,
    pub checkpoint_id: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Wire payload for an incident or activity report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportUpload {
    pub client_ref: String,
    pub user_id: String,
    pub body: String,
    pub captured_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Standard answer of every upload endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

/// A patrol site as served by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatrolLocationDto {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A checkpoint as served by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointDto {
    pub id: String,
    pub location_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_record_upload_uses_camel_case() {
        let upload = TimeRecordUpload {
            client_ref: "9f7c".to_string(),
            user_id: "officer-7".to_string(),
            record_type: "clock_in".to_string(),
            captured_at: Utc::now(),
            latitude: 52.52,
            longitude: 13.405,
        };
        let value = serde_json::to_value(&upload).unwrap();
        assert!(value.get("clientRef").is_some());
        assert!(value.get("userId").is_some());
        assert!(value.get("capturedAt").is_some());
        assert!(value.get("client_ref").is_none());
    }

    #[test]
    fn test_report_upload_omits_nothing_but_serializes_null_position() {
        let upload = ReportUpload {
            client_ref: "9f7c".to_string(),
            user_id: "officer-7".to_string(),
            body: "All quiet".to_string(),
            captured_at: Utc::now(),
            latitude: None,
            longitude: None,
        };
        let value = serde_json::to_value(&upload).unwrap();
        assert!(value.get("latitude").unwrap().is_null());
    }

    #[test]
    fn test_checkpoint_dto_parses() {
        let dto: CheckpointDto = serde_json::from_str(
            r#"{"id":"cp-14","locationId":"loc-3","name":"North gate","latitude":52.5,"longitude":13.4}"#,
        )
        .unwrap();
        assert_eq!(dto.location_id, "loc-3");
    }
}
