use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{
    CheckpointDto, CheckpointVerifyUpload, CreatedResponse, LocationBatchUpload,
    PatrolLocationDto, PhotoUpload, ReportUpload, TimeRecordUpload,
};

/// Error type for backend API operations
#[derive(Debug)]
pub enum ApiError {
    /// 401 or 403, a token refresh may fix this
    Auth(u16),
    NetworkError(String),
    ServerError { status: u16, message: String },
    InvalidResponse(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Auth(status) => write!(f, "Authentication failed (status {})", status),
            ApiError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            ApiError::ServerError { status, message } => {
                write!(f, "Server error {}: {}", status, message)
            }
            ApiError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Everything the sync engine needs from the patrol backend.
///
/// One method per captured entity kind plus the reference-data fetches.
/// Upload methods return the server-assigned id of the created resource.
/// The access token is passed per call; this crate never stores it.
#[async_trait]
pub trait PatrolApi: Send + Sync {
    async fn upload_time_record(
        &self,
        token: &str,
        upload: &TimeRecordUpload,
    ) -> Result<String, ApiError>;

    async fn upload_location_batch(
        &self,
        token: &str,
        upload: &LocationBatchUpload,
    ) -> Result<String, ApiError>;

    async fn upload_photo(&self, token: &str, upload: &PhotoUpload) -> Result<String, ApiError>;

    async fn upload_checkpoint_verification(
        &self,
        token: &str,
        upload: &CheckpointVerifyUpload,
    ) -> Result<String, ApiError>;

    async fn upload_report(&self, token: &str, upload: &ReportUpload) -> Result<String, ApiError>;

    async fn fetch_patrol_locations(&self, token: &str) -> Result<Vec<PatrolLocationDto>, ApiError>;

    async fn fetch_checkpoints(&self, token: &str) -> Result<Vec<CheckpointDto>, ApiError>;
}

/// HTTP implementation of [`PatrolApi`] against the patrol backend
pub struct HttpPatrolApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPatrolApi {
    pub fn new(base_url: String) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .connect_timeout(std::time::Duration::from_secs(10))
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .user_agent(concat!("security-patrol/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::NetworkError(format!("Client build failed: {}", e)))?;

        Ok(Self { base_url, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// POST a JSON body and return the id of the created resource
    async fn post_created<T>(&self, token: &str, path: &str, body: &T) -> Result<String, ApiError>
    where
        T: Serialize + Sync,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        match status {
            200 | 201 => {
                let created = response.json::<CreatedResponse>().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                if created.id.trim().is_empty() {
                    return Err(ApiError::InvalidResponse(
                        "Server returned an empty id".to_string(),
                    ));
                }
                Ok(created.id)
            }
            401 | 403 => Err(ApiError::Auth(status)),
            _ => Err(ApiError::ServerError {
                status,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn get_json<T>(&self, token: &str, path: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .get(self.endpoint(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        match status {
            200 => response
                .json::<T>()
                .await
                .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e))),
            401 | 403 => Err(ApiError::Auth(status)),
            _ => Err(ApiError::ServerError {
                status,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl PatrolApi for HttpPatrolApi {
    async fn upload_time_record(
        &self,
        token: &str,
        upload: &TimeRecordUpload,
    ) -> Result<String, ApiError> {
        self.post_created(token, "time", upload).await
    }

    async fn upload_location_batch(
        &self,
        token: &str,
        upload: &LocationBatchUpload,
    ) -> Result<String, ApiError> {
        self.post_created(token, "location/batch", upload).await
    }

    async fn upload_photo(&self, token: &str, upload: &PhotoUpload) -> Result<String, ApiError> {
        self.post_created(token, "photos", upload).await
    }

    async fn upload_checkpoint_verification(
        &self,
        token: &str,
        upload: &CheckpointVerifyUpload,
    ) -> Result<String, ApiError> {
        self.post_created(token, "checkpoints/verify", upload).await
    }

    async fn upload_report(&self, token: &str, upload: &ReportUpload) -> Result<String, ApiError> {
        self.post_created(token, "reports", upload).await
    }

    async fn fetch_patrol_locations(&self, token: &str) -> Result<Vec<PatrolLocationDto>, ApiError> {
        self.get_json(token, "locations").await
    }

    async fn fetch_checkpoints(&self, token: &str) -> Result<Vec<CheckpointDto>, ApiError> {
        self.get_json(token, "checkpoints").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let api = HttpPatrolApi::new("https://patrol.example.com/api/v1/".to_string()).unwrap();
        assert_eq!(
            api.endpoint("location/batch"),
            "https://patrol.example.com/api/v1/location/batch"
        );
    }

    #[test]
    fn test_auth_error_keeps_status() {
        let err = ApiError::Auth(403);
        assert!(err.to_string().contains("403"));
    }
}
