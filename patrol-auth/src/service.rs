use async_trait::async_trait;
use serde::Serialize;

use crate::models::{AuthSession, TokenResponse, VerificationStart};

/// Error type for authentication operations
#[derive(Debug)]
pub enum AuthError {
    NetworkError(String),
    InvalidResponse(String),
    /// Phone number or verification code was refused by the server
    Rejected(String),
    /// Refresh token is no longer accepted, a new sign-in is required
    SessionExpired,
    ServerError(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AuthError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            AuthError::Rejected(msg) => write!(f, "Rejected: {}", msg),
            AuthError::SessionExpired => write!(f, "Session expired, sign in again"),
            AuthError::ServerError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Exchanges a near-expiry or rejected session for a fresh one.
///
/// The sync engine only depends on this trait, so tests can swap in a
/// scripted refresher without any network.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, AuthError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestCodeBody<'a> {
    phone_number: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyCodeBody<'a> {
    verification_id: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Phone number authentication against the patrol backend
pub struct PhoneAuthService {
    server_url: String,
    client: reqwest::Client,
}

impl PhoneAuthService {
    pub fn new(server_url: String) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .user_agent(concat!("security-patrol/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::NetworkError(format!("Client build failed: {}", e)))?;

        Ok(Self { server_url, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), path)
    }

    /// Ask the backend to send a verification code to the given number
    pub async fn request_code(&self, phone_number: &str) -> Result<VerificationStart, AuthError> {
        let response = self
            .client
            .post(self.endpoint("auth/request-code"))
            .json(&RequestCodeBody { phone_number })
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(format!("Request failed: {}", e)))?;

        match response.status().as_u16() {
            200 => response
                .json::<VerificationStart>()
                .await
                .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse response: {}", e))),
            400 | 422 => Err(AuthError::Rejected(rejection_message(response).await)),
            status => Err(AuthError::ServerError(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }

    /// Exchange verification id and code for a signed-in session
    pub async fn verify_code(
        &self,
        phone_number: &str,
        verification_id: &str,
        code: &str,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(self.endpoint("auth/verify-code"))
            .json(&VerifyCodeBody {
                verification_id,
                code,
            })
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(format!("Request failed: {}", e)))?;

        match response.status().as_u16() {
            200 => {
                let token = response.json::<TokenResponse>().await.map_err(|e| {
                    AuthError::InvalidResponse(format!("Failed to parse token: {}", e))
                })?;
                Ok(AuthSession::from_token(phone_number.to_string(), token))
            }
            400 | 401 | 403 | 422 => Err(AuthError::Rejected(rejection_message(response).await)),
            status => Err(AuthError::ServerError(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }

    async fn refresh_session(&self, session: &AuthSession) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(self.endpoint("auth/refresh"))
            .json(&RefreshBody {
                refresh_token: &session.refresh_token,
            })
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(format!("Refresh failed: {}", e)))?;

        match response.status().as_u16() {
            200 => {
                let token = response.json::<TokenResponse>().await.map_err(|e| {
                    AuthError::InvalidResponse(format!("Failed to parse token: {}", e))
                })?;
                Ok(AuthSession::from_token(session.phone_number.clone(), token))
            }
            401 | 403 => Err(AuthError::SessionExpired),
            status => Err(AuthError::ServerError(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl SessionRefresher for PhoneAuthService {
    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, AuthError> {
        self.refresh_session(session).await
    }
}

/// Pull a human readable message out of a rejection body, fall back to status
async fn rejection_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("Status {}", status)),
        Err(_) => format!("Status {}", status),
    }
}
