use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Response from the verification code request endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStart {
    pub verification_id: String,
    pub expires_in_seconds: i64,
}

/// Token payload returned after a successful code verification or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_seconds: i64,
}

/// An authenticated session for one officer on one device.
///
/// Carried explicitly through every API call that needs a bearer token;
/// there is no process-global token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: String,
    pub phone_number: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn from_token(phone_number: String, token: TokenResponse) -> Self {
        Self {
            user_id: token.user_id,
            phone_number,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in_seconds),
        }
    }

    /// True once the access token is expired or about to expire.
    /// A one minute margin absorbs clock skew between device and server.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now() + Duration::seconds(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in_seconds: i64) -> TokenResponse {
        TokenResponse {
            user_id: "officer-7".to_string(),
            access_token: "token-a".to_string(),
            refresh_token: "token-r".to_string(),
            expires_in_seconds,
        }
    }

    #[test]
    fn test_fresh_session_is_not_expired() {
        let session = AuthSession::from_token("+4915112345678".to_string(), token(3600));
        assert!(!session.is_expired());
        assert_eq!(session.user_id, "officer-7");
    }

    #[test]
    fn test_short_lived_session_counts_as_expired() {
        // Within the skew margin
        let session = AuthSession::from_token("+4915112345678".to_string(), token(10));
        assert!(session.is_expired());
    }

    #[test]
    fn test_token_response_uses_camel_case() {
        let parsed: TokenResponse = serde_json::from_str(
            r#"{"userId":"officer-7","accessToken":"a","refreshToken":"r","expiresInSeconds":900}"#,
        )
        .unwrap();
        assert_eq!(parsed.user_id, "officer-7");
        assert_eq!(parsed.expires_in_seconds, 900);
    }
}
