use std::fmt;

/// Central error types for the Security Patrol client
#[derive(Debug)]
pub enum AppError {
    /// Database error (rusqlite)
    Database(rusqlite::Error),
    /// Filesystem error
    Filesystem(std::io::Error),
    /// Validation error (e.g. invalid inputs)
    Validation(String),
    /// Resource not found
    NotFound(String),
    /// Image processing error
    ImageProcessing(String),
    /// Backend API call failed
    Api(patrol_api::ApiError),
    /// Authentication flow failed
    Auth(patrol_auth::AuthError),
    /// General error
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Filesystem(e) => write!(f, "Filesystem error: {}", e),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ImageProcessing(msg) => write!(f, "Image processing error: {}", msg),
            AppError::Api(e) => write!(f, "API error: {}", e),
            AppError::Auth(e) => write!(f, "Auth error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// Conversions from other error types
impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Filesystem(e)
    }
}

impl From<patrol_api::ApiError> for AppError {
    fn from(e: patrol_api::ApiError) -> Self {
        AppError::Api(e)
    }
}

impl From<patrol_auth::AuthError> for AppError {
    fn from(e: patrol_auth::AuthError) -> Self {
        AppError::Auth(e)
    }
}

impl From<photo_store::PhotoStoreError> for AppError {
    fn from(e: photo_store::PhotoStoreError) -> Self {
        match e {
            photo_store::PhotoStoreError::Database(err) => AppError::Database(err),
            photo_store::PhotoStoreError::Io(err) => AppError::Filesystem(err),
            photo_store::PhotoStoreError::Image(msg) => AppError::ImageProcessing(msg),
            photo_store::PhotoStoreError::Validation(msg) => AppError::Validation(msg),
            photo_store::PhotoStoreError::NotFound(msg) => AppError::NotFound(msg),
        }
    }
}

/// User-friendly error messages for status output
impl AppError {
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "A local storage error occurred. Please try again.".to_string(),
            AppError::Filesystem(_) => {
                "Error accessing files. Please check app permissions.".to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => format!("{} was not found.", msg),
            AppError::ImageProcessing(_) => "Error processing photo.".to_string(),
            AppError::Api(_) => "Could not reach the server. Your data stays queued.".to_string(),
            AppError::Auth(_) => "Sync paused, please sign in.".to_string(),
            AppError::Other(msg) => msg.clone(),
        }
    }
}
