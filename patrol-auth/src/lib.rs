//! # Patrol Auth
//!
//! Phone number authentication for the patrol backend.
//!
//! This crate provides:
//! - Verification code request and exchange
//! - Token refresh with explicit session objects
//! - The [`SessionRefresher`] trait used by the sync engine
//!
//! ## Separation of Concerns
//!
//! This crate focuses solely on authentication. It does **not**:
//! - Store sessions (handled by the application)
//! - Attach tokens to upload requests (handled by the API client)
//! - Manage sync settings (handled by the application)

pub mod models;
pub mod service;

pub use models::{AuthSession, TokenResponse, VerificationStart};
pub use service::{AuthError, PhoneAuthService, SessionRefresher};
