//! # Patrol API
//!
//! HTTP client for the patrol backend upload and reference-data endpoints.
//!
//! This crate provides:
//! - The [`PatrolApi`] trait, one method per upload kind
//! - [`HttpPatrolApi`], the reqwest implementation
//! - Wire payload types with idempotent client references
//!
//! ## Separation of Concerns
//!
//! This crate focuses solely on talking to the backend. It does **not**:
//! - Persist records or sync state (handled by the application)
//! - Obtain or refresh tokens (handled by patrol-auth)
//! - Decide upload order or retries (handled by the sync engine)

pub mod client;
pub mod models;

pub use client::{ApiError, HttpPatrolApi, PatrolApi};
pub use models::{
    CheckpointDto, CheckpointVerifyUpload, CreatedResponse, LocationBatchUpload,
    LocationPointUpload, PatrolLocationDto, PhotoUpload, ReportUpload, TimeRecordUpload,
};
