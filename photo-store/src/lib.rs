//! # Photo Store
//!
//! Local storage for patrol photo captures: image blobs on disk,
//! bookkeeping rows in SQLite.
//!
//! This crate provides:
//! - Validated capture with JPEG normalization and SHA-256 checksums
//! - WebP thumbnail generation on a blocking thread
//! - Pending and expiry queries for the sync and cleanup services
//!
//! ## Separation of Concerns
//!
//! This crate focuses solely on local photo storage. It does **not**:
//! - Upload photos (handled by the sync engine)
//! - Decide retention policy (handled by the cleanup service)
//! - Manage the application schema (only the `photos` table is owned here)

pub mod models;
pub mod schema;
pub mod service;
pub mod thumbnail;

pub use models::{NewPhotoCapture, PhotoRecord, PhotoStoreConfig};
pub use service::{PhotoStore, PhotoStoreError};
pub use thumbnail::ThumbnailError;
