pub mod auth_service;
pub mod background_sync;
pub mod checkpoint_service;
pub mod cleanup_service;
pub mod download_service;
pub mod export_service;
pub mod location_service;
pub mod photo_service;
pub mod report_service;
pub mod sync_service;
pub mod time_service;
pub mod upload_service;
