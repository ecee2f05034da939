use crate::config::AppConfig;
use crate::error::AppError;
use crate::filesystem;
use photo_store::{NewPhotoCapture, PhotoRecord, PhotoStore, PhotoStoreConfig};
use rusqlite::Connection;

/// Builds the photo store for the application data directory
pub fn build_store(config: &AppConfig) -> PhotoStore {
    PhotoStore::new(PhotoStoreConfig {
        storage_dir: filesystem::photo_storage_dir(),
        max_photo_bytes: config.photo.max_photo_bytes,
        thumbnail_edge: config.photo.thumbnail_edge,
    })
}

/// Captures a photo: validation, durable local write, thumbnail.
/// The record starts unsynced and is picked up by the next sync cycle.
pub async fn capture_photo(
    conn: &Connection,
    store: &PhotoStore,
    capture: NewPhotoCapture,
) -> Result<PhotoRecord, AppError> {
    Ok(store.save_capture(conn, capture).await?)
}
