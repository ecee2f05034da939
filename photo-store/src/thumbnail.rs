use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Error type for image processing operations
#[derive(Debug)]
pub enum ThumbnailError {
    ImageLoadError(String),
    ImageSaveError(String),
    IoError(std::io::Error),
}

impl std::fmt::Display for ThumbnailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThumbnailError::ImageLoadError(msg) => write!(f, "Image load error: {}", msg),
            ThumbnailError::ImageSaveError(msg) => write!(f, "Image save error: {}", msg),
            ThumbnailError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ThumbnailError {}

impl From<std::io::Error> for ThumbnailError {
    fn from(err: std::io::Error) -> Self {
        ThumbnailError::IoError(err)
    }
}

/// Decodes an incoming capture and normalizes it to JPEG.
/// Returns the decoded image plus the bytes that will be stored on disk.
pub fn decode_and_reencode(bytes: &[u8]) -> Result<(DynamicImage, Vec<u8>), ThumbnailError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ThumbnailError::ImageLoadError(format!("Failed to decode image: {}", e)))?;

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| ThumbnailError::ImageSaveError(format!("Failed to encode JPEG: {}", e)))?;

    Ok((rgb, buffer.into_inner()))
}

/// Creates a WebP thumbnail next to the original
/// Returns the thumbnail filename
pub fn create_thumbnail(
    img: &DynamicImage,
    storage_dir: &Path,
    uuid: &str,
    edge: u32,
) -> Result<String, ThumbnailError> {
    let thumbnail_name = format!("{}_thumb.webp", uuid);
    let thumbnail_path = storage_dir.join(&thumbnail_name);
    let thumbnail = img.resize(edge, edge, FilterType::Lanczos3);

    let mut buffer = Cursor::new(Vec::new());
    thumbnail
        .write_to(&mut buffer, ImageFormat::WebP)
        .map_err(|e| ThumbnailError::ImageSaveError(format!("Failed to write thumbnail: {}", e)))?;

    std::fs::write(&thumbnail_path, buffer.into_inner())?;

    log::debug!("Thumbnail created: {:?}", thumbnail_path);

    Ok(thumbnail_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(64, 48, image::Rgb([120, 30, 200]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_and_reencode_produces_jpeg() {
        let (img, encoded) = decode_and_reencode(&sample_jpeg()).unwrap();
        assert_eq!(img.width(), 64);
        assert!(!encoded.is_empty());
        // JPEG magic bytes
        assert_eq!(&encoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let result = decode_and_reencode(b"definitely not an image");
        assert!(matches!(result, Err(ThumbnailError::ImageLoadError(_))));
    }
}
