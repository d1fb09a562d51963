use crate::error::AppError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use plant_classifier::preprocess::decode_image;

/// Re-encodes a selected photo for storage: upright, longest side capped at
/// `max_dimension`, JPEG at `quality`
pub fn encode_photo(bytes: &[u8], quality: u8, max_dimension: u32) -> Result<Vec<u8>, AppError> {
    let img = decode_image(bytes)
        .map_err(|e| AppError::ImageProcessing(format!("Failed to load photo: {}", e)))?;

    let (width, height) =
        calculate_resize_dimensions(img.width(), img.height(), max_dimension, max_dimension);
    let img = if (width, height) != (img.width(), img.height()) {
        img.resize_exact(width, height, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|e| AppError::ImageProcessing(format!("Failed to encode photo: {}", e)))?;

    log::debug!(
        "Encoded photo {}x{} at quality {}: {} bytes",
        width,
        height,
        quality,
        buffer.len()
    );
    Ok(buffer)
}

/// Resize an image maintaining aspect ratio
fn calculate_resize_dimensions(
    original_width: u32,
    original_height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    let ratio =
        (original_width as f32 / max_width as f32).max(original_height as f32 / max_height as f32);

    if ratio > 1.0 {
        let new_width = ((original_width as f32 / ratio) as u32).max(1);
        let new_height = ((original_height as f32 / ratio) as u32).max(1);
        (new_width, new_height)
    } else {
        (original_width, original_height)
    }
}
