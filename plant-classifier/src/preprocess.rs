use image::metadata::Orientation;
use image::{imageops, DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::io::Cursor;

/// Error type for converting an encoded image into model input
#[derive(Debug)]
pub enum PreprocessError {
    EmptyBuffer,
    Decode(String),
    InvalidDimensions(u32, u32),
}

impl std::fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessError::EmptyBuffer => write!(f, "Image buffer is empty"),
            PreprocessError::Decode(msg) => write!(f, "Decode error: {}", msg),
            PreprocessError::InvalidDimensions(w, h) => {
                write!(f, "Invalid image dimensions: {}x{}", w, h)
            }
        }
    }
}

impl std::error::Error for PreprocessError {}

impl From<image::ImageError> for PreprocessError {
    fn from(err: image::ImageError) -> Self {
        PreprocessError::Decode(err.to_string())
    }
}

/// Normalized model input: a single RGB image in NCHW layout
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    /// `3 * height * width` values, channel-major
    pub data: Vec<f32>,
}

impl ModelInput {
    /// Tensor shape `[batch, channels, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }
}

/// Decodes an image and applies the EXIF orientation stored with it
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::EmptyBuffer);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(format!("Failed to read image: {}", e)))?;

    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);

    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessError::InvalidDimensions(
            image.width(),
            image.height(),
        ));
    }

    Ok(image)
}

/// Scales `image` to fit inside `width` x `height` keeping the aspect ratio,
/// centered on a black canvas
pub fn letterbox(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    if image.width() == width && image.height() == height {
        return image.to_rgb8();
    }

    let (w, h) = (image.width() as f32, image.height() as f32);
    let scale = (width as f32 / w).min(height as f32 / h);
    let new_w = ((w * scale).round() as u32).clamp(1, width);
    let new_h = ((h * scale).round() as u32).clamp(1, height);

    let scaled = image
        .resize_exact(new_w, new_h, imageops::FilterType::Triangle)
        .to_rgb8();

    let mut canvas = RgbImage::new(width, height);
    let x_offset = (width - new_w) / 2;
    let y_offset = (height - new_h) / 2;
    imageops::replace(&mut canvas, &scaled, x_offset as i64, y_offset as i64);

    canvas
}

/// Converts an RGB image into a normalized NCHW tensor
pub fn to_model_input(rgb: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> ModelInput {
    let (width, height) = rgb.dimensions();
    let plane = width as usize * height as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * width as usize + x as usize;
        for c in 0..3 {
            data[c * plane + offset] = (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }

    ModelInput {
        width,
        height,
        data,
    }
}

/// Full preprocessing: decode, orient, letterbox, normalize
pub fn prepare_input(
    bytes: &[u8],
    width: u32,
    height: u32,
    mean: [f32; 3],
    std: [f32; 3],
) -> Result<ModelInput, PreprocessError> {
    let image = decode_image(bytes)?;
    log::debug!(
        "Decoded image {}x{}, resizing to {}x{}",
        image.width(),
        image.height(),
        width,
        height
    );
    let rgb = letterbox(&image, width, height);
    Ok(to_model_input(&rgb, mean, std))
}
