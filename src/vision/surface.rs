//! Rendering surface
//!
//! Pixel-level operations the pipeline needs: decoding the uploaded image,
//! cropping regions, resampling, the OCR enhancement filters, italic
//! deskewing and PNG encoding. All buffers are RGBA.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use std::io::Cursor;
use tracing::debug;

use crate::config::EnhancementSettings;
use crate::error::{RecognitionError, SurfaceError};
use crate::storage::profiles::Region;

/// Decode an encoded image (PNG, JPEG, ...) into an RGBA pixel buffer
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, RecognitionError> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgba8())
}

/// Decode on the blocking pool so the caller's executor is not stalled
pub async fn decode_async(bytes: Vec<u8>) -> Result<RgbaImage, RecognitionError> {
    tokio::task::spawn_blocking(move || decode(&bytes))
        .await
        .map_err(|e| RecognitionError::Task(e.to_string()))?
}

/// Copy a region out of an image.
///
/// A rectangle that only partially overlaps the image is clamped to it; one
/// that lies entirely outside (or has zero area) is an error.
pub fn crop(image: &RgbaImage, region: &Region) -> Result<RgbaImage, SurfaceError> {
    let (img_w, img_h) = image.dimensions();
    let out_of_bounds = || SurfaceError::OutOfBounds {
        x: region.x,
        y: region.y,
        width: region.width,
        height: region.height,
        image_width: img_w,
        image_height: img_h,
    };

    if region.x >= img_w || region.y >= img_h {
        return Err(out_of_bounds());
    }

    let width = region.width.min(img_w - region.x);
    let height = region.height.min(img_h - region.y);
    if width == 0 || height == 0 {
        return Err(out_of_bounds());
    }

    if width != region.width || height != region.height {
        debug!(
            "Clamped region '{}' from {}x{} to {}x{}",
            region.name, region.width, region.height, width, height
        );
    }

    Ok(image::imageops::crop_imm(image, region.x, region.y, width, height).to_image())
}

/// Resize a pixel buffer to exactly `width` x `height`
pub fn resample(image: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage, SurfaceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SurfaceError::Unavailable("source buffer is empty".to_string()));
    }
    if width == 0 || height == 0 {
        return Err(SurfaceError::Unavailable(format!(
            "cannot resample to {}x{}",
            width, height
        )));
    }

    Ok(image::imageops::resize(
        image,
        width,
        height,
        image::imageops::FilterType::Triangle,
    ))
}

/// Apply the OCR enhancement filters to a whole image
pub fn enhance(image: &RgbaImage, settings: &EnhancementSettings) -> RgbaImage {
    let mut result = image.clone();
    if !settings.enabled {
        return result;
    }

    debug!(
        "Enhancing {}x{} image: contrast={}, grayscale={}, invert={}",
        image.width(),
        image.height(),
        settings.contrast,
        settings.grayscale,
        settings.invert
    );

    let data: &mut [u8] = &mut result;

    if (settings.contrast - 1.0).abs() > 0.01 {
        apply_contrast(data, settings.contrast);
    }

    if settings.grayscale {
        apply_grayscale(data);
    }

    // Invert last so light-on-dark scoreboard text ends up dark-on-light
    if settings.invert {
        apply_invert(data);
    }

    result
}

/// Shear an image horizontally to straighten slanted text.
///
/// Rows are shifted by `tan(angle) * (h/2 - y)`, so a negative angle moves
/// the top of the image left and the bottom right around the vertical
/// centre. Uncovered pixels are filled with the top-left pixel colour.
pub fn deskew(image: &RgbaImage, angle_degrees: f32) -> Result<RgbaImage, SurfaceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SurfaceError::Unavailable("source buffer is empty".to_string()));
    }

    let shear = angle_degrees.to_radians().tan();
    let half_height = image.height() as f32 / 2.0;

    let matrix = [1.0, -shear, shear * half_height, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    let projection = Projection::from_matrix(matrix)
        .ok_or_else(|| SurfaceError::Transform(format!("shear of {} degrees", angle_degrees)))?;

    let background = *image.get_pixel(0, 0);
    Ok(warp(image, &projection, Interpolation::Bilinear, background))
}

/// Encode a pixel buffer as PNG bytes
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, SurfaceError> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Luminance of one pixel using the standard Rec. 601 weights
pub fn luminance(pixel: &Rgba<u8>) -> f64 {
    0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64
}

/// Contrast around the midpoint (128); factor > 1.0 increases contrast
fn apply_contrast(data: &mut [u8], factor: f32) {
    for chunk in data.chunks_exact_mut(4) {
        for value in chunk.iter_mut().take(3) {
            let adjusted = ((*value as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0);
            *value = adjusted as u8;
        }
    }
}

/// Grayscale while keeping the RGBA layout
fn apply_grayscale(data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(4) {
        let gray = (0.299 * chunk[0] as f32 + 0.587 * chunk[1] as f32 + 0.114 * chunk[2] as f32) as u8;
        chunk[0] = gray;
        chunk[1] = gray;
        chunk[2] = gray;
    }
}

fn apply_invert(data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
}
