//! Image loading and saving for tiles.
//!
//! Tiles travel through the filesystem: the Tiler writes crops for upload,
//! the Job Client writes whatever the service returns, and the Blender reads
//! both back. This module keeps that I/O in one place.
//!
//! # Design Decisions
//!
//! - **Content-sniffed decoding**: The service does not promise that a file
//!   named `.jpg` actually holds JPEG data, so the format is guessed from the
//!   leading bytes rather than the extension.
//!
//! - **RGB only**: Every image is normalised to 8-bit RGB on load. Alpha and
//!   higher bit depths are dropped.
//!
//! - **Quality control**: JPEG output quality is configurable; other formats
//!   are chosen from the output extension.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader, RgbImage};

use crate::error::TileError;

/// Default JPEG quality (1-100) for tiles and final output.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Loading
// =============================================================================

/// Read image dimensions from the file header without decoding pixel data.
pub fn read_dimensions(path: &Path) -> Result<(u32, u32), TileError> {
    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(TileError::Io)?;

    reader.into_dimensions().map_err(|e| TileError::Decode {
        message: format!("{}: {}", path.display(), e),
    })
}

/// Load an image file as 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage, TileError> {
    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(TileError::Io)?;

    let img = reader.decode().map_err(|e| TileError::Decode {
        message: format!("{}: {}", path.display(), e),
    })?;

    Ok(img.to_rgb8())
}

// =============================================================================
// Saving
// =============================================================================

/// Encode an RGB image as JPEG into memory.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, TileError> {
    let quality = clamp_quality(quality);

    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
    encoder
        .encode_image(img)
        .map_err(|e| TileError::Encode {
            message: e.to_string(),
        })?;

    Ok(output)
}

/// Save an RGB image, picking the format from the path's extension.
///
/// JPEG output honours `quality`; an unknown or missing extension falls
/// back to JPEG.
pub fn save_rgb(img: &RgbImage, path: &Path, quality: u8) -> Result<(), TileError> {
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Jpeg);

    if format == ImageFormat::Jpeg {
        let bytes = encode_jpeg(img, quality)?;
        std::fs::write(path, bytes)?;
        return Ok(());
    }

    let mut writer = BufWriter::new(File::create(path)?);
    img.write_to(&mut writer, format)
        .map_err(|e| TileError::Encode {
            message: format!("{}: {}", path.display(), e),
        })?;

    Ok(())
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
