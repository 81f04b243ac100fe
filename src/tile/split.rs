//! Splitting an oversized image into two horizontal halves.
//!
//! The source is first shrunk (aspect ratio preserved, Lanczos filter) so
//! that neither side exceeds the service's input limit, then cut along the
//! vertical line at `mid_x = width / 2`:
//!
//! ```text
//!   0            mid_x          width
//!   ┌──────────────┬──────────────┐
//!   │     left     │    right     │
//!   │  [0, mid_x)  │ [mid_x, w)   │
//!   └──────────────┴──────────────┘
//! ```
//!
//! For odd widths the right tile is one pixel wider than the left.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TileError;

use super::codec::{load_rgb, save_rgb};

/// Default maximum width or height accepted by the upscaling service.
pub const DEFAULT_MAX_TILE_DIMENSION: u32 = 2000;

// =============================================================================
// Tile
// =============================================================================

/// One half of a split image, written to disk for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Location of the encoded tile
    pub path: PathBuf,

    /// Horizontal offset of the tile within the (resized) source
    pub offset_x: u32,

    /// Tile width in pixels
    pub width: u32,

    /// Tile height in pixels
    pub height: u32,
}

/// Result of splitting an image in two.
#[derive(Debug, Clone)]
pub struct TileSplit {
    pub left: Tile,
    pub right: Tile,

    /// Column at which the source was cut
    pub mid_x: u32,

    /// Source dimensions after any downsizing
    pub source_dimensions: (u32, u32),
}

impl TileSplit {
    /// Paths of both tiles, left first.
    pub fn paths(&self) -> [&Path; 2] {
        [&self.left.path, &self.right.path]
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// Compute the size of `(width, height)` scaled to fit inside a
/// `max_dimension` square, preserving aspect ratio.
///
/// Returns the input unchanged when it already fits. Neither side is ever
/// rounded down to zero.
pub fn fitted_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }

    let scale = f64::min(
        max_dimension as f64 / width as f64,
        max_dimension as f64 / height as f64,
    );

    let new_width = ((width as f64 * scale).round() as u32).clamp(1, max_dimension);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, max_dimension);
    (new_width, new_height)
}

/// Downsize an image so neither side exceeds `max_dimension`.
///
/// Images that already fit are returned untouched.
pub fn fit_within(img: RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = fitted_dimensions(width, height, max_dimension);

    if (new_width, new_height) == (width, height) {
        return img;
    }

    info!(
        from_width = width,
        from_height = height,
        to_width = new_width,
        to_height = new_height,
        "Resized image to fit tile limit"
    );
    imageops::resize(&img, new_width, new_height, FilterType::Lanczos3)
}

/// Cut an image into left and right halves at `width / 2`.
///
/// Returns `(left, right, mid_x)`.
pub fn split_halves(img: &RgbImage) -> Result<(RgbImage, RgbImage, u32), TileError> {
    let (width, height) = img.dimensions();
    if width < 2 || height == 0 {
        return Err(TileError::TooSmall { width, height });
    }

    let mid_x = width / 2;
    let left = imageops::crop_imm(img, 0, 0, mid_x, height).to_image();
    let right = imageops::crop_imm(img, mid_x, 0, width - mid_x, height).to_image();

    Ok((left, right, mid_x))
}

// =============================================================================
// Tiler
// =============================================================================

/// Load `source`, downsize it to `max_dimension`, split it in two and write
/// both halves as JPEG files into `work_dir`.
///
/// File names carry a UUIDv7 so repeated runs in the same directory never
/// collide. The caller owns deletion of the returned tiles.
pub fn split_image(
    source: &Path,
    max_dimension: u32,
    work_dir: &Path,
    jpeg_quality: u8,
) -> Result<TileSplit, TileError> {
    let img = fit_within(load_rgb(source)?, max_dimension);
    let source_dimensions = img.dimensions();

    let (left, right, mid_x) = split_halves(&img)?;
    drop(img);

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let run_id = Uuid::now_v7();

    let left_path = work_dir.join(format!("{stem}_left_{run_id}.jpg"));
    let right_path = work_dir.join(format!("{stem}_right_{run_id}.jpg"));

    let left = write_tile(&left, 0, left_path, jpeg_quality)?;
    let right = match write_tile(&right, mid_x, right_path, jpeg_quality) {
        Ok(tile) => tile,
        Err(e) => {
            // The caller never sees the left tile, so it cannot clean it up
            discard_tile(&left.path);
            return Err(e);
        }
    };

    info!(
        mid_x,
        left_width = left.width,
        right_width = right.width,
        height = left.height,
        "Image split completed"
    );

    Ok(TileSplit {
        left,
        right,
        mid_x,
        source_dimensions,
    })
}

/// Delete a tile that will never reach the caller. Returns whether it was
/// removed; failures are logged.
fn discard_tile(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error removing orphaned tile");
            false
        }
    }
}

fn write_tile(img: &RgbImage, offset_x: u32, path: PathBuf, quality: u8) -> Result<Tile, TileError> {
    save_rgb(img, &path, quality)?;
    debug!(path = %path.display(), offset_x, "Wrote tile");

    Ok(Tile {
        path,
        offset_x,
        width: img.width(),
        height: img.height(),
    })
}

// =============================================================================
// Tests
// =============================================================================
