//! Seam blending for recombining two upscaled tiles.
//!
//! The right tile is laid over the last `blend_width` columns of the left
//! tile, and inside that band each column is a linear cross-fade:
//!
//! ```text
//!   left tile                      right tile
//!   ┌───────────────┬─────┐
//!   │               │ band│───────────────────┐
//!   │   verbatim    │ w:  │     verbatim      │
//!   │               │ 0→1 │  (cols band_w..)  │
//!   └───────────────┴─────┴───────────────────┘
//!   0        lw - band_w  lw            lw + rw - band_w
//! ```
//!
//! For band column `i` the weight is `w = i / (band_w - 1)`, so the first
//! band column equals the left source and the last equals the right source.

use std::path::Path;

use image::{Rgb, RgbImage};
use tracing::debug;

use crate::error::BlendError;

use super::codec::load_rgb;

/// Default blend band width in pixels.
pub const DEFAULT_BLEND_WIDTH: u32 = 50;

/// Weights for each band column, evenly spaced from 0.0 to 1.0 inclusive.
///
/// A single-column band gets weight 0 (pure left source).
pub fn blend_weights(blend_width: u32) -> Vec<f32> {
    match blend_width {
        0 => Vec::new(),
        1 => vec![0.0],
        n => {
            let last = (n - 1) as f32;
            (0..n).map(|i| i as f32 / last).collect()
        }
    }
}

/// Combine two tiles into one image, cross-fading `blend_width` columns.
///
/// The output is `max(left.h, right.h)` tall and
/// `left.w + right.w - blend_width` wide. Pixels covered by neither tile
/// (when heights differ) stay black. Inside the band, rows present in only
/// one tile take that tile's pixel unchanged.
///
/// # Errors
///
/// Returns [`BlendError::BandTooWide`] if `blend_width` exceeds either tile's
/// width.
pub fn blend_pair(
    left: &RgbImage,
    right: &RgbImage,
    blend_width: u32,
) -> Result<RgbImage, BlendError> {
    let (left_width, left_height) = left.dimensions();
    let (right_width, right_height) = right.dimensions();

    if blend_width > left_width.min(right_width) {
        return Err(BlendError::BandTooWide {
            blend_width,
            left_width,
            right_width,
        });
    }

    let width = left_width + right_width - blend_width;
    let height = left_height.max(right_height);
    let band_start = left_width - blend_width;

    let mut output = RgbImage::new(width, height);

    // Left tile, verbatim
    for (x, y, pixel) in left.enumerate_pixels() {
        output.put_pixel(x, y, *pixel);
    }

    // Cross-faded band
    let weights = blend_weights(blend_width);
    for (i, &w) in weights.iter().enumerate() {
        let i = i as u32;
        let out_x = band_start + i;

        for y in 0..height {
            let from_left = (y < left_height).then(|| left.get_pixel(band_start + i, y));
            let from_right = (y < right_height).then(|| right.get_pixel(i, y));

            let pixel = match (from_left, from_right) {
                (Some(l), Some(r)) => mix(l, r, w),
                (Some(l), None) => *l,
                (None, Some(r)) => *r,
                (None, None) => continue,
            };
            output.put_pixel(out_x, y, pixel);
        }
    }

    // Remainder of the right tile
    for y in 0..right_height {
        for x in blend_width..right_width {
            output.put_pixel(left_width + (x - blend_width), y, *right.get_pixel(x, y));
        }
    }

    debug!(
        left_width,
        right_width,
        blend_width,
        width,
        height,
        "Blended tiles"
    );

    Ok(output)
}

/// Load two tile files and blend them.
pub fn blend_files(left: &Path, right: &Path, blend_width: u32) -> Result<RgbImage, BlendError> {
    let left = load_rgb(left)?;
    let right = load_rgb(right)?;
    blend_pair(&left, &right, blend_width)
}

#[inline]
fn mix(left: &Rgb<u8>, right: &Rgb<u8>, w: f32) -> Rgb<u8> {
    let channel = |l: u8, r: u8| {
        let v = l as f32 * (1.0 - w) + r as f32 * w;
        v.round().clamp(0.0, 255.0) as u8
    };

    Rgb([
        channel(left[0], right[0]),
        channel(left[1], right[1]),
        channel(left[2], right[2]),
    ])
}

// =============================================================================
// Tests
// =============================================================================
