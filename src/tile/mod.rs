//! Tile geometry: splitting, blending and tile image I/O.
//!
//! # Architecture
//!
//! ```text
//!                source image
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │                 Tiler                   │
//! │  fit_within → split_halves → save JPEG  │
//! └──────────┬───────────────────┬──────────┘
//!            ▼                   ▼
//!        left tile           right tile
//!            │   (remote upscale)│
//!            ▼                   ▼
//! ┌─────────────────────────────────────────┐
//! │                Blender                  │
//! │  left │ linear cross-fade band │ right  │
//! └────────────────────┬────────────────────┘
//!                      ▼
//!                final image
//! ```
//!
//! # Components
//!
//! - [`split_image`]: Downsizes and cuts an image into two tiles on disk
//! - [`blend_pair`]: Recombines two tiles with a linear seam blend
//! - [`load_rgb`] / [`save_rgb`]: Content-sniffed loading and format-aware saving
//!
//! # Example
//!
//! ```
//! use image::{Rgb, RgbImage};
//! use tiled_upscale::tile::{blend_pair, split_halves};
//!
//! let img = RgbImage::from_pixel(200, 100, Rgb([40, 80, 120]));
//! let (left, right, mid_x) = split_halves(&img).unwrap();
//! assert_eq!(mid_x, 100);
//!
//! // Without upscaling, a zero-width band restores the original
//! let joined = blend_pair(&left, &right, 0).unwrap();
//! assert_eq!(joined, img);
//! ```

mod blend;
mod codec;
mod split;

pub use blend::{blend_files, blend_pair, blend_weights, DEFAULT_BLEND_WIDTH};
pub use codec::{
    clamp_quality, encode_jpeg, is_valid_quality, load_rgb, read_dimensions, save_rgb,
    DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use split::{
    fit_within, fitted_dimensions, split_halves, split_image, Tile, TileSplit,
    DEFAULT_MAX_TILE_DIMENSION,
};
