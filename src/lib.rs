//! # Tiled Upscale
//!
//! Upscale images that are larger than a remote AI upscaler accepts.
//!
//! The service caps its input resolution, so oversized images are split into
//! two horizontal halves, each half is upscaled as its own remote job, and the
//! results are stitched back together with a linear cross-fade over the seam.
//!
//! ## Features
//!
//! - **Two-way tiling**: Downsizes to the service limit and cuts at the midpoint
//! - **Seam blending**: Linear cross-fade across a configurable band
//! - **Remote job client**: Upload, submit and poll with a bounded, cancellable budget
//! - **Clean runs**: Every intermediate file is removed, on success and on failure
//!
//! ## Architecture
//!
//! - [`tile`] - Tiler, Blender and tile image I/O
//! - [`client`] - HTTP client and job runner for the upscaling service
//! - [`pipeline`] - Orchestrator tying tiling, jobs and blending together
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tiled_upscale::{
//!     JobClient, PipelineConfig, PollConfig, ServiceConfig, UpscaleApi, UpscaleParams, Upscaler,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = UpscaleApi::new(ServiceConfig::new(
//!         "https://cloud.leonardo.ai/api/rest/v1",
//!         "my-api-key",
//!     ));
//!     let config = PipelineConfig::default();
//!     let client = JobClient::new(
//!         api,
//!         UpscaleParams::default(),
//!         PollConfig::default(),
//!         config.work_dir.clone(),
//!     );
//!
//!     let upscaler = Upscaler::new(client, config);
//!     match upscaler.upscale(Path::new("photo.jpg"), Path::new("upscaled.jpg")).await {
//!         Ok(path) => println!("Saved {}", path.display()),
//!         Err(e) => eprintln!("Upscale failed: {}", e),
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod tile;

// Re-export commonly used types
pub use client::{
    JobClient, JobState, PollConfig, ServiceConfig, UploadSlot, UpscaleApi, UpscaleParams,
    UpscaleService, VariationStatus,
};
pub use config::{BlendConfig, Cli, Command, SplitConfig, UpscaleConfig};
pub use error::{BlendError, JobError, TileError, UpscaleError};
pub use pipeline::{CleanupReport, PipelineConfig, Scratch, Upscaler};
pub use tile::{blend_files, blend_pair, split_halves, split_image, Tile, TileSplit};
