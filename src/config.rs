//! Configuration management for the tiled upscaler.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `UPSCALE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Subcommands
//!
//! - `upscale` - Run the full split / upscale / blend pipeline
//! - `split` - Split an image into two tiles locally (no service calls)
//! - `blend` - Blend two tiles locally (no service calls)
//!
//! # Environment Variables
//!
//! - `UPSCALE_API_KEY` - Bearer token for the upscaling service (required)
//! - `UPSCALE_BASE_URL` - Service base URL
//! - `UPSCALE_OUTPUT` - Final image path (default: final_upscaled_image.jpg)
//! - `UPSCALE_WORK_DIR` - Directory for intermediate files (default: system temp)
//! - `UPSCALE_MAX_TILE_DIMENSION` - Largest tile side (default: 2000)
//! - `UPSCALE_BLEND_WIDTH` - Seam blend width in pixels (default: 50)
//! - `UPSCALE_PIXEL_THRESHOLD` - Pixel count above which images are tiled (default: 20000000)
//! - `UPSCALE_POLL_ATTEMPTS` - Status polls per job (default: 20)
//! - `UPSCALE_POLL_INTERVAL_SECS` - Delay between polls (default: 15)
//! - `UPSCALE_REQUEST_TIMEOUT_SECS` - Control call timeout (default: 30)
//! - `UPSCALE_UPLOAD_TIMEOUT_SECS` - Upload timeout (default: 60)
//! - `UPSCALE_STYLE` - Upscaler style (default: General)
//! - `UPSCALE_CREATIVITY` - Creativity strength 1-10 (default: 6)
//! - `UPSCALE_MULTIPLIER` - Scale multiplier (default: 1.5)
//! - `UPSCALE_JPEG_QUALITY` - JPEG quality for tiles and output (default: 90)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::client::{
    PollConfig, ServiceConfig, UpscaleParams, DEFAULT_BASE_URL, DEFAULT_CREATIVITY,
    DEFAULT_MULTIPLIER, DEFAULT_POLL_ATTEMPTS, DEFAULT_STYLE,
};
use crate::pipeline::{PipelineConfig, DEFAULT_PIXEL_THRESHOLD};
use crate::tile::{
    is_valid_quality, DEFAULT_BLEND_WIDTH, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_TILE_DIMENSION,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default path of the final image.
pub const DEFAULT_OUTPUT: &str = "final_upscaled_image.jpg";

/// Default delay between status polls, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Default control call timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default upload timeout, in seconds.
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tiled Upscale - upscale images beyond a remote upscaler's size limit.
///
/// Oversized images are split into two halves, each half is upscaled by the
/// remote service, and the results are blended back together.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiled-upscale")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Upscale an image through the remote service, tiling if necessary.
    Upscale(UpscaleConfig),

    /// Split an image into two tiles without contacting the service.
    Split(SplitConfig),

    /// Blend two tiles into one image without contacting the service.
    Blend(BlendConfig),
}

// =============================================================================
// Upscale Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct UpscaleConfig {
    /// Image to upscale.
    pub input: PathBuf,

    /// Where to write the final image.
    #[arg(short, long, default_value = DEFAULT_OUTPUT, env = "UPSCALE_OUTPUT")]
    pub output: PathBuf,

    // =========================================================================
    // Service Configuration
    // =========================================================================
    /// API key for the upscaling service.
    #[arg(long, env = "UPSCALE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Base URL of the upscaling service.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "UPSCALE_BASE_URL")]
    pub base_url: String,

    /// Timeout for control calls in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, env = "UPSCALE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Timeout for tile uploads in seconds.
    #[arg(long, default_value_t = DEFAULT_UPLOAD_TIMEOUT_SECS, env = "UPSCALE_UPLOAD_TIMEOUT_SECS")]
    pub upload_timeout_secs: u64,

    // =========================================================================
    // Upscale Parameters
    // =========================================================================
    /// Upscaler style.
    #[arg(long, default_value = DEFAULT_STYLE, env = "UPSCALE_STYLE")]
    pub style: String,

    /// Creativity strength (1-10).
    #[arg(long, default_value_t = DEFAULT_CREATIVITY, env = "UPSCALE_CREATIVITY")]
    pub creativity: u8,

    /// Scale multiplier applied by the service (greater than 1, at most 2).
    #[arg(long, default_value_t = DEFAULT_MULTIPLIER, env = "UPSCALE_MULTIPLIER")]
    pub multiplier: f32,

    // =========================================================================
    // Polling Configuration
    // =========================================================================
    /// Number of status polls before a job is given up.
    #[arg(long, default_value_t = DEFAULT_POLL_ATTEMPTS, env = "UPSCALE_POLL_ATTEMPTS")]
    pub poll_attempts: u32,

    /// Seconds between status polls.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS, env = "UPSCALE_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: u64,

    // =========================================================================
    // Tiling Configuration
    // =========================================================================
    /// Pixel count above which the image is split into tiles.
    #[arg(long, default_value_t = DEFAULT_PIXEL_THRESHOLD, env = "UPSCALE_PIXEL_THRESHOLD")]
    pub pixel_threshold: u64,

    /// Largest width or height sent to the service; bigger sources are downsized.
    #[arg(long, default_value_t = DEFAULT_MAX_TILE_DIMENSION, env = "UPSCALE_MAX_TILE_DIMENSION")]
    pub max_tile_dimension: u32,

    /// Width of the blended seam in pixels.
    #[arg(long, default_value_t = DEFAULT_BLEND_WIDTH, env = "UPSCALE_BLEND_WIDTH")]
    pub blend_width: u32,

    /// JPEG quality for tiles and JPEG output (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "UPSCALE_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Upscale both tiles at the same time.
    #[arg(long, default_value_t = false, env = "UPSCALE_CONCURRENT_TILES")]
    pub concurrent_tiles: bool,

    // =========================================================================
    // Intermediate Files
    // =========================================================================
    /// Directory for tiles and downloaded results.
    ///
    /// Defaults to the system temporary directory.
    #[arg(long, env = "UPSCALE_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Keep tiles and downloaded results after the run.
    #[arg(long, default_value_t = false, env = "UPSCALE_KEEP_INTERMEDIATES")]
    pub keep_intermediates: bool,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl UpscaleConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.trim().is_empty() {
            return Err("API key is required. Set --api-key or UPSCALE_API_KEY".to_string());
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(format!(
                    "base_url must use http or https, got '{}'",
                    url.scheme()
                ))
            }
            Err(e) => return Err(format!("base_url is not a valid URL: {}", e)),
        }

        if self.max_tile_dimension == 0 {
            return Err("max_tile_dimension must be greater than 0".to_string());
        }

        if self.blend_width >= self.max_tile_dimension / 2 {
            return Err("blend_width must be smaller than half of max_tile_dimension".to_string());
        }

        if self.poll_attempts == 0 {
            return Err("poll_attempts must be greater than 0".to_string());
        }

        if !(self.multiplier > 1.0 && self.multiplier <= 2.0) {
            return Err("multiplier must be greater than 1.0 and at most 2.0".to_string());
        }

        if !(1..=10).contains(&self.creativity) {
            return Err("creativity must be between 1 and 10".to_string());
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        Ok(())
    }

    /// Directory for intermediate files.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
        }
    }

    pub fn upscale_params(&self) -> UpscaleParams {
        UpscaleParams {
            style: self.style.clone(),
            creativity_strength: self.creativity,
            multiplier: self.multiplier,
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            attempts: self.poll_attempts,
            interval: Duration::from_secs(self.poll_interval_secs),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            pixel_threshold: self.pixel_threshold,
            max_tile_dimension: self.max_tile_dimension,
            blend_width: self.blend_width,
            jpeg_quality: self.jpeg_quality,
            work_dir: self.work_dir(),
            concurrent_tiles: self.concurrent_tiles,
            keep_intermediates: self.keep_intermediates,
        }
    }
}

// =============================================================================
// Split Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct SplitConfig {
    /// Image to split.
    pub input: PathBuf,

    /// Directory to write the two tiles into.
    #[arg(short = 'd', long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Largest width or height before the image is downsized.
    #[arg(long, default_value_t = DEFAULT_MAX_TILE_DIMENSION, env = "UPSCALE_MAX_TILE_DIMENSION")]
    pub max_tile_dimension: u32,

    /// JPEG quality for the tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "UPSCALE_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tile_dimension < 2 {
            return Err("max_tile_dimension must be at least 2".to_string());
        }
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Blend Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct BlendConfig {
    /// Left tile.
    pub left: PathBuf,

    /// Right tile.
    pub right: PathBuf,

    /// Where to write the blended image.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Width of the blended seam in pixels.
    #[arg(long, default_value_t = DEFAULT_BLEND_WIDTH, env = "UPSCALE_BLEND_WIDTH")]
    pub blend_width: u32,

    /// JPEG quality for JPEG output (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "UPSCALE_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl BlendConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
