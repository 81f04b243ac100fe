//! Remote upscaling job client.
//!
//! This module talks to the upscaling service. One job covers a single
//! image (a whole source or one tile) and walks through:
//!
//! 1. **Upload slot**: ask for a presigned upload target and image id
//! 2. **Upload**: POST the image bytes to that target
//! 3. **Submit**: request an upscale variation of the uploaded image
//! 4. **Poll**: query the variation until it is complete, then download it
//!
//! # Components
//!
//! - [`UpscaleApi`]: Thin HTTP wrapper, one method per service call
//! - [`JobClient`]: Runs the full job with a bounded, cancellable poll loop
//! - [`UpscaleService`]: The seam the pipeline depends on; [`JobClient`] is
//!   the HTTP implementation

mod api;
mod job;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

pub use api::{
    ServiceConfig, UploadSlot, UpscaleApi, UpscaleParams, VariationItem, VariationResponse,
    VariationStatus, DEFAULT_BASE_URL, DEFAULT_CREATIVITY, DEFAULT_MULTIPLIER,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_STYLE, DEFAULT_UPLOAD_TIMEOUT,
};
pub use job::{JobClient, PollConfig, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};

/// Lifecycle of a remote job.
///
/// Transitions are driven only by service responses. `Failed` and
/// `Exhausted` are both "no result" to the caller; they are kept apart for
/// logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Polling,
    Complete,
    Exhausted,
    Failed,
}

/// Something that can upscale an image file.
///
/// Implementations must be thread-safe so tiles can be processed
/// concurrently.
#[async_trait]
pub trait UpscaleService: Send + Sync {
    /// Upscale `image` and return the path of the result on local disk.
    ///
    /// The caller owns the returned file. `cancel` aborts any wait.
    async fn upscale(&self, image: &Path, cancel: &CancellationToken) -> Result<PathBuf, JobError>;
}
