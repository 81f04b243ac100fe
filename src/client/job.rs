//! The per-image remote job: upload, submit, poll, download.
//!
//! ```text
//!   request slot ─▶ upload ─▶ submit ─▶ poll ──(COMPLETE)──▶ download
//!        │            │          │       │ ▲
//!        └────────────┴──────────┘       │ └── pending / transient error,
//!                 Failed                 │     sleep `interval`
//!                                        └──── budget spent ─▶ Exhausted
//! ```
//!
//! Failures before polling are terminal. During polling, network errors and
//! non-2xx answers only consume an attempt. Cancellation is honoured at every
//! step, including an upload in flight.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::JobError;

use super::api::{UpscaleApi, UpscaleParams, VariationStatus};
use super::{JobState, UpscaleService};

/// Default number of status polls before giving up.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 20;

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Poll budget for a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of status requests
    pub attempts: u32,
    /// Delay between consecutive status requests
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Runs upscale jobs against the remote service.
///
/// Downloaded results are written to `download_dir` under a UUIDv7 name, so
/// tiles processed in the same run never collide.
pub struct JobClient {
    api: UpscaleApi,
    params: UpscaleParams,
    poll: PollConfig,
    download_dir: PathBuf,
}

impl JobClient {
    pub fn new(
        api: UpscaleApi,
        params: UpscaleParams,
        poll: PollConfig,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api,
            params,
            poll,
            download_dir: download_dir.into(),
        }
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Upscale one image file and return the path of the downloaded result.
    pub async fn run(&self, image: &Path, cancel: &CancellationToken) -> Result<PathBuf, JobError> {
        info!(image = %image.display(), "Starting upscale");

        let bytes = tokio::fs::read(image).await?;

        let slot = unless_cancelled(cancel, "upload slot request", self.api.request_upload_slot())
            .await?;
        debug!(image_id = %slot.image_id, fields = slot.fields.len(), "Got upload slot");

        info!(image_id = %slot.image_id, bytes = bytes.len(), "Uploading image");
        unless_cancelled(cancel, "upload", self.api.upload(&slot, bytes)).await?;

        let variation_id = unless_cancelled(
            cancel,
            "job submission",
            self.api.submit_upscale(&slot.image_id, &self.params),
        )
        .await?;
        info!(
            variation_id = %variation_id,
            state = ?JobState::Submitted,
            style = %self.params.style,
            multiplier = self.params.multiplier,
            "Upscale job submitted"
        );

        self.poll_until_complete(&variation_id, cancel).await
    }

    async fn poll_until_complete(
        &self,
        variation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, JobError> {
        let max_attempts = self.poll.attempts;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                info!(variation_id, attempt, "Polling cancelled");
                return Err(JobError::Cancelled);
            }

            info!(
                variation_id,
                state = ?JobState::Polling,
                "Checking upscale status... attempt {attempt}/{max_attempts}"
            );

            match self.api.variation_status(variation_id).await {
                Ok(VariationStatus::Complete { url }) => {
                    info!(variation_id, "Upscale completed, downloading image");
                    match self.download(&url).await {
                        Ok(path) => {
                            info!(
                                variation_id,
                                state = ?JobState::Complete,
                                path = %path.display(),
                                "Upscaled image saved"
                            );
                            return Ok(path);
                        }
                        Err(e @ JobError::Request { .. }) => {
                            warn!(variation_id, attempt, error = %e, "Download interrupted");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(VariationStatus::Pending { status }) => {
                    debug!(variation_id, attempt, status = ?status, "Upscale still pending");
                }
                Err(e @ (JobError::Request { .. } | JobError::Api { .. })) => {
                    warn!(variation_id, attempt, error = %e, "Error checking upscale status");
                }
                Err(e) => return Err(e),
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(variation_id, attempt, "Polling cancelled");
                        return Err(JobError::Cancelled);
                    }
                    _ = tokio::time::sleep(self.poll.interval) => {}
                }
            }
        }

        warn!(
            variation_id,
            state = ?JobState::Exhausted,
            "Max attempts reached, upscaling may have failed"
        );
        Err(JobError::Exhausted {
            attempts: max_attempts,
        })
    }

    async fn download(&self, url: &str) -> Result<PathBuf, JobError> {
        let data = self.api.download(url).await?;

        let path = self
            .download_dir
            .join(format!("upscaled_tile_{}.jpg", Uuid::now_v7()));
        tokio::fs::write(&path, &data).await?;

        Ok(path)
    }
}

/// Run one pre-poll step unless `cancel` fires first.
///
/// An already-cancelled token wins, so no request is sent at all.
async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    stage: &'static str,
    step: impl Future<Output = Result<T, JobError>>,
) -> Result<T, JobError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!(stage, "Job cancelled");
            Err(JobError::Cancelled)
        }
        result = step => result,
    }
}

#[async_trait]
impl UpscaleService for JobClient {
    async fn upscale(&self, image: &Path, cancel: &CancellationToken) -> Result<PathBuf, JobError> {
        self.run(image, cancel).await
    }
}
