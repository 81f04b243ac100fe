use thiserror::Error;

use crate::client::JobState;

/// Errors that can occur while loading, splitting or saving tile images
#[derive(Debug, Error)]
pub enum TileError {
    /// Source data could not be decoded as an image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Image could not be encoded to the output format
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// Filesystem error while reading or writing an image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image is too small to be split into two tiles
    #[error("Image too small to split: {width}x{height}")]
    TooSmall { width: u32, height: u32 },
}

/// Errors that can occur when recombining two tiles
#[derive(Debug, Error)]
pub enum BlendError {
    /// Blend band is wider than one of the tiles
    #[error(
        "Blend band of {blend_width}px exceeds tile width (left {left_width}px, right {right_width}px)"
    )]
    BandTooWide {
        blend_width: u32,
        left_width: u32,
        right_width: u32,
    },

    /// One of the tiles could not be loaded or the result could not be saved
    #[error("Tile error: {0}")]
    Tile(#[from] TileError),
}

/// Errors from a single remote upscale job
#[derive(Debug, Error)]
pub enum JobError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout)
    #[error("HTTP request failed during {stage}: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-2xx status code
    #[error("Service returned HTTP {status} during {stage}: {body}")]
    Api {
        stage: &'static str,
        status: u16,
        body: String,
    },

    /// A successful response did not have the expected shape
    #[error("Malformed response during {stage}: {message}")]
    MalformedResponse {
        stage: &'static str,
        message: String,
    },

    /// The finished image could not be downloaded
    #[error("Download of upscaled image failed with HTTP {status}")]
    Download { status: u16 },

    /// The poll budget was spent without the job completing
    #[error("Job did not complete after {attempts} poll attempts")]
    Exhausted { attempts: u32 },

    /// The job was cancelled before it completed
    #[error("Job cancelled")]
    Cancelled,

    /// Local filesystem error while reading the input or writing the result
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// The terminal lifecycle state this error leaves the job in.
    pub fn terminal_state(&self) -> JobState {
        match self {
            JobError::Exhausted { .. } => JobState::Exhausted,
            _ => JobState::Failed,
        }
    }

    /// Whether this is one of the documented, recoverable failure modes.
    ///
    /// Malformed responses and local I/O failures are unexpected and point at
    /// a protocol change or an environment problem rather than a flaky job.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            JobError::MalformedResponse { .. } | JobError::Io(_)
        )
    }
}

/// Errors from the full split / upscale / blend pipeline
#[derive(Debug, Error)]
pub enum UpscaleError {
    /// A remote job produced no result
    #[error("Upscale of {target} failed: {source}")]
    Job {
        target: &'static str,
        #[source]
        source: JobError,
    },

    /// Splitting the source image failed
    #[error("Tiling failed: {0}")]
    Tile(#[from] TileError),

    /// Recombining the upscaled tiles failed
    #[error("Blending failed: {0}")]
    Blend(#[from] BlendError),

    /// Filesystem error while placing the final output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking image task panicked or was aborted
    #[error("Image task failed: {0}")]
    Task(String),
}

impl UpscaleError {
    /// Whether the failure is a documented outcome (network trouble, job
    /// exhaustion, cancellation) rather than a bug or a broken environment.
    pub fn is_expected(&self) -> bool {
        match self {
            UpscaleError::Job { source, .. } => source.is_expected(),
            _ => false,
        }
    }
}
