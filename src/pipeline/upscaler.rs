//! The split / upscale / blend orchestrator.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::UpscaleService;
use crate::error::{BlendError, JobError, UpscaleError};
use crate::tile::{
    blend_files, read_dimensions, save_rgb, split_image, TileSplit, DEFAULT_BLEND_WIDTH,
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_TILE_DIMENSION,
};

use super::scratch::Scratch;

/// Default pixel count above which an image is tiled (20 MP).
pub const DEFAULT_PIXEL_THRESHOLD: u64 = 20_000_000;

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for one [`Upscaler`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Images with more pixels than this are split in two
    pub pixel_threshold: u64,

    /// Largest side a tile source may have before it is downsized
    pub max_tile_dimension: u32,

    /// Width of the cross-faded seam, in upscaled pixels
    pub blend_width: u32,

    /// JPEG quality for tiles and JPEG output
    pub jpeg_quality: u8,

    /// Directory for tile crops
    pub work_dir: PathBuf,

    /// Run both tile jobs at once instead of left then right
    pub concurrent_tiles: bool,

    /// Leave intermediate files on disk
    pub keep_intermediates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pixel_threshold: DEFAULT_PIXEL_THRESHOLD,
            max_tile_dimension: DEFAULT_MAX_TILE_DIMENSION,
            blend_width: DEFAULT_BLEND_WIDTH,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            work_dir: std::env::temp_dir(),
            concurrent_tiles: false,
            keep_intermediates: false,
        }
    }
}

// =============================================================================
// Upscaler
// =============================================================================

/// Upscales images of any size through an [`UpscaleService`] with an input
/// size limit.
///
/// Small images go to the service whole. Images above the pixel threshold
/// are split into two tiles, each tile is upscaled, and the results are
/// blended back together. Every intermediate file is removed when the run
/// ends, whether it succeeded or not.
///
/// # Example
///
/// ```ignore
/// use tiled_upscale::client::{JobClient, UpscaleApi};
/// use tiled_upscale::pipeline::{PipelineConfig, Upscaler};
///
/// let service = JobClient::new(api, params, poll, work_dir);
/// let upscaler = Upscaler::new(service, PipelineConfig::default());
///
/// let output = upscaler.upscale(Path::new("photo.jpg"), Path::new("out.jpg")).await?;
/// ```
pub struct Upscaler<S: UpscaleService> {
    service: S,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<S: UpscaleService> Upscaler<S> {
    pub fn new(service: S, config: PipelineConfig) -> Self {
        Self::with_cancellation(service, config, CancellationToken::new())
    }

    /// Create an upscaler whose remote waits stop when `cancel` fires.
    pub fn with_cancellation(service: S, config: PipelineConfig, cancel: CancellationToken) -> Self {
        Self {
            service,
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Upscale `source` and write the result to `output`.
    ///
    /// Only the image header is read to decide whether tiling is needed.
    /// The result is prepared in the work dir and moved into place, so on
    /// failure nothing is left at `output`.
    pub async fn upscale(&self, source: &Path, output: &Path) -> Result<PathBuf, UpscaleError> {
        let (width, height) = read_dimensions(source)?;
        let pixels = width as u64 * height as u64;

        if pixels <= self.config.pixel_threshold {
            info!(
                width,
                height,
                threshold = self.config.pixel_threshold,
                "Image is within the pixel threshold, upscaling without splitting"
            );
            self.upscale_whole(source, output).await
        } else {
            info!(
                width,
                height,
                threshold = self.config.pixel_threshold,
                "Image exceeds the pixel threshold, splitting and upscaling"
            );
            self.upscale_tiled(source, output).await
        }
    }

    async fn upscale_whole(&self, source: &Path, output: &Path) -> Result<PathBuf, UpscaleError> {
        let result = self.upscale_one("image", source, &self.cancel).await?;

        if let Err(e) = move_file(&result, output).await {
            let mut scratch = Scratch::keeping(self.config.keep_intermediates);
            scratch.track(result);
            scratch.cleanup();
            return Err(e.into());
        }

        info!(output = %output.display(), "Final upscaled image saved");
        Ok(output.to_path_buf())
    }

    async fn upscale_tiled(&self, source: &Path, output: &Path) -> Result<PathBuf, UpscaleError> {
        let mut scratch = Scratch::keeping(self.config.keep_intermediates);
        let outcome = self.run_tiled(source, output, &mut scratch).await;

        info!(files = scratch.paths().len(), "Cleaning up temporary files");
        let report = scratch.cleanup();
        debug!(?report, "Cleanup finished");

        outcome
    }

    async fn run_tiled(
        &self,
        source: &Path,
        output: &Path,
        scratch: &mut Scratch,
    ) -> Result<PathBuf, UpscaleError> {
        info!("Starting image split");
        let split = self.split(source).await?;
        for path in split.paths() {
            scratch.track(path);
        }

        check_band_fits(&split, self.config.blend_width)?;

        let (left, right) = if self.config.concurrent_tiles {
            self.upscale_tiles_concurrently(&split, scratch).await?
        } else {
            self.upscale_tiles_sequentially(&split, scratch).await?
        };

        info!("All tiles upscaled, combining images");
        let staged = staging_path(&self.config.work_dir, output);
        scratch.track(&staged);

        let blend_width = self.config.blend_width;
        let quality = self.config.jpeg_quality;
        let destination = staged.clone();

        tokio::task::spawn_blocking(move || -> Result<(), UpscaleError> {
            let merged = blend_files(&left, &right, blend_width)?;
            info!(
                width = merged.width(),
                height = merged.height(),
                "Tiles combined"
            );
            save_rgb(&merged, &destination, quality)?;
            Ok(())
        })
        .await
        .map_err(|e| UpscaleError::Task(e.to_string()))??;

        move_file(&staged, output).await?;
        scratch.untrack(&staged);

        info!(output = %output.display(), "Final upscaled image saved");
        Ok(output.to_path_buf())
    }

    async fn split(&self, source: &Path) -> Result<TileSplit, UpscaleError> {
        let source = source.to_path_buf();
        let max_dimension = self.config.max_tile_dimension;
        let work_dir = self.config.work_dir.clone();
        let quality = self.config.jpeg_quality;

        let split = tokio::task::spawn_blocking(move || {
            split_image(&source, max_dimension, &work_dir, quality)
        })
        .await
        .map_err(|e| UpscaleError::Task(e.to_string()))??;

        Ok(split)
    }

    async fn upscale_tiles_sequentially(
        &self,
        split: &TileSplit,
        scratch: &mut Scratch,
    ) -> Result<(PathBuf, PathBuf), UpscaleError> {
        let left = self
            .upscale_one("left tile", &split.left.path, &self.cancel)
            .await?;
        scratch.track(&left);

        let right = self
            .upscale_one("right tile", &split.right.path, &self.cancel)
            .await?;
        scratch.track(&right);

        Ok((left, right))
    }

    /// Run both tile jobs at once. The first failure cancels the sibling.
    async fn upscale_tiles_concurrently(
        &self,
        split: &TileSplit,
        scratch: &mut Scratch,
    ) -> Result<(PathBuf, PathBuf), UpscaleError> {
        let siblings = self.cancel.child_token();

        let (left, right) = tokio::join!(
            self.upscale_one_or_cancel("left tile", &split.left.path, &siblings),
            self.upscale_one_or_cancel("right tile", &split.right.path, &siblings),
        );

        for path in [&left, &right].into_iter().flatten() {
            scratch.track(path);
        }

        match (left, right) {
            (Ok(left), Ok(right)) => Ok((left, right)),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            // Report the root cause, not the cancellation it triggered
            (Err(left), Err(right)) => Err(if is_cancellation(&left) { right } else { left }),
        }
    }

    async fn upscale_one_or_cancel(
        &self,
        label: &'static str,
        image: &Path,
        siblings: &CancellationToken,
    ) -> Result<PathBuf, UpscaleError> {
        let result = self.upscale_one(label, image, siblings).await;
        if result.is_err() {
            siblings.cancel();
        }
        result
    }

    async fn upscale_one(
        &self,
        label: &'static str,
        image: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, UpscaleError> {
        info!(image = %image.display(), "Upscaling {label}");

        match self.service.upscale(image, cancel).await {
            Ok(path) => {
                info!(path = %path.display(), "Upscaled {label} successfully");
                Ok(path)
            }
            Err(source) => {
                warn!(
                    state = ?source.terminal_state(),
                    error = %source,
                    "Failed to upscale {label}"
                );
                Err(UpscaleError::Job {
                    target: label,
                    source,
                })
            }
        }
    }
}

fn is_cancellation(error: &UpscaleError) -> bool {
    matches!(
        error,
        UpscaleError::Job {
            source: JobError::Cancelled,
            ..
        }
    )
}

/// Reject a seam band wider than either tile before any job runs.
fn check_band_fits(split: &TileSplit, blend_width: u32) -> Result<(), BlendError> {
    let (left_width, right_width) = (split.left.width, split.right.width);

    if blend_width > left_width.min(right_width) {
        warn!(
            blend_width,
            left_width,
            right_width,
            "Tiles are narrower than the blend band"
        );
        return Err(BlendError::BandTooWide {
            blend_width,
            left_width,
            right_width,
        });
    }
    Ok(())
}

/// Where the blended image is encoded before it is moved to `output`.
///
/// Keeps the output's extension so the encoder picks the same format.
fn staging_path(work_dir: &Path, output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = match output.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_blended_{}.{ext}", Uuid::now_v7()),
        None => format!("{stem}_blended_{}", Uuid::now_v7()),
    };
    work_dir.join(name)
}

/// Move a file, falling back to copy and delete across filesystems.
///
/// A failed copy removes whatever reached `to`. Once the copy is complete
/// the move counts as done, even if `from` cannot be removed.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    let Err(e) = tokio::fs::rename(from, to).await else {
        return Ok(());
    };
    debug!(error = %e, "Rename failed, copying instead");

    if let Err(e) = tokio::fs::copy(from, to).await {
        match tokio::fs::remove_file(to).await {
            Ok(()) => debug!(path = %to.display(), "Removed partial copy"),
            Err(remove) if remove.kind() == ErrorKind::NotFound => {}
            Err(remove) => {
                warn!(path = %to.display(), error = %remove, "Error removing partial copy")
            }
        }
        return Err(e);
    }

    if let Err(e) = tokio::fs::remove_file(from).await {
        warn!(path = %from.display(), error = %e, "Error removing moved file");
    }
    Ok(())
}
