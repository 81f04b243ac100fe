//! Tiled Upscale - upscale images beyond a remote upscaler's size limit.
//!
//! This binary parses the command line, sets up logging and runs the
//! requested subcommand.

use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiled_upscale::{
    config::{BlendConfig, Cli, Command, SplitConfig, UpscaleConfig},
    tile::{blend_files, save_rgb, split_image},
    JobClient, UpscaleApi, Upscaler,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Upscale(config) => run_upscale(config).await,
        Command::Split(config) => run_split(config),
        Command::Blend(config) => run_blend(config),
    }
}

// =============================================================================
// Upscale Command
// =============================================================================

async fn run_upscale(config: UpscaleConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let pipeline = config.pipeline_config();

    info!("Configuration:");
    info!("  Service: {}", config.base_url);
    info!("  Input: {}", config.input.display());
    info!("  Output: {}", config.output.display());
    info!("  Work dir: {}", pipeline.work_dir.display());
    info!(
        "  Tiling: above {} px, max side {} px, {} px blend",
        pipeline.pixel_threshold, pipeline.max_tile_dimension, pipeline.blend_width
    );
    info!(
        "  Polling: {} attempts every {}s",
        config.poll_attempts, config.poll_interval_secs
    );
    if pipeline.keep_intermediates {
        warn!("  Intermediate files will be kept in {}", pipeline.work_dir.display());
    }

    if let Err(e) = tokio::fs::create_dir_all(&pipeline.work_dir).await {
        error!(
            "Failed to create work dir {}: {}",
            pipeline.work_dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let api = UpscaleApi::new(config.service_config());
    let client = JobClient::new(
        api,
        config.upscale_params(),
        config.poll_config(),
        pipeline.work_dir.clone(),
    );
    let upscaler = Upscaler::with_cancellation(client, pipeline, cancel);

    match upscaler.upscale(&config.input, &config.output).await {
        Ok(path) => {
            info!("Successfully upscaled image: {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) if e.is_expected() => {
            error!("Failed to upscale the image: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Unexpected error while upscaling: {}", e);
            error!("  This usually means the service changed its API or the environment is broken");
            ExitCode::FAILURE
        }
    }
}

/// Cancel outstanding jobs on the first Ctrl-C.
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding jobs");
            cancel.cancel();
        }
    });
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiled_upscale=debug"
    } else {
        "tiled_upscale=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Split Command
// =============================================================================

fn run_split(config: SplitConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match split_image(
        &config.input,
        config.max_tile_dimension,
        &config.out_dir,
        config.jpeg_quality,
    ) {
        Ok(split) => {
            println!("Mid point: {}", split.mid_x);
            for tile in [&split.left, &split.right] {
                println!(
                    "{}  {}x{} at x={}",
                    tile.path.display(),
                    tile.width,
                    tile.height,
                    tile.offset_x
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to split {}: {}", config.input.display(), e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Blend Command
// =============================================================================

fn run_blend(config: BlendConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let merged = match blend_files(&config.left, &config.right, config.blend_width) {
        Ok(img) => img,
        Err(e) => {
            error!("Failed to blend tiles: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = save_rgb(&merged, &config.output, config.jpeg_quality) {
        error!("Failed to save {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    println!(
        "{}  {}x{}",
        config.output.display(),
        merged.width(),
        merged.height()
    );
    ExitCode::SUCCESS
}
