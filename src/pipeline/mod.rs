//! End-to-end upscaling pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Upscaler                              │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                      upscale()                          │    │
//! │  │  1. Read header       4. Upscale left, then right       │    │
//! │  │  2. Small? one job    5. Blend and save                 │    │
//! │  │  3. Split in two      6. Clean up intermediates         │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌────────────────┐    ┌──────────────┐    │
//! │    │   Tiler   │      │ UpscaleService │    │   Blender    │    │
//! │    └───────────┘      └────────────────┘    └──────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failing tile fails the whole run: no partial image is written.

mod scratch;
mod upscaler;

pub use scratch::{CleanupReport, Scratch};
pub use upscaler::{PipelineConfig, Upscaler, DEFAULT_PIXEL_THRESHOLD};
