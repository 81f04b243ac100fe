//! Tracking and removal of a run's temporary files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files deleted
    pub removed: usize,
    /// Files that were already gone
    pub missing: usize,
    /// Files that could not be deleted
    pub failed: usize,
    /// Files left in place on request
    pub kept: usize,
}

/// Temporary files created during one pipeline run.
///
/// Files are removed by [`Scratch::cleanup`], or on drop if cleanup was
/// never called. Removal problems are logged and never reported as errors.
#[derive(Debug, Default)]
pub struct Scratch {
    paths: Vec<PathBuf>,
    keep: bool,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker that leaves its files on disk, for debugging a run.
    pub fn keeping(keep: bool) -> Self {
        Self {
            paths: Vec::new(),
            keep,
        }
    }

    /// Register a file for cleanup.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Stop tracking a file that has been handed over to the caller.
    pub fn untrack(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Files currently tracked, in registration order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Delete every tracked file.
    pub fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for path in self.paths.drain(..) {
            if self.keep {
                info!(path = %path.display(), "Keeping intermediate file");
                report.kept += 1;
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Removed temporary file");
                    report.removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    info!(path = %path.display(), "File not found");
                    report.missing += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Error removing file");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if !self.paths.is_empty() {
            self.cleanup();
        }
    }
}
