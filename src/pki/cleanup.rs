//! Removal of intermediate artifacts.
//!
//! [`EphemeralFiles`] owns the paths a pipeline run may create. Call
//! [`EphemeralFiles::cleanup`] on every exit path; if the guard is dropped
//! without it (panic, cancelled task) the files are removed synchronously.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Owns a set of temporary files and deletes them exactly once.
#[derive(Debug)]
pub struct EphemeralFiles {
    paths: Vec<PathBuf>,
}

impl EphemeralFiles {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| p.as_ref().to_path_buf())
                .collect(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Best-effort removal; a missing file is not an error and other
    /// failures are only logged.
    pub async fn cleanup(mut self) {
        for path in std::mem::take(&mut self.paths) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed work file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove work file"),
            }
        }
    }
}

impl Drop for EphemeralFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove work file");
                }
            }
        }
    }
}
