//! Artifact-based idempotency guard for stage actions.

use crate::stage::StageOutcome;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Skips a stage action when any of its artifacts already exists.
///
/// A stage counts as complete when its own artifact is present or when the
/// artifact of a later stage is, since that one could only have been
/// produced after this stage finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageGuard {
    artifacts: Vec<PathBuf>,
}

impl StageGuard {
    /// Guard on a single artifact.
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifacts: vec![artifact.into()],
        }
    }

    /// Guard satisfied by any of `artifacts`.
    pub fn any_of(artifacts: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            artifacts: artifacts.into_iter().collect(),
        }
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// First artifact found on disk, if any.
    pub async fn satisfied_by(&self) -> Option<&Path> {
        for artifact in &self.artifacts {
            match tokio::fs::try_exists(artifact).await {
                Ok(true) => return Some(artifact),
                Ok(false) => {}
                Err(e) => {
                    debug!(path = %artifact.display(), error = %e, "artifact check failed");
                }
            }
        }
        None
    }

    /// Run `action` unless the guard is already satisfied.
    ///
    /// `action` is never called when an artifact exists. An `Err` from the
    /// action becomes [`StageOutcome::Failed`] carrying the full error chain.
    pub async fn run<F, Fut>(&self, action: F) -> StageOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if let Some(artifact) = self.satisfied_by().await {
            info!(artifact = %artifact.display(), "artifact present, skipping");
            return StageOutcome::Skipped;
        }

        match action().await {
            Ok(()) => StageOutcome::Succeeded,
            Err(e) => {
                let diagnostic = format!("{e:#}");
                warn!(error = %diagnostic, "stage failed");
                StageOutcome::Failed { diagnostic }
            }
        }
    }
}
