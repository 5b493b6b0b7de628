//! Working-directory removal with a bounded, fixed-delay retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before each retry (milliseconds).
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay_ms: 3_000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// Returns the last result together with the number of attempts made.
    /// A `max_attempts` of zero still runs `op` once.
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> (Result<T, E>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = op(attempt).await;
            if result.is_ok() || attempt == max_attempts {
                return (result, attempt);
            }
            tokio::time::sleep(self.delay()).await;
            attempt += 1;
        }
    }
}

/// Removal primitive used by [`ResilientCleanup`].
#[async_trait]
pub trait DirRemover: Send + Sync {
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`DirRemover`] backed by `tokio::fs`. A missing directory counts as removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRemover;

#[async_trait]
impl DirRemover for FsRemover {
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// What happened to one working directory at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// Cleanup did not run (stalled run or `keep_workdirs`).
    NotAttempted,

    /// The directory is gone.
    Reclaimed { attempts: u32 },

    /// Every attempt failed; the operator has to remove it.
    NeedsManualRemoval { path: PathBuf, error: String },
}

impl CleanupOutcome {
    pub fn reclaimed(&self) -> bool {
        matches!(self, CleanupOutcome::Reclaimed { .. })
    }
}

/// Removes variant working directories, retrying once on failure.
#[derive(Clone)]
pub struct ResilientCleanup {
    remover: Arc<dyn DirRemover>,
    policy: RetryPolicy,
}

impl ResilientCleanup {
    pub fn new(remover: Arc<dyn DirRemover>, policy: RetryPolicy) -> Self {
        Self { remover, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Remove `path`, never failing the caller.
    pub async fn reclaim(&self, path: &Path) -> CleanupOutcome {
        let (result, attempts) = self
            .policy
            .run(|attempt| async move {
                let result = self.remover.remove_dir_all(path).await;
                if let Err(e) = &result {
                    warn!(path = %path.display(), attempt, error = %e, "failed to remove working directory");
                }
                result
            })
            .await;

        match result {
            Ok(()) => {
                info!(path = %path.display(), attempts, "working directory removed");
                CleanupOutcome::Reclaimed { attempts }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "could not remove {} after {} attempt(s): {}. Remove it manually before the next run.",
                    path.display(),
                    attempts,
                    e
                );
                CleanupOutcome::NeedsManualRemoval {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Reclaim every path concurrently; outcomes follow the input order.
    pub async fn sweep(&self, paths: &[PathBuf]) -> Vec<CleanupOutcome> {
        futures::future::join_all(paths.iter().map(|path| self.reclaim(path))).await
    }
}
