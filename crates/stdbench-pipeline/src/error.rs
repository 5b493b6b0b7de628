//! Error types for cohort orchestration and rendering.

use crate::stage::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building or running a cohort.
#[derive(Debug, Error)]
pub enum CohortError {
    /// The cohort has no variants to run.
    #[error("cohort is empty: at least one standard version is required")]
    EmptyCohort,

    /// Two variants share the same standard version.
    #[error("standard version listed twice: {version}")]
    DuplicateVersion { version: String },

    /// Two variants would share a working directory.
    #[error("working directory shared by several variants: {path}")]
    DuplicateWorkdir { path: PathBuf },

    /// A stage task panicked or was cancelled before reporting.
    #[error("{stage} task did not complete: {detail}")]
    TaskJoin { stage: Stage, detail: String },

    /// A stage-group finished without an outcome for one of its variants.
    #[error("{stage} produced no outcome for variant {version}")]
    MissingOutcome { stage: Stage, version: String },
}

/// Convenience result alias.
pub type CohortResult<T> = std::result::Result<T, CohortError>;

/// Errors produced by the table renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("results file {path} is not valid benchmark JSON: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("results file {path} contains no benchmark records")]
    NoRecords { path: PathBuf },
}
