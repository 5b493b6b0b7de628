//! stdbench pipeline - per-standard benchmark orchestration
//!
//! Provides a cohort orchestrator that:
//! - Configures, builds, executes and renders one benchmark build per language standard
//! - Runs each stage across every variant concurrently, gating between stages
//! - Skips stages whose artifacts already exist, so interrupted runs resume
//! - Reclaims working directories with a bounded retry

pub mod cleanup;
pub mod cohort;
pub mod config;
pub mod error;
pub mod guard;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod runner;
pub mod stage;
pub mod telemetry;
pub mod variant;

// Re-export key types
pub use cleanup::{CleanupOutcome, DirRemover, FsRemover, ResilientCleanup, RetryPolicy};
pub use cohort::CohortOrchestrator;
pub use config::PipelineConfig;
pub use error::{CohortError, CohortResult, RenderError};
pub use guard::StageGuard;
pub use pipeline::{BenchStageExecutor, StageExecutor, VariantPipeline, VariantProgress};
pub use render::{Renderer, TableRenderer};
pub use report::{CohortReport, RunStatus, StageGroupReport, VariantSummary};
pub use runner::{Invocation, ProcessRunner, RunReport, StageRunner};
pub use stage::{Stage, StageOutcome};
pub use telemetry::init_tracing;
pub use variant::{CohortSpec, Variant};

/// stdbench version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
