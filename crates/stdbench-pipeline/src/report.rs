//! Run summary produced by the cohort orchestrator.

use crate::cleanup::CleanupOutcome;
use crate::stage::{Stage, StageOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Overall status of a cohort run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every variant reached Render without failing.
    Completed,

    /// At least one variant failed, but the run did not stall.
    Partial,

    /// Every attempted variant failed `stage`; later stages never started.
    Stalled { stage: Stage },
}

/// Outcomes of one stage-group, in cohort order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageGroupReport {
    pub stage: Stage,
    /// `(version, outcome)` for each variant that attempted the stage.
    pub outcomes: Vec<(String, StageOutcome)>,
}

impl StageGroupReport {
    /// Whether any variant succeeded or skipped this stage.
    pub fn any_progressed(&self) -> bool {
        self.outcomes.iter().any(|(_, outcome)| outcome.progressed())
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failed()).count()
    }
}

/// Final state of one variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantSummary {
    pub version: String,
    pub workdir: PathBuf,
    /// Last stage attempted.
    pub terminal_stage: Option<Stage>,
    /// Outcome of `terminal_stage`.
    pub terminal_outcome: Option<StageOutcome>,
    pub cleanup: CleanupOutcome,
}

impl VariantSummary {
    pub fn completed(&self) -> bool {
        self.terminal_stage == Some(Stage::Render)
            && self
                .terminal_outcome
                .as_ref()
                .is_some_and(StageOutcome::progressed)
    }
}

/// Result of a complete cohort run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortReport {
    /// Unique id of this run.
    pub run_id: Uuid,

    /// SHA-256 digest of the cohort (versions, workdirs, compiler).
    pub cohort_digest: String,

    pub started_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    pub status: RunStatus,

    /// One entry per stage-group that started.
    pub groups: Vec<StageGroupReport>,

    /// One entry per variant, in cohort order.
    pub variants: Vec<VariantSummary>,
}

impl CohortReport {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Process exit code for this run: 0 completed, 1 stalled, 2 partial.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Completed => 0,
            RunStatus::Stalled { .. } => 1,
            RunStatus::Partial => 2,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.variants.iter().filter(|v| v.completed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.variants.len() - self.completed_count()
    }

    /// Working directories that survived every removal attempt.
    pub fn paths_needing_manual_cleanup(&self) -> Vec<&Path> {
        self.variants
            .iter()
            .filter_map(|v| match &v.cleanup {
                CleanupOutcome::NeedsManualRemoval { path, .. } => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    pub fn variant(&self, version: &str) -> Option<&VariantSummary> {
        self.variants.iter().find(|v| v.version == version)
    }

    /// Emit the operator-facing summary through `tracing`.
    pub fn log_summary(&self) {
        for v in &self.variants {
            let stage = v.terminal_stage.map_or("none", |s| s.name());
            let outcome = v.terminal_outcome.as_ref().map_or("not started", |o| o.label());
            let reclaimed = v.cleanup.reclaimed();
            if v.completed() {
                info!(variant = %v.version, stage, outcome, reclaimed, "variant finished");
            } else {
                warn!(variant = %v.version, stage, outcome, reclaimed, "variant did not finish");
            }
        }

        for path in self.paths_needing_manual_cleanup() {
            warn!(path = %path.display(), "working directory needs manual removal");
        }

        match self.status {
            RunStatus::Completed => info!(
                run_id = %self.run_id,
                duration_ms = self.duration_ms,
                "all {} variant(s) completed",
                self.variants.len()
            ),
            RunStatus::Partial => warn!(
                run_id = %self.run_id,
                duration_ms = self.duration_ms,
                "{} of {} variant(s) completed",
                self.completed_count(),
                self.variants.len()
            ),
            RunStatus::Stalled { stage } => error!(
                run_id = %self.run_id,
                %stage,
                "every variant failed {stage}; run aborted, artifacts left for inspection"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(version: &str, stage: Stage, outcome: StageOutcome, cleanup: CleanupOutcome) -> VariantSummary {
        VariantSummary {
            version: version.to_string(),
            workdir: PathBuf::from(format!("build-{version}")),
            terminal_stage: Some(stage),
            terminal_outcome: Some(outcome),
            cleanup,
        }
    }

    fn report(status: RunStatus, variants: Vec<VariantSummary>) -> CohortReport {
        CohortReport {
            run_id: Uuid::new_v4(),
            cohort_digest: "abc123".to_string(),
            started_at: Utc::now(),
            duration_ms: 300,
            status,
            groups: Vec::new(),
            variants,
        }
    }

    #[test]
    fn test_report_counts() {
        let result = report(
            RunStatus::Partial,
            vec![
                summary("17", Stage::Render, StageOutcome::Succeeded, CleanupOutcome::Reclaimed { attempts: 1 }),
                summary(
                    "20",
                    Stage::Execute,
                    StageOutcome::Failed {
                        diagnostic: "exited with code 1".to_string(),
                    },
                    CleanupOutcome::Reclaimed { attempts: 1 },
                ),
            ],
        );

        assert_eq!(result.completed_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert!(!result.success());
        assert_eq!(result.exit_code(), 2);
        assert!(result.paths_needing_manual_cleanup().is_empty());
    }

    #[test]
    fn test_manual_cleanup_paths() {
        let result = report(
            RunStatus::Completed,
            vec![
                summary("17", Stage::Render, StageOutcome::Skipped, CleanupOutcome::Reclaimed { attempts: 2 }),
                summary(
                    "20",
                    Stage::Render,
                    StageOutcome::Succeeded,
                    CleanupOutcome::NeedsManualRemoval {
                        path: PathBuf::from("build-20"),
                        error: "locked".to_string(),
                    },
                ),
            ],
        );

        assert!(result.success());
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.paths_needing_manual_cleanup(), vec![Path::new("build-20")]);
    }

    #[test]
    fn test_stalled_exit_code_and_status_json() {
        let result = report(RunStatus::Stalled { stage: Stage::Configure }, Vec::new());
        assert_eq!(result.exit_code(), 1);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"]["status"], "stalled");
        assert_eq!(json["status"]["stage"], "configure");
    }

    #[test]
    fn test_group_report_progress() {
        let group = StageGroupReport {
            stage: Stage::Build,
            outcomes: vec![
                ("17".to_string(), StageOutcome::Failed { diagnostic: String::new() }),
                ("20".to_string(), StageOutcome::Skipped),
            ],
        };
        assert!(group.any_progressed());
        assert_eq!(group.failed_count(), 1);
    }
}
