//! Cohort orchestration: stage-group fan-out, gating and cleanup.

use crate::cleanup::{CleanupOutcome, ResilientCleanup};
use crate::error::{CohortError, CohortResult};
use crate::pipeline::{StageExecutor, VariantPipeline, VariantProgress};
use crate::report::{CohortReport, RunStatus, StageGroupReport, VariantSummary};
use crate::stage::{Stage, StageOutcome};
use crate::variant::{CohortSpec, Variant};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

/// Runs every variant of a cohort one stage-group at a time.
///
/// All variants still in the run attempt a stage concurrently; the next
/// stage starts only once each of them has finished. A variant that fails
/// a stage takes no part in later stage-groups. If every variant that
/// attempted a stage before Render failed it, the run stops there without
/// cleanup. Once the Render stage-group has finished, every working
/// directory is swept regardless of how Render went.
pub struct CohortOrchestrator {
    pipeline: VariantPipeline,
    cleanup: Option<ResilientCleanup>,
}

impl CohortOrchestrator {
    pub fn new(executor: Arc<dyn StageExecutor>, cleanup: ResilientCleanup) -> Self {
        Self {
            pipeline: VariantPipeline::new(executor),
            cleanup: Some(cleanup),
        }
    }

    /// Leave working directories in place after rendering.
    pub fn keep_workdirs(mut self) -> Self {
        self.cleanup = None;
        self
    }

    /// Run the whole cohort and report per-variant results.
    ///
    /// `Err` only for orchestration faults (a stage task panicked); stage
    /// failures and stalls are reported through [`CohortReport::status`].
    pub async fn run(&self, cohort: &CohortSpec) -> CohortResult<CohortReport> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let cohort_digest = cohort.digest();
        let variants = cohort.variants();

        info!(
            run_id = %run_id,
            cohort = %&cohort_digest[..12],
            variants = variants.len(),
            compiler = %cohort.compiler().display(),
            "Starting cohort run"
        );

        let mut progress: Vec<VariantProgress> = variants
            .iter()
            .map(|v| VariantProgress::new(&v.version))
            .collect();
        let mut groups = Vec::new();
        let mut stalled = None;

        for stage in Stage::ALL {
            let active: Vec<usize> = (0..variants.len())
                .filter(|&idx| progress[idx].is_active())
                .collect();

            info!(%stage, variants = active.len(), "starting stage-group");
            let outcomes = self.run_stage_group(stage, variants, &active).await?;

            let mut group = StageGroupReport {
                stage,
                outcomes: Vec::with_capacity(outcomes.len()),
            };
            for (idx, outcome) in outcomes {
                group.outcomes.push((variants[idx].version.clone(), outcome.clone()));
                progress[idx].record(stage, outcome);
            }

            let progressed = group.any_progressed();
            info!(
                %stage,
                failed = group.failed_count(),
                attempted = group.outcomes.len(),
                "stage-group finished"
            );
            groups.push(group);

            // Gating only guards the start of a following stage-group.
            if !progressed && stage.next().is_some() {
                error!(%stage, "no variant got past {stage}; aborting run");
                stalled = Some(stage);
                break;
            }
        }

        let cleanup = match (&self.cleanup, stalled) {
            (Some(cleanup), None) => {
                let workdirs: Vec<PathBuf> = variants.iter().map(|v| v.workdir.clone()).collect();
                info!(directories = workdirs.len(), "reclaiming working directories");
                cleanup.sweep(&workdirs).await
            }
            _ => vec![CleanupOutcome::NotAttempted; variants.len()],
        };

        let summaries: Vec<VariantSummary> = variants
            .iter()
            .zip(progress)
            .zip(cleanup)
            .map(|((variant, progress), cleanup)| {
                let terminal = progress.terminal().map(|(s, o)| (s, o.clone()));
                VariantSummary {
                    version: variant.version.clone(),
                    workdir: variant.workdir.clone(),
                    terminal_stage: terminal.as_ref().map(|(s, _)| *s),
                    terminal_outcome: terminal.map(|(_, o)| o),
                    cleanup,
                }
            })
            .collect();

        let status = match stalled {
            Some(stage) => RunStatus::Stalled { stage },
            None if summaries.iter().all(VariantSummary::completed) => RunStatus::Completed,
            None => RunStatus::Partial,
        };

        Ok(CohortReport {
            run_id,
            cohort_digest,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            status,
            groups,
            variants: summaries,
        })
    }

    /// Run `stage` for the variants at `active` concurrently and wait for all.
    ///
    /// Returns `(index, outcome)` pairs ordered by index.
    async fn run_stage_group(
        &self,
        stage: Stage,
        variants: &[Variant],
        active: &[usize],
    ) -> CohortResult<Vec<(usize, StageOutcome)>> {
        let mut join_set = JoinSet::new();
        for &idx in active {
            let pipeline = self.pipeline.clone();
            let variant = variants[idx].clone();
            join_set.spawn(async move {
                let outcome = pipeline.run_stage(&variant, stage).await;
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<StageOutcome>> = vec![None; variants.len()];
        while let Some(joined) = join_set.join_next().await {
            let (idx, outcome) = joined.map_err(|e| CohortError::TaskJoin {
                stage,
                detail: e.to_string(),
            })?;
            slots[idx] = Some(outcome);
        }

        active
            .iter()
            .map(|&idx| {
                slots[idx]
                    .take()
                    .map(|outcome| (idx, outcome))
                    .ok_or_else(|| CohortError::MissingOutcome {
                        stage,
                        version: variants[idx].version.clone(),
                    })
            })
            .collect()
    }
}
