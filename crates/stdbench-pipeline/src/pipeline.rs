//! Per-variant stage sequencing.

use crate::config::PipelineConfig;
use crate::guard::StageGuard;
use crate::render::Renderer;
use crate::runner::{Invocation, StageRunner};
use crate::stage::{Stage, StageOutcome};
use crate::variant::Variant;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

/// Concrete action and artifact location of each stage.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// File whose presence marks `stage` complete for `variant`.
    fn artifact(&self, variant: &Variant, stage: Stage) -> PathBuf;

    /// Perform `stage` for `variant`.
    async fn execute(&self, variant: &Variant, stage: Stage) -> anyhow::Result<()>;
}

/// CMake + Google Benchmark implementation of [`StageExecutor`].
pub struct BenchStageExecutor {
    config: PipelineConfig,
    runner: Arc<dyn StageRunner>,
    renderer: Arc<dyn Renderer>,
}

impl BenchStageExecutor {
    pub fn new(
        config: PipelineConfig,
        runner: Arc<dyn StageRunner>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            config,
            runner,
            renderer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn executable(&self, variant: &Variant) -> PathBuf {
        let name = format!("{}{}", self.config.target, std::env::consts::EXE_SUFFIX);
        variant.workdir.join(&self.config.target_subdir).join(name)
    }

    fn results_file(&self, variant: &Variant) -> PathBuf {
        variant.workdir.join(results_name(variant))
    }

    fn rendered_file(&self, variant: &Variant) -> PathBuf {
        self.config
            .output_dir
            .join(format!("benchmarks-{}.md", variant.version))
    }

    /// Process invocation for `stage`; `None` for [`Stage::Render`], which
    /// runs in-process through the renderer.
    ///
    /// The benchmark runs with the working directory as its cwd, so its
    /// program path is made absolute and its output file is named relative
    /// to that directory.
    pub fn invocation(
        &self,
        variant: &Variant,
        stage: Stage,
    ) -> anyhow::Result<Option<Invocation>> {
        let cfg = &self.config;
        let invocation = match stage {
            Stage::Configure => Some(Invocation::new(&cfg.cmake).args([
                "-S".to_string(),
                cfg.source_dir.display().to_string(),
                "-B".to_string(),
                variant.workdir.display().to_string(),
                format!("-DCMAKE_CXX_STANDARD={}", variant.version),
                format!("-DCMAKE_CXX_COMPILER={}", variant.compiler.display()),
                format!("-DCMAKE_BUILD_TYPE={}", cfg.build_type),
            ])),
            Stage::Build => Some(Invocation::new(&cfg.cmake).args([
                "--build".to_string(),
                variant.workdir.display().to_string(),
                "--target".to_string(),
                cfg.target.clone(),
                "--config".to_string(),
                cfg.build_type.clone(),
            ])),
            Stage::Execute => {
                let program = absolute(self.executable(variant))?;
                Some(
                    Invocation::new(program.display().to_string())
                        .args([
                            format!("--benchmark_out={}", results_name(variant)),
                            "--benchmark_out_format=json".to_string(),
                        ])
                        .current_dir(&variant.workdir),
                )
            }
            Stage::Render => None,
        };
        Ok(invocation)
    }
}

fn results_name(variant: &Variant) -> String {
    format!("benchmark-{}.json", variant.version)
}

fn absolute(path: PathBuf) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("failed to resolve the current directory")?;
    Ok(cwd.join(path))
}

#[async_trait]
impl StageExecutor for BenchStageExecutor {
    fn artifact(&self, variant: &Variant, stage: Stage) -> PathBuf {
        match stage {
            Stage::Configure => variant.workdir.join("CMakeCache.txt"),
            Stage::Build => self.executable(variant),
            Stage::Execute => self.results_file(variant),
            Stage::Render => self.rendered_file(variant),
        }
    }

    async fn execute(&self, variant: &Variant, stage: Stage) -> anyhow::Result<()> {
        let Some(invocation) = self.invocation(variant, stage)? else {
            return self
                .renderer
                .render(
                    &self.results_file(variant),
                    &variant.version,
                    &self.rendered_file(variant),
                )
                .await
                .with_context(|| format!("render failed for C++{}", variant.version));
        };

        info!(command = %invocation, "running");
        let report = self.runner.run(&invocation).await?;
        if !report.success {
            anyhow::bail!("`{}` {}", invocation.program, report.diagnostic());
        }
        Ok(())
    }
}

/// Progress of one variant through the stages, in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantProgress {
    pub version: String,
    pub outcomes: Vec<(Stage, StageOutcome)>,
}

impl VariantProgress {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        self.outcomes.push((stage, outcome));
    }

    /// Last stage reached and its outcome.
    pub fn terminal(&self) -> Option<(Stage, &StageOutcome)> {
        self.outcomes.last().map(|(stage, outcome)| (*stage, outcome))
    }

    /// Whether the variant may attempt another stage.
    pub fn is_active(&self) -> bool {
        self.terminal().map_or(true, |(_, outcome)| outcome.progressed())
    }

    /// Whether all four stages ended Succeeded or Skipped.
    pub fn completed(&self) -> bool {
        matches!(self.terminal(), Some((Stage::Render, outcome)) if outcome.progressed())
    }

    /// Outcome recorded for `stage`, if it was attempted.
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| outcome)
    }
}

/// Runs guarded stages for single variants.
#[derive(Clone)]
pub struct VariantPipeline {
    executor: Arc<dyn StageExecutor>,
}

impl VariantPipeline {
    pub fn new(executor: Arc<dyn StageExecutor>) -> Self {
        Self { executor }
    }

    /// Guard that skips `stage` when it or any later stage left an artifact.
    pub fn guard(&self, variant: &Variant, stage: Stage) -> StageGuard {
        StageGuard::any_of(
            stage
                .and_later()
                .map(|later| self.executor.artifact(variant, later)),
        )
    }

    /// Run one guarded stage for `variant`.
    pub async fn run_stage(&self, variant: &Variant, stage: Stage) -> StageOutcome {
        let span = info_span!("stage", variant = %variant.version, stage = %stage);
        async {
            let outcome = self
                .guard(variant, stage)
                .run(|| self.executor.execute(variant, stage))
                .await;
            info!(outcome = outcome.label(), "stage finished");
            outcome
        }
        .instrument(span)
        .await
    }

    /// Run all stages for `variant`, stopping at the first failure.
    pub async fn run(&self, variant: &Variant) -> VariantProgress {
        let mut progress = VariantProgress::new(&variant.version);
        for stage in Stage::ALL {
            let outcome = self.run_stage(variant, stage).await;
            let failed = outcome.is_failed();
            progress.record(stage, outcome);
            if failed {
                break;
            }
        }
        progress
    }
}
