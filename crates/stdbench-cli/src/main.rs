//! stdbench - build and benchmark one CMake tree per C++ standard
//!
//! `stdbench /usr/bin/clang++` configures, builds and runs the benchmark
//! target once per standard version, writes a comparison table for each
//! standard and then removes the `build-<version>` trees.
//!
//! Exit status: 0 when every standard completed, 1 when every standard
//! failed the same stage, 2 when only some standards completed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use stdbench_pipeline::{
    init_tracing, BenchStageExecutor, CohortOrchestrator, CohortReport, CohortSpec, FsRemover,
    PipelineConfig, ProcessRunner, ResilientCleanup, RetryPolicy, TableRenderer,
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "stdbench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and benchmark one CMake tree per C++ standard", long_about = None)]
struct Cli {
    /// Compiler passed to CMake as CMAKE_CXX_COMPILER
    compiler: PathBuf,

    /// Standard versions to build, comma separated or repeated
    #[arg(
        long = "std",
        value_name = "VERSION",
        value_delimiter = ',',
        default_values = ["17", "20"],
        env = "STDBENCH_STANDARDS"
    )]
    standards: Vec<String>,

    /// CMake source directory
    #[arg(long, default_value = ".", env = "STDBENCH_SOURCE_DIR")]
    source_dir: PathBuf,

    /// Directory receiving the build-<version> working directories
    #[arg(long, default_value = ".", env = "STDBENCH_BUILD_ROOT")]
    build_root: PathBuf,

    /// Directory receiving the rendered comparison tables
    #[arg(long, default_value = ".", env = "STDBENCH_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Benchmark CMake target
    #[arg(long, default_value = "benchmarks-iterators", env = "STDBENCH_TARGET")]
    target: String,

    /// Build-tree subdirectory the target is emitted into
    #[arg(long, default_value = "bench", env = "STDBENCH_TARGET_SUBDIR")]
    target_subdir: PathBuf,

    /// Seconds to wait before retrying a failed working-directory removal
    #[arg(long, default_value_t = 3, env = "STDBENCH_CLEANUP_DELAY_SECS")]
    cleanup_delay_secs: u64,

    /// Keep build-<version> directories after rendering
    #[arg(long, env = "STDBENCH_KEEP_WORKDIRS")]
    keep_workdirs: bool,

    /// Write the run report as JSON to this path
    #[arg(long, env = "STDBENCH_REPORT")]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, env = "STDBENCH_VERBOSE")]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "STDBENCH_JSON")]
    json: bool,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            source_dir: self.source_dir.clone(),
            output_dir: self.output_dir.clone(),
            target: self.target.clone(),
            target_subdir: self.target_subdir.clone(),
            cleanup: RetryPolicy {
                delay_ms: self.cleanup_delay_secs.saturating_mul(1_000),
                ..RetryPolicy::default()
            },
            keep_workdirs: self.keep_workdirs,
            ..PipelineConfig::default()
        }
    }

    fn cohort(&self) -> Result<CohortSpec> {
        CohortSpec::standard(self.standards.as_slice(), &self.build_root, self.compiler.clone())
            .context("invalid standard list")
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let cohort = cli.cohort()?;
    let report = run(cli.pipeline_config(), &cohort).await?;
    report.log_summary();

    if let Some(path) = &cli.report {
        write_report(&report, path)?;
        info!(path = %path.display(), "run report written");
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}

async fn run(config: PipelineConfig, cohort: &CohortSpec) -> Result<CohortReport> {
    let cleanup = ResilientCleanup::new(Arc::new(FsRemover), config.cleanup.clone());
    let keep_workdirs = config.keep_workdirs;
    let executor = Arc::new(BenchStageExecutor::new(
        config,
        Arc::new(ProcessRunner),
        Arc::new(TableRenderer),
    ));

    let mut orchestrator = CohortOrchestrator::new(executor, cleanup);
    if keep_workdirs {
        orchestrator = orchestrator.keep_workdirs();
    }
    orchestrator.run(cohort).await.context("cohort run failed")
}

fn write_report(report: &CohortReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_every_option_has_env_fallback() {
        let cmd = Cli::command();
        for arg in cmd.get_arguments().filter(|a| !a.is_positional()) {
            let id = arg.get_id().as_str();
            if id == "help" || id == "version" {
                continue;
            }
            let env = arg
                .get_env()
                .unwrap_or_else(|| panic!("--{id} has no environment variable"));
            assert!(env.to_string_lossy().starts_with("STDBENCH_"));
        }
    }

    #[test]
    fn test_env_fallback_values() {
        std::env::set_var("STDBENCH_TARGET_SUBDIR", "bin");
        std::env::set_var("STDBENCH_REPORT", "/tmp/stdbench-report.json");
        let cli = Cli::try_parse_from(["stdbench", "g++"]).unwrap();
        std::env::remove_var("STDBENCH_TARGET_SUBDIR");
        std::env::remove_var("STDBENCH_REPORT");

        assert_eq!(cli.target_subdir, PathBuf::from("bin"));
        assert_eq!(cli.report, Some(PathBuf::from("/tmp/stdbench-report.json")));
    }

    #[test]
    fn test_compiler_is_the_only_required_argument() {
        let cli = Cli::try_parse_from(["stdbench", "/usr/bin/clang++"]).unwrap();
        assert_eq!(cli.compiler, PathBuf::from("/usr/bin/clang++"));
        assert_eq!(cli.standards, vec!["17".to_string(), "20".to_string()]);
        assert!(!cli.keep_workdirs);

        assert!(Cli::try_parse_from(["stdbench"]).is_err());
    }

    #[test]
    fn test_standards_and_build_root() {
        let cli = Cli::try_parse_from([
            "stdbench",
            "g++",
            "--std",
            "14,17",
            "--std",
            "23",
            "--build-root",
            "/tmp/bench",
        ])
        .unwrap();

        let cohort = cli.cohort().unwrap();
        let versions: Vec<_> = cohort.variants().iter().map(|v| v.version.as_str()).collect();
        assert_eq!(versions, vec!["14", "17", "23"]);
        assert_eq!(
            cohort.variants()[2].workdir,
            PathBuf::from("/tmp/bench/build-23")
        );
        assert_eq!(cohort.compiler(), Path::new("g++"));
    }

    #[test]
    fn test_duplicate_standard_rejected() {
        let cli = Cli::try_parse_from(["stdbench", "g++", "--std", "17,17"]).unwrap();
        assert!(cli.cohort().is_err());
    }

    #[test]
    fn test_pipeline_config_from_flags() {
        let cli = Cli::try_parse_from([
            "stdbench",
            "clang++",
            "--cleanup-delay-secs",
            "5",
            "--target",
            "bench-all",
            "--keep-workdirs",
        ])
        .unwrap();

        let config = cli.pipeline_config();
        assert_eq!(config.cleanup.delay_ms, 5_000);
        assert_eq!(config.cleanup.max_attempts, 2);
        assert_eq!(config.target, "bench-all");
        assert!(config.keep_workdirs);
        assert_eq!(config.cmake, "cmake");
    }

    #[tokio::test]
    async fn test_write_report_produces_json() {
        let dir = tempfile::tempdir().unwrap();
        let cohort = CohortSpec::standard(&["17"], dir.path(), "c++").unwrap();
        let config = PipelineConfig {
            source_dir: dir.path().to_path_buf(),
            output_dir: dir.path().to_path_buf(),
            cmake: "/nonexistent-cmake-binary".to_string(),
            ..PipelineConfig::default()
        };

        let report = run(config, &cohort).await.unwrap();
        assert_eq!(report.exit_code(), 1);

        let path = dir.path().join("report.json");
        write_report(&report, &path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["status"]["status"], "stalled");
        assert_eq!(json["variants"][0]["version"], "17");
    }
}
