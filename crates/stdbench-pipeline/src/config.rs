//! Pipeline configuration shared by every variant of a run.

use crate::cleanup::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for the configure/build/execute/render actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// CMake source directory (holds the top-level CMakeLists.txt).
    pub source_dir: PathBuf,

    /// Directory receiving rendered comparison tables.
    pub output_dir: PathBuf,

    /// CMake target of the benchmark executable.
    pub target: String,

    /// Subdirectory of the build tree the target is emitted into.
    pub target_subdir: PathBuf,

    /// CMAKE_BUILD_TYPE / --config value.
    pub build_type: String,

    /// Build-system driver program.
    pub cmake: String,

    /// Retry policy for working-directory removal.
    pub cleanup: RetryPolicy,

    /// Leave working directories in place after rendering.
    pub keep_workdirs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            target: "benchmarks-iterators".to_string(),
            target_subdir: PathBuf::from("bench"),
            build_type: "Release".to_string(),
            cmake: "cmake".to_string(),
            cleanup: RetryPolicy::default(),
            keep_workdirs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.target, "benchmarks-iterators");
        assert_eq!(cfg.build_type, "Release");
        assert_eq!(cfg.cleanup.max_attempts, 2);
        assert!(!cfg.keep_workdirs);
    }
}
