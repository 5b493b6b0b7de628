//! Pipeline stage definitions and outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four stages every variant goes through, in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// cmake -S <source> -B <workdir> -DCMAKE_CXX_STANDARD=<version>
    Configure,

    /// cmake --build <workdir> --target <target>
    Build,

    /// <executable> --benchmark_out=<results> --benchmark_out_format=json
    Execute,

    /// results file -> comparison table
    Render,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 4] = [Stage::Configure, Stage::Build, Stage::Execute, Stage::Render];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Build => "build",
            Stage::Execute => "execute",
            Stage::Render => "render",
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Configure => Some(Stage::Build),
            Stage::Build => Some(Stage::Execute),
            Stage::Execute => Some(Stage::Render),
            Stage::Render => None,
        }
    }

    /// This stage followed by every later stage.
    pub fn and_later(self) -> impl Iterator<Item = Stage> {
        Self::ALL.into_iter().filter(move |stage| *stage >= self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one guarded stage for one variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage artifact was already present; nothing was run.
    Skipped,

    /// The stage ran and exited successfully.
    Succeeded,

    /// The stage ran and failed.
    Failed {
        /// Captured error output or spawn error.
        diagnostic: String,
    },
}

impl StageOutcome {
    /// Whether the variant may move on to its next stage.
    pub fn progressed(&self) -> bool {
        !self.is_failed()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Skipped => "skipped",
            StageOutcome::Succeeded => "succeeded",
            StageOutcome::Failed { .. } => "failed",
        }
    }
}
