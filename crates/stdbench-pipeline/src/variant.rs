//! Variants and cohort identity.

use crate::error::{CohortError, CohortResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One pipeline run target: a standard version built in its own directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variant {
    /// Language standard version label ("17", "20", ...).
    pub version: String,

    /// Build tree owned by this variant for the duration of the run.
    pub workdir: PathBuf,

    /// Compiler handed to the build-system driver.
    pub compiler: PathBuf,
}

/// The set of variants of one invocation.
///
/// Every variant shares the same compiler; working directories and
/// versions are unique across the cohort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CohortSpec {
    variants: Vec<Variant>,
    compiler: PathBuf,
}

impl CohortSpec {
    /// Create a cohort from `(version, workdir)` pairs and one compiler path.
    pub fn new<I, V, W>(pairs: I, compiler: impl Into<PathBuf>) -> CohortResult<Self>
    where
        I: IntoIterator<Item = (V, W)>,
        V: Into<String>,
        W: Into<PathBuf>,
    {
        let compiler = compiler.into();
        let mut versions = HashSet::new();
        let mut workdirs = HashSet::new();
        let mut variants = Vec::new();

        for (version, workdir) in pairs {
            let version = version.into();
            let workdir = workdir.into();
            if !versions.insert(version.clone()) {
                return Err(CohortError::DuplicateVersion { version });
            }
            if !workdirs.insert(workdir.clone()) {
                return Err(CohortError::DuplicateWorkdir { path: workdir });
            }
            variants.push(Variant {
                version,
                workdir,
                compiler: compiler.clone(),
            });
        }

        if variants.is_empty() {
            return Err(CohortError::EmptyCohort);
        }

        Ok(Self { variants, compiler })
    }

    /// Create a cohort using the `build-<version>` directory convention.
    pub fn standard<S: AsRef<str>>(
        versions: &[S],
        root: &Path,
        compiler: impl Into<PathBuf>,
    ) -> CohortResult<Self> {
        Self::new(
            versions.iter().map(|v| {
                let v = v.as_ref();
                (v.to_string(), root.join(format!("build-{v}")))
            }),
            compiler,
        )
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn compiler(&self) -> &Path {
        &self.compiler
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Deterministic digest of the ordered variants and the compiler.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for variant in &self.variants {
            hasher.update(variant.version.as_bytes());
            hasher.update(b"\0");
            hasher.update(variant.workdir.to_string_lossy().as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(self.compiler.to_string_lossy().as_bytes());
        hex::encode(hasher.finalize())
    }
}
