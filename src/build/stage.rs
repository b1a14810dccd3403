//! The unit of work run by a pipeline task.

use async_trait::async_trait;
use glob::Pattern;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::build::{ArtifactRole, EmittedArtifact, PassId, TaskError};

/// Source files a stage reads, used to map file changes to tasks.
#[derive(Debug, Clone)]
pub struct InputPattern {
    base: PathBuf,
    pattern: Option<Pattern>,
}

impl InputPattern {
    /// Files under `base` matching `glob` (relative to `base`).
    pub fn new(base: impl Into<PathBuf>, glob: &str) -> Result<Self, glob::PatternError> {
        Ok(Self { base: base.into(), pattern: Some(Pattern::new(glob)?) })
    }

    /// Every file under `base`.
    pub fn dir(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into(), pattern: None }
    }

    /// A single file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::dir(path)
    }

    /// Base directory of the pattern.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Whether `path` is covered by this pattern.
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.base) else {
            return false;
        };
        match &self.pattern {
            Some(pattern) => pattern.matches_path(relative),
            None => true,
        }
    }
}

/// What a stage receives when it is started.
#[derive(Debug, Clone)]
pub struct StageInput {
    /// Pass the run belongs to
    pub pass: PassId,
    /// Resolved configuration, for stages with declared bindings
    pub config: Option<Value>,
}

/// What a stage reports on success.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// Artifacts written, with final paths relative to the output directory
    pub artifacts: Vec<EmittedArtifact>,
    /// Non-fatal messages from the tool
    pub warnings: Vec<String>,
}

impl StageOutput {
    /// Output with the given artifacts.
    pub fn with_artifacts(artifacts: Vec<EmittedArtifact>) -> Self {
        Self { artifacts, warnings: Vec::new() }
    }
}

/// A stage of the pipeline: compiles styles, generates docs, bundles scripts...
///
/// A stage must not read any other stage's output directly; anything it needs
/// from another stage arrives through its resolved configuration.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Roles of the artifacts this stage produces.
    fn produces(&self) -> Vec<ArtifactRole>;

    /// Artifacts known before the stage runs, declared pending when it starts.
    fn declares(&self) -> Vec<(ArtifactRole, String)> {
        Vec::new()
    }

    /// Source files this stage reads.
    fn inputs(&self) -> Vec<InputPattern>;

    /// Run the stage once.
    async fn run(&self, input: StageInput) -> Result<StageOutput, TaskError>;
}
