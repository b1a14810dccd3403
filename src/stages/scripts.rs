//! Script bundling stage.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::build::{
    ArtifactRole, BuildContext, EmittedArtifact, InputPattern, RoutingTable, Stage, StageInput,
    StageOutput, TaskError,
};
use crate::stages::{write_output, SetupError};
use crate::tools::ScriptBundler;

/// Bundles each script entry into a staging file, then moves the result to
/// its planned (possibly hashed) name.
pub struct ScriptStage {
    ctx: Arc<BuildContext>,
    bundler: Arc<dyn ScriptBundler>,
    entries: Vec<(String, PathBuf)>,
    inputs: Vec<InputPattern>,
}

impl ScriptStage {
    /// Create the stage for the configured entries.
    pub fn new(ctx: Arc<BuildContext>, bundler: Arc<dyn ScriptBundler>) -> Result<Self, SetupError> {
        let scripts = &ctx.config().scripts;
        let routing = RoutingTable::new();

        let mut entries = Vec::new();
        for (name, path) in &scripts.entries {
            let path = ctx.resolve_path(path);
            if !routing.routes_to(&path, ArtifactRole::Script) {
                tracing::warn!(entry = %name, path = %path.display(), "script entry has no script loader");
            }
            entries.push((name.clone(), path));
        }

        let mut inputs: Vec<InputPattern> =
            entries.iter().map(|(_, path)| InputPattern::file(path)).collect();
        for glob in &scripts.sources {
            let pattern = InputPattern::new(ctx.project_root(), glob)
                .map_err(|source| SetupError::Pattern { pattern: glob.clone(), source })?;
            inputs.push(pattern);
        }

        Ok(Self { ctx, bundler, entries, inputs })
    }
}

#[async_trait]
impl Stage for ScriptStage {
    fn produces(&self) -> Vec<ArtifactRole> {
        vec![ArtifactRole::Script]
    }

    fn declares(&self) -> Vec<(ArtifactRole, String)> {
        self.entries.iter().map(|(name, _)| (ArtifactRole::Script, name.clone())).collect()
    }

    fn inputs(&self) -> Vec<InputPattern> {
        self.inputs.clone()
    }

    async fn run(&self, _input: StageInput) -> Result<StageOutput, TaskError> {
        let staging = tempfile::tempdir()
            .map_err(|e| TaskError::io("creating script staging directory", e))?;
        let mode = self.ctx.mode();

        let mut bundled = Vec::new();
        let mut warnings = Vec::new();
        for (name, entry) in &self.entries {
            let staged = staging.path().join(format!("{}.js", name.replace('/', "_")));
            warnings.extend(self.bundler.bundle(entry, &staged, mode).await?);
            let contents = tokio::fs::read(&staged)
                .await
                .map_err(|e| TaskError::io(format!("reading bundle for '{}'", name), e))?;
            bundled.push((name, contents));
        }

        let mut output = StageOutput { artifacts: Vec::new(), warnings };
        for (name, contents) in bundled {
            let relative = self.ctx.planner().plan(ArtifactRole::Script, name)?.finalize(&contents);
            write_output(&self.ctx.out_dir().join(&relative), &contents).await?;
            output.artifacts.push(EmittedArtifact::new(ArtifactRole::Script, name, relative));
        }
        Ok(output)
    }
}
