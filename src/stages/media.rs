//! Media copy stage: fonts and images.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build::{
    ArtifactRole, BuildContext, EmittedArtifact, InputPattern, RoutingTable, Stage, StageInput,
    StageOutput, TaskError,
};
use crate::stages::{logical_name, write_output};

/// Copies every file routed to a media loader into the media subtree.
pub struct MediaStage {
    ctx: Arc<BuildContext>,
    routing: RoutingTable,
    sources: Vec<PathBuf>,
}

impl MediaStage {
    /// Create the stage for the configured source directories.
    pub fn new(ctx: Arc<BuildContext>) -> Self {
        let sources = ctx.config().media.sources.iter().map(|p| ctx.resolve_path(p)).collect();
        Self { ctx, routing: RoutingTable::new(), sources }
    }

    /// Media files under `dir`, with their logical names.
    fn collect(&self, dir: &Path) -> Vec<(String, PathBuf)> {
        let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
        let Ok(paths) = glob::glob(&pattern) else {
            return Vec::new();
        };

        let mut files: Vec<(String, PathBuf)> = paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file() && self.routing.routes_to(p, ArtifactRole::Media))
            .filter_map(|p| {
                let name = logical_name(p.strip_prefix(dir).ok()?);
                Some((name, p))
            })
            .collect();
        files.sort();
        files
    }
}

#[async_trait]
impl Stage for MediaStage {
    fn produces(&self) -> Vec<ArtifactRole> {
        vec![ArtifactRole::Media]
    }

    fn inputs(&self) -> Vec<InputPattern> {
        self.sources.iter().map(InputPattern::dir).collect()
    }

    async fn run(&self, _input: StageInput) -> Result<StageOutput, TaskError> {
        let mut output = StageOutput::default();
        for dir in &self.sources {
            if !dir.is_dir() {
                tracing::debug!(path = %dir.display(), "media source missing, skipped");
                continue;
            }
            for (name, path) in self.collect(dir) {
                let contents = tokio::fs::read(&path)
                    .await
                    .map_err(|e| TaskError::io(format!("reading {}", path.display()), e))?;
                let relative = self.ctx.planner().plan(ArtifactRole::Media, &name)?.finalize(&contents);
                write_output(&self.ctx.out_dir().join(&relative), &contents).await?;
                output.artifacts.push(EmittedArtifact::new(ArtifactRole::Media, name, relative));
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;
    use crate::config::default_config;

    #[tokio::test]
    async fn test_copies_routed_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("fonts")).unwrap();
        std::fs::create_dir_all(dir.path().join("images/icons")).unwrap();
        std::fs::write(dir.path().join("fonts/body.woff2"), b"\0font").unwrap();
        std::fs::write(dir.path().join("fonts/LICENSE.txt"), b"MIT").unwrap();
        std::fs::write(dir.path().join("images/icons/logo.svg"), b"<svg/>").unwrap();

        let ctx = BuildContext::new(default_config(), dir.path().to_path_buf(), BuildMode::Development)
            .unwrap();
        let stage = MediaStage::new(Arc::new(ctx));
        let output = stage.run(StageInput { pass: 1, config: None }).await.unwrap();

        let paths: Vec<_> = output.artifacts.iter().map(|a| a.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("media/body.woff2"), PathBuf::from("media/icons/logo.svg")]);
        assert!(dir.path().join("dist/media/icons/logo.svg").exists());
        assert!(!dir.path().join("dist/media/LICENSE.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_sources_are_fine() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BuildContext::new(default_config(), dir.path().to_path_buf(), BuildMode::Production)
            .unwrap();
        let output = MediaStage::new(Arc::new(ctx)).run(StageInput { pass: 1, config: None }).await.unwrap();
        assert!(output.artifacts.is_empty());
    }
}
