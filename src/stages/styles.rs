//! Stylesheet compile stage.
//!
//! Compiles every configured entry, then writes each stylesheet to its planned
//! path with a source map next to it. Entries are all compiled before anything
//! is written, so a compile error leaves no partial output behind.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::Arc;

use crate::build::{
    ArtifactRole, BuildContext, EmittedArtifact, InputPattern, Stage, StageInput, StageOutput,
    TaskError,
};
use crate::stages::{write_output, SetupError};
use crate::tools::{CompiledStyle, StyleCompiler, StyleRequest};

const SOURCE_GLOBS: [&str; 3] = ["**/*.scss", "**/*.sass", "**/*.css"];

/// One entry to compile.
#[derive(Debug, Clone)]
struct Entry {
    name: String,
    role: ArtifactRole,
    path: PathBuf,
}

/// Compiles style and generated-metadata entries.
pub struct StyleStage {
    ctx: Arc<BuildContext>,
    compiler: Arc<dyn StyleCompiler>,
    entries: Vec<Entry>,
    inputs: Vec<InputPattern>,
}

impl StyleStage {
    /// Create the stage for the configured entries.
    pub fn new(ctx: Arc<BuildContext>, compiler: Arc<dyn StyleCompiler>) -> Result<Self, SetupError> {
        let src = ctx.src_dir();
        let entries = ctx
            .config()
            .styles
            .entries
            .iter()
            .map(|(name, entry)| Entry {
                name: name.clone(),
                role: entry.role(),
                path: src.join(entry.path()),
            })
            .collect();

        let mut inputs = Vec::new();
        for glob in SOURCE_GLOBS {
            let pattern = InputPattern::new(&src, glob)
                .map_err(|source| SetupError::Pattern { pattern: glob.to_string(), source })?;
            inputs.push(pattern);
        }
        for load_path in &ctx.config().styles.load_paths {
            inputs.push(InputPattern::dir(ctx.resolve_path(load_path)));
        }

        Ok(Self { ctx, compiler, entries, inputs })
    }

    fn request(&self, entry: &Entry) -> StyleRequest {
        let styles = &self.ctx.config().styles;
        let mut load_paths = vec![self.ctx.src_dir()];
        load_paths.extend(styles.load_paths.iter().map(|p| self.ctx.resolve_path(p)));
        StyleRequest { entry: entry.path.clone(), load_paths, output_style: styles.output_style }
    }

    async fn write(&self, entry: &Entry, compiled: CompiledStyle) -> Result<EmittedArtifact, TaskError> {
        let planned = self.ctx.planner().plan(entry.role, &entry.name)?;
        let relative = planned.finalize(compiled.css.as_bytes());
        let target = self.ctx.out_dir().join(&relative);

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.name.clone());
        let map_name = format!("{}.map", file_name);

        let mut css = compiled.css;
        if compiled.source_map.is_some() {
            css.push_str(&format!("\n/*# sourceMappingURL={} */\n", map_name));
        }
        write_output(&target, css.as_bytes()).await?;

        if let Some(map) = compiled.source_map {
            let map = retarget_source_map(&map, &file_name);
            write_output(&target.with_file_name(&map_name), map.as_bytes()).await?;
        }

        tracing::debug!(entry = %entry.name, path = %relative.display(), "stylesheet written");
        Ok(EmittedArtifact::new(entry.role, &entry.name, relative))
    }
}

/// Point a source map's `file` at the final stylesheet name.
fn retarget_source_map(map: &str, file_name: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(map) {
        Ok(mut value) if value.is_object() => {
            value["file"] = serde_json::Value::String(file_name.to_string());
            value.to_string()
        }
        _ => map.to_string(),
    }
}

#[async_trait]
impl Stage for StyleStage {
    fn produces(&self) -> Vec<ArtifactRole> {
        let mut roles: Vec<ArtifactRole> = self.entries.iter().map(|e| e.role).collect();
        roles.sort();
        roles.dedup();
        roles
    }

    fn declares(&self) -> Vec<(ArtifactRole, String)> {
        self.entries.iter().map(|e| (e.role, e.name.clone())).collect()
    }

    fn inputs(&self) -> Vec<InputPattern> {
        self.inputs.clone()
    }

    async fn run(&self, _input: StageInput) -> Result<StageOutput, TaskError> {
        let compiled = try_join_all(self.entries.iter().map(|entry| {
            let request = self.request(entry);
            async move { self.compiler.compile(&request).await }
        }))
        .await?;

        let mut output = StageOutput::default();
        for (entry, compiled) in self.entries.iter().zip(compiled) {
            output.warnings.extend(compiled.warnings.iter().cloned());
            output.artifacts.push(self.write(entry, compiled).await?);
        }
        Ok(output)
    }
}
