//! Styleguide generation stage.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::build::{
    ArtifactRole, BuildContext, EmittedArtifact, InputPattern, Stage, StageInput, StageOutput,
    TaskError,
};
use crate::stages::{logical_name, SetupError};
use crate::tools::{DocGenerator, DocRequest};

/// Logical name of the generated site.
pub const SITE: &str = "docs";

/// Runs the doc generator over the style sources.
///
/// The generator only ever sees the configuration handed over by the
/// pipeline, with every bound path already filled in.
pub struct DocStage {
    ctx: Arc<BuildContext>,
    generator: Arc<dyn DocGenerator>,
    dest: PathBuf,
    inputs: Vec<InputPattern>,
}

impl DocStage {
    /// Create the stage.
    pub fn new(ctx: Arc<BuildContext>, generator: Arc<dyn DocGenerator>) -> Result<Self, SetupError> {
        let dest = ctx
            .planner()
            .plan(ArtifactRole::Doc, SITE)?
            .stable()
            .ok_or(SetupError::HashedDirectory(ArtifactRole::Doc))?;

        let src = ctx.src_dir();
        let mut inputs = Vec::new();
        for glob in ["**/*.scss", "**/*.sass"] {
            inputs.push(
                InputPattern::new(&src, glob)
                    .map_err(|source| SetupError::Pattern { pattern: glob.to_string(), source })?,
            );
        }

        Ok(Self { ctx, generator, dest, inputs })
    }

    /// Site directory relative to the output directory.
    pub fn dest(&self) -> &std::path::Path {
        &self.dest
    }

    /// The generator configuration before bindings are applied.
    ///
    /// Opaque options are merged at the top level and may not override the
    /// keys set here.
    pub fn template(&self) -> Value {
        let docs = &self.ctx.config().docs;
        let mut config = Map::new();
        for (key, value) in &docs.options {
            config.insert(key.clone(), value.clone());
        }
        config.insert("dest".to_string(), Value::String(logical_name(&self.dest)));
        config.insert("theme".to_string(), Value::String(docs.theme.clone()));
        config.insert("verbose".to_string(), Value::Bool(docs.verbose));
        config.insert("display".to_string(), Value::Object(docs.display.clone()));
        Value::Object(config)
    }
}

#[async_trait]
impl Stage for DocStage {
    fn produces(&self) -> Vec<ArtifactRole> {
        vec![ArtifactRole::Doc]
    }

    fn declares(&self) -> Vec<(ArtifactRole, String)> {
        vec![(ArtifactRole::Doc, SITE.to_string())]
    }

    fn inputs(&self) -> Vec<InputPattern> {
        self.inputs.clone()
    }

    async fn run(&self, input: StageInput) -> Result<StageOutput, TaskError> {
        let out = self.ctx.out_dir();
        tokio::fs::create_dir_all(&out)
            .await
            .map_err(|e| TaskError::io(format!("creating {}", out.display()), e))?;

        let request = DocRequest {
            src_dir: self.ctx.src_dir(),
            working_dir: out,
            config: input.config.unwrap_or_else(|| self.template()),
        };
        let warnings = self.generator.generate(&request).await?;

        let mut output = StageOutput::with_artifacts(vec![EmittedArtifact::new(
            ArtifactRole::Doc,
            SITE,
            self.dest.clone(),
        )]);
        output.warnings = warnings;
        Ok(output)
    }
}
