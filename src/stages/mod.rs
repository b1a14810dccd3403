//! Pipeline stages and pipeline assembly from configuration.

pub mod docs;
pub mod index;
pub mod media;
pub mod scripts;
pub mod styles;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::build::{
    ArtifactRole, Binding, BindingError, BindingTable, BuildContext, GraphError, Pipeline,
    PipelineGraph, PlannerError, TaskError, TaskNode,
};
use crate::tools::Toolchain;

pub use docs::DocStage;
pub use index::IndexStage;
pub use media::MediaStage;
pub use scripts::ScriptStage;
pub use styles::StyleStage;

/// Task names.
pub const STYLES: &str = "styles";
/// Doc generation task.
pub const DOCS: &str = "docs";
/// Script bundling task.
pub const SCRIPTS: &str = "scripts";
/// Media copy task.
pub const MEDIA: &str = "media";
/// Index page task.
pub const INDEX: &str = "index";

/// Problems found while assembling the pipeline; nothing has run yet.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Dependency problems, including cycles
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A role has no naming rule
    #[error(transparent)]
    Planner(#[from] PlannerError),
    /// A binding cannot be declared
    #[error(transparent)]
    Binding(#[from] BindingError),
    /// A watch glob is malformed
    #[error("invalid input pattern '{pattern}': {source}")]
    Pattern {
        /// The pattern
        pattern: String,
        /// Parser error
        #[source]
        source: glob::PatternError,
    },
    /// Directory artifacts cannot carry a content hash
    #[error("the naming rule for '{0}' must not contain [hash]")]
    HashedDirectory(ArtifactRole),
}

/// Build the pipeline for a project.
///
/// Validates at once that every role produced or bound has a naming rule,
/// that bindings are well-formed, and that the task graph is acyclic.
pub fn assemble(ctx: Arc<BuildContext>, tools: &Toolchain) -> Result<Pipeline, SetupError> {
    let config = ctx.config();
    let mut builder = PipelineGraph::builder();
    let mut produced: BTreeSet<ArtifactRole> = BTreeSet::new();
    let mut bindings = BindingTable::new();
    let mut page_styles: Vec<String> = Vec::new();
    let mut page_scripts: Vec<String> = Vec::new();

    if !config.styles.entries.is_empty() {
        let stage = StyleStage::new(ctx.clone(), tools.styles.clone())?;
        produced.extend(crate::build::Stage::produces(&stage));
        builder = builder.add_task(TaskNode::new(STYLES, Arc::new(stage)));
        page_styles = config
            .styles
            .entries
            .iter()
            .filter(|(_, entry)| entry.role() == ArtifactRole::Style)
            .map(|(name, _)| name.clone())
            .collect();
    }

    if config.docs.enabled {
        let stage = DocStage::new(ctx.clone(), tools.docs.clone())?;
        let declared = config
            .docs
            .bindings
            .iter()
            .map(Binding::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        bindings.declare(DOCS, stage.template(), declared)?;
        produced.insert(ArtifactRole::Doc);
        builder = builder.add_task(TaskNode::new(DOCS, Arc::new(stage)));
    }

    if let Some(bundler) = &tools.scripts {
        if !config.scripts.entries.is_empty() {
            let stage = ScriptStage::new(ctx.clone(), bundler.clone())?;
            produced.insert(ArtifactRole::Script);
            builder = builder.add_task(TaskNode::new(SCRIPTS, Arc::new(stage)));
            page_scripts = config.scripts.entries.keys().cloned().collect();
        }
    }

    if let Some(index) = &config.index {
        let stage = IndexStage::new(ctx.clone(), index, &page_styles, &page_scripts)?;
        bindings.declare(INDEX, stage.template(), stage.bindings())?;
        produced.insert(ArtifactRole::Page);
        builder = builder.add_task(TaskNode::new(INDEX, Arc::new(stage)));
    }

    if !config.media.sources.is_empty() {
        produced.insert(ArtifactRole::Media);
        builder = builder.add_task(TaskNode::new(MEDIA, Arc::new(MediaStage::new(ctx.clone()))));
    }

    ctx.planner().ensure_roles(produced.iter().copied().chain(bindings.all_source_roles()))?;

    let graph = builder.with_binding_edges(&bindings).build()?;
    tracing::debug!(tasks = ?graph.names(), "pipeline assembled");

    let protected = vec![ctx.project_root().to_path_buf(), ctx.src_dir()];
    Ok(Pipeline::new(graph, bindings).with_output_dir(ctx.out_dir(), protected))
}

/// Write a file below the output directory, creating parent directories.
pub(crate) async fn write_output(path: &Path, contents: &[u8]) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TaskError::io(format!("creating {}", parent.display()), e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| TaskError::io(format!("writing {}", path.display()), e))
}

/// Logical names use forward slashes.
pub(crate) fn logical_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;
    use crate::config::default_config;
    use crate::tools::{CompiledStyle, DocGenerator, DocRequest, StyleCompiler, StyleRequest};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct NullCompiler;

    #[async_trait]
    impl StyleCompiler for NullCompiler {
        fn name(&self) -> &str {
            "null"
        }

        async fn compile(&self, _request: &StyleRequest) -> Result<CompiledStyle, TaskError> {
            Ok(CompiledStyle::default())
        }
    }

    #[async_trait]
    impl DocGenerator for NullCompiler {
        fn name(&self) -> &str {
            "null"
        }

        async fn generate(&self, _request: &DocRequest) -> Result<Vec<String>, TaskError> {
            Ok(vec![])
        }
    }

    fn tools() -> Toolchain {
        Toolchain { styles: Arc::new(NullCompiler), docs: Arc::new(NullCompiler), scripts: None }
    }

    #[test]
    fn test_default_project_graph() {
        let ctx = BuildContext::new(default_config(), PathBuf::from("/p"), BuildMode::Development).unwrap();
        let pipeline = assemble(Arc::new(ctx), &tools()).unwrap();
        let graph = pipeline.graph();

        assert_eq!(graph.len(), 3);
        assert!(graph.node(DOCS).unwrap().depends_on.contains(STYLES));
        assert!(graph.node(MEDIA).unwrap().depends_on.is_empty());
        assert!(!graph.contains(SCRIPTS));
    }

    #[test]
    fn test_missing_rule_is_fatal() {
        let mut config = default_config();
        config.output.development.insert("style".into(), String::new());
        let ctx = BuildContext::new(config, PathBuf::from("/p"), BuildMode::Development).unwrap();
        let result = assemble(Arc::new(ctx), &tools());
        assert!(matches!(result, Err(SetupError::Planner(PlannerError::UnknownRole(ArtifactRole::Style)))));
    }

    #[test]
    fn test_hashed_doc_rule_rejected() {
        let mut config = default_config();
        config.output.production.insert("doc".into(), "docs-[hash]".into());
        let ctx = BuildContext::new(config, PathBuf::from("/p"), BuildMode::Production).unwrap();
        let result = assemble(Arc::new(ctx), &tools());
        assert!(matches!(result, Err(SetupError::HashedDirectory(ArtifactRole::Doc))));
    }

    #[test]
    fn test_binding_conflict_rejected() {
        let mut config = default_config();
        config.docs.options.insert("herman".into(), serde_json::json!("flat"));
        let ctx = BuildContext::new(config, PathBuf::from("/p"), BuildMode::Development).unwrap();
        let result = assemble(Arc::new(ctx), &tools());
        assert!(matches!(result, Err(SetupError::Binding(BindingError::PathConflict { .. }))));
    }

    #[test]
    fn test_index_page_depends_on_styles() {
        let mut config = default_config();
        config.index = Some(crate::config::IndexConfig::default());
        config.styles.entries.insert(
            "sass_json".into(),
            crate::config::StyleEntry::Detailed {
                path: "json.scss".into(),
                role: ArtifactRole::GeneratedMetadata,
            },
        );
        let ctx = BuildContext::new(config, PathBuf::from("/p"), BuildMode::Development).unwrap();
        let pipeline = assemble(Arc::new(ctx), &tools()).unwrap();

        let node = pipeline.graph().node(INDEX).unwrap();
        assert!(node.depends_on.contains(STYLES));
        assert!(!node.depends_on.contains(DOCS));
        let bound: Vec<String> =
            pipeline.bindings().bindings(INDEX).iter().map(|b| b.config_path.to_string()).collect();
        assert_eq!(bound, vec!["styles.main"]);
    }

    #[test]
    fn test_logical_name_uses_forward_slashes() {
        assert_eq!(logical_name(Path::new("icons/logo.svg")), "icons/logo.svg");
    }
}
