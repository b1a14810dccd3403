//! External collaborators: stylesheet compiler, doc generator, script bundler.
//!
//! Stages only talk to tools through the traits here, so tests can swap in
//! fakes without touching the pipeline.

pub mod bundler;
pub mod lightning;
pub mod process;
pub mod sass;
pub mod sassdoc;

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build::{BuildMode, TaskError};
use crate::config::{CompilerKind, OutputStyle, StylebookConfig};

pub use bundler::CommandBundler;
pub use lightning::LightningCompiler;
pub use process::{ToolCommand, ToolOutput};
pub use sass::SassCompiler;
pub use sassdoc::SassdocGenerator;

/// One stylesheet compile.
#[derive(Debug, Clone)]
pub struct StyleRequest {
    /// Absolute path of the entry file
    pub entry: PathBuf,
    /// Directories searched for imports
    pub load_paths: Vec<PathBuf>,
    /// Compression level
    pub output_style: OutputStyle,
}

/// Compiler output for one entry.
#[derive(Debug, Clone, Default)]
pub struct CompiledStyle {
    /// CSS without any `sourceMappingURL` comment
    pub css: String,
    /// Source map JSON
    pub source_map: Option<String>,
    /// Compiler warnings
    pub warnings: Vec<String>,
}

/// A stylesheet compiler.
#[async_trait]
pub trait StyleCompiler: Send + Sync {
    /// Tool name for error messages.
    fn name(&self) -> &str;

    /// Compile one entry. Malformed input is a [`crate::build::CompileError`].
    async fn compile(&self, request: &StyleRequest) -> Result<CompiledStyle, TaskError>;
}

/// One documentation run.
#[derive(Debug, Clone)]
pub struct DocRequest {
    /// Annotated source tree
    pub src_dir: PathBuf,
    /// Working directory; output-relative paths in the config resolve against it
    pub working_dir: PathBuf,
    /// Fully resolved generator configuration
    pub config: Value,
}

/// A documentation generator.
#[async_trait]
pub trait DocGenerator: Send + Sync {
    /// Tool name for error messages.
    fn name(&self) -> &str;

    /// Generate the site, returning warnings.
    async fn generate(&self, request: &DocRequest) -> Result<Vec<String>, TaskError>;
}

/// A script bundler.
#[async_trait]
pub trait ScriptBundler: Send + Sync {
    /// Tool name for error messages.
    fn name(&self) -> &str;

    /// Bundle `entry` into the file `output`, returning warnings.
    async fn bundle(&self, entry: &Path, output: &Path, mode: BuildMode) -> Result<Vec<String>, TaskError>;
}

/// Chooses lightningcss for plain `.css` entries and sass for everything else.
pub struct AutoCompiler {
    sass: SassCompiler,
    css: LightningCompiler,
}

impl AutoCompiler {
    /// Combine two compilers.
    pub fn new(sass: SassCompiler, css: LightningCompiler) -> Self {
        Self { sass, css }
    }
}

#[async_trait]
impl StyleCompiler for AutoCompiler {
    fn name(&self) -> &str {
        "auto"
    }

    async fn compile(&self, request: &StyleRequest) -> Result<CompiledStyle, TaskError> {
        if request.entry.extension().is_some_and(|e| e == "css") {
            self.css.compile(request).await
        } else {
            self.sass.compile(request).await
        }
    }
}

/// The tools a pipeline runs with.
#[derive(Clone)]
pub struct Toolchain {
    /// Stylesheet compiler
    pub styles: Arc<dyn StyleCompiler>,
    /// Documentation generator
    pub docs: Arc<dyn DocGenerator>,
    /// Script bundler, when configured
    pub scripts: Option<Arc<dyn ScriptBundler>>,
}

impl Toolchain {
    /// The real tools selected by the configuration.
    pub fn from_config(config: &StylebookConfig) -> Self {
        let sass = SassCompiler::new(&config.styles.sass_binary);
        let styles: Arc<dyn StyleCompiler> = match config.styles.compiler {
            CompilerKind::Sass => Arc::new(sass),
            CompilerKind::Lightningcss => Arc::new(LightningCompiler::new()),
            CompilerKind::Auto => Arc::new(AutoCompiler::new(sass, LightningCompiler::new())),
        };
        let scripts: Option<Arc<dyn ScriptBundler>> = if config.scripts.is_enabled() {
            Some(Arc::new(CommandBundler::new(
                config.scripts.command.clone(),
                config.scripts.production_args.clone(),
            )))
        } else {
            None
        };
        Self { styles, docs: Arc::new(SassdocGenerator::new(&config.docs.generator)), scripts }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain")
            .field("styles", &self.styles.name())
            .field("docs", &self.docs.name())
            .field("scripts", &self.scripts.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    #[test]
    fn test_toolchain_from_config() {
        let mut config = default_config();
        let tools = Toolchain::from_config(&config);
        assert_eq!(tools.styles.name(), "auto");
        assert_eq!(tools.docs.name(), "sassdoc");
        assert!(tools.scripts.is_none());

        config.styles.compiler = CompilerKind::Sass;
        config.scripts.command = vec!["esbuild".into(), "{entry}".into(), "--outfile={output}".into()];
        config.scripts.entries.insert("app".into(), PathBuf::from("src/app.js"));
        let tools = Toolchain::from_config(&config);
        assert_eq!(tools.styles.name(), "sass");
        assert!(tools.scripts.is_some());
    }

    #[tokio::test]
    async fn test_auto_compiler_routes_css_to_lightningcss() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("plain.css");
        std::fs::write(&entry, "a { color: #ff0000; }").unwrap();

        let auto = AutoCompiler::new(
            SassCompiler::new("definitely-not-a-real-sass-3f9a"),
            LightningCompiler::new(),
        );
        let request = StyleRequest {
            entry,
            load_paths: vec![],
            output_style: OutputStyle::Compressed,
        };
        let compiled = auto.compile(&request).await.unwrap();
        assert_eq!(compiled.css, "a{color:red}");

        let scss = StyleRequest { entry: dir.path().join("main.scss"), ..request };
        let err = auto.compile(&scss).await.unwrap_err();
        assert_eq!(err.kind(), "ToolError");
    }
}
