//! Configuration schema types for `stylebook.toml`
//!
//! Defines the structure and validation rules for a stylebook project.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::build::ArtifactRole;

/// Compression level passed to the stylesheet compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// Minified output
    #[default]
    Compressed,
    /// Human-readable output
    Expanded,
}

impl std::fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStyle::Compressed => write!(f, "compressed"),
            OutputStyle::Expanded => write!(f, "expanded"),
        }
    }
}

/// Which stylesheet compiler handles style entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompilerKind {
    /// `lightningcss` for `.css` entries, the `sass` binary for everything else
    #[default]
    Auto,
    /// Always the external `sass` binary
    Sass,
    /// Always the in-process lightningcss compiler
    Lightningcss,
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Stylesheet source tree
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Build output directory
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

fn default_src() -> PathBuf {
    PathBuf::from("sass")
}

fn default_out() -> PathBuf {
    PathBuf::from("dist")
}

/// A style entry: either a bare path or a table with an explicit role.
///
/// ```toml
/// [styles.entries]
/// main = "main.scss"
/// sass_json = { path = "json.scss", role = "generated-metadata" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleEntry {
    /// Path relative to the source tree, emitted as a style artifact
    Path(PathBuf),
    /// Path with an explicit artifact role
    Detailed {
        /// Path relative to the source tree
        path: PathBuf,
        /// Role of the emitted artifact
        #[serde(default = "default_style_role")]
        role: ArtifactRole,
    },
}

fn default_style_role() -> ArtifactRole {
    ArtifactRole::Style
}

impl StyleEntry {
    /// Entry path relative to the source tree.
    pub fn path(&self) -> &Path {
        match self {
            StyleEntry::Path(path) => path,
            StyleEntry::Detailed { path, .. } => path,
        }
    }

    /// Role of the artifact this entry produces.
    pub fn role(&self) -> ArtifactRole {
        match self {
            StyleEntry::Path(_) => ArtifactRole::Style,
            StyleEntry::Detailed { role, .. } => *role,
        }
    }
}

/// Stylesheet compile settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Compiler selection
    #[serde(default)]
    pub compiler: CompilerKind,
    /// Output compression level
    #[serde(default)]
    pub output_style: OutputStyle,
    /// Name or path of the `sass` executable
    #[serde(default = "default_sass_binary")]
    pub sass_binary: String,
    /// Extra load paths handed to the compiler
    #[serde(default)]
    pub load_paths: Vec<PathBuf>,
    /// Entry points keyed by logical name
    #[serde(default = "default_style_entries")]
    pub entries: BTreeMap<String, StyleEntry>,
}

fn default_sass_binary() -> String {
    "sass".to_string()
}

fn default_style_entries() -> BTreeMap<String, StyleEntry> {
    let mut entries = BTreeMap::new();
    entries.insert("main".to_string(), StyleEntry::Path(PathBuf::from("main.scss")));
    entries
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            compiler: CompilerKind::default(),
            output_style: OutputStyle::default(),
            sass_binary: default_sass_binary(),
            load_paths: vec![],
            entries: default_style_entries(),
        }
    }
}

/// A declared late-bound field of the documentation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Role of the artifact whose final path is written
    pub role: ArtifactRole,
    /// Logical name of the artifact, when the role has several
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Dotted path into the generator configuration
    pub path: String,
}

/// Documentation generator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    /// Generate documentation as part of the pipeline
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Name or path of the generator executable
    #[serde(default = "default_generator")]
    pub generator: String,
    /// Generator theme
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Verbose generator output
    #[serde(default = "default_true")]
    pub verbose: bool,
    /// Display options, passed through untouched
    #[serde(default = "default_display")]
    pub display: serde_json::Map<String, serde_json::Value>,
    /// Theme/tool specific options merged into the top level of the generator config
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
    /// Late-bound fields
    #[serde(default = "default_bindings")]
    pub bindings: Vec<BindingConfig>,
}

fn default_true() -> bool {
    true
}

fn default_generator() -> String {
    "sassdoc".to_string()
}

fn default_theme() -> String {
    "herman".to_string()
}

fn default_display() -> serde_json::Map<String, serde_json::Value> {
    let mut display = serde_json::Map::new();
    display.insert("alias".to_string(), serde_json::Value::Bool(true));
    display
}

fn default_bindings() -> Vec<BindingConfig> {
    vec![BindingConfig {
        role: ArtifactRole::Style,
        entry: Some("main".to_string()),
        path: "herman.customCSS".to_string(),
    }]
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            generator: default_generator(),
            theme: default_theme(),
            verbose: true,
            display: default_display(),
            options: serde_json::Map::new(),
            bindings: default_bindings(),
        }
    }
}

/// Script bundling settings
///
/// The command is a template; `{entry}` and `{output}` are substituted per entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptsConfig {
    /// Bundler command line (empty disables script bundling)
    #[serde(default)]
    pub command: Vec<String>,
    /// Extra arguments appended in production mode
    #[serde(default)]
    pub production_args: Vec<String>,
    /// Entry points keyed by logical name, relative to the project root
    #[serde(default)]
    pub entries: BTreeMap<String, PathBuf>,
    /// Globs (relative to the project root) that trigger a rebuild in watch mode
    #[serde(default = "default_script_sources")]
    pub sources: Vec<String>,
}

fn default_script_sources() -> Vec<String> {
    vec!["src/**/*.js".to_string(), "src/**/*.vue".to_string()]
}

impl ScriptsConfig {
    /// Whether script bundling is configured.
    pub fn is_enabled(&self) -> bool {
        !self.command.is_empty() && !self.entries.is_empty()
    }
}

/// Static media (fonts, images) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directories (relative to the project root) scanned for media files
    #[serde(default = "default_media_sources")]
    pub sources: Vec<PathBuf>,
}

fn default_media_sources() -> Vec<PathBuf> {
    vec![PathBuf::from("fonts"), PathBuf::from("images")]
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self { sources: default_media_sources() }
    }
}

/// Generated index page settings
///
/// The template is plain HTML with `{{ ... }}` placeholders: `{{ styles.main }}`
/// and `{{ scripts.main }}` expand to the final path of that entry, `{{ styles }}`
/// and `{{ scripts }}` to link and script tags for every entry, and
/// `{{ favicon }}` to the copied favicon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// HTML template, relative to the project root
    #[serde(default = "default_index_template")]
    pub template: PathBuf,
    /// Favicon copied next to the page, relative to the project root
    #[serde(default)]
    pub favicon: Option<PathBuf>,
}

fn default_index_template() -> PathBuf {
    PathBuf::from("index.html")
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { template: default_index_template(), favicon: None }
    }
}

/// Per-mode naming rule overrides, keyed by artifact role
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Overrides applied in development mode
    #[serde(default)]
    pub development: BTreeMap<String, String>,
    /// Overrides applied in production mode
    #[serde(default)]
    pub production: BTreeMap<String, String>,
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
    /// Regular expressions matched against file names; matches never trigger a rebuild
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

fn default_debounce_ms() -> u32 {
    300
}

fn default_ignore() -> Vec<String> {
    vec!["flycheck_".to_string(), r"\.#".to_string(), "#$".to_string()]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false, ignore: default_ignore() }
    }
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served, relative to the output directory
    #[serde(default = "default_serve_root")]
    pub root: PathBuf,
    /// Settle delay between a finished pass and the reload broadcast
    #[serde(default = "default_reload_delay_ms")]
    pub reload_delay_ms: u64,
    /// Minimum spacing between two reload broadcasts
    #[serde(default = "default_reload_throttle_ms")]
    pub reload_throttle_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_serve_root() -> PathBuf {
    PathBuf::from("docs")
}

fn default_reload_delay_ms() -> u64 {
    300
}

fn default_reload_throttle_ms() -> u64 {
    500
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root: default_serve_root(),
            reload_delay_ms: default_reload_delay_ms(),
            reload_throttle_ms: default_reload_throttle_ms(),
        }
    }
}

/// External lint/format commands
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Lint command line
    #[serde(default)]
    pub lint: Vec<String>,
    /// Format command line
    #[serde(default)]
    pub format: Vec<String>,
}

/// Complete stylebook.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylebookConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    /// Stylesheet compilation
    #[serde(default)]
    pub styles: StylesConfig,
    /// Documentation generation
    #[serde(default)]
    pub docs: DocsConfig,
    /// Script bundling
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Generated index page (absent: no page)
    #[serde(default)]
    pub index: Option<IndexConfig>,
    /// Media files
    #[serde(default)]
    pub media: MediaConfig,
    /// Naming rule overrides
    #[serde(default)]
    pub output: OutputConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
    /// Dev server settings
    #[serde(default)]
    pub serve: ServeConfig,
    /// Lint/format commands
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "docs.bindings[0].path")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stylebook.toml: '{}' {}", self.field, self.message)
    }
}

impl StylebookConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: String, message: &str| {
            errors.push(ConfigValidationError { field, message: message.to_string() });
        };

        if self.project.name.is_empty() {
            push("project.name".to_string(), "must be a non-empty string");
        }

        for (name, entry) in &self.styles.entries {
            if !matches!(entry.role(), ArtifactRole::Style | ArtifactRole::GeneratedMetadata) {
                push(
                    format!("styles.entries.{}.role", name),
                    "must be 'style' or 'generated-metadata'",
                );
            }
            if entry.path().as_os_str().is_empty() {
                push(format!("styles.entries.{}", name), "must name a source file");
            }
        }

        let bindings = if self.docs.enabled { self.docs.bindings.as_slice() } else { &[] };
        for (i, binding) in bindings.iter().enumerate() {
            if binding.path.is_empty() || binding.path.split('.').any(str::is_empty) {
                push(format!("docs.bindings[{}].path", i), "must be a dotted path like 'a.b.c'");
            }
            if let Some(entry) = &binding.entry {
                if !self.declares_artifact(binding.role, entry) {
                    push(
                        format!("docs.bindings[{}].entry", i),
                        "does not name an entry that produces this role",
                    );
                }
            }
        }

        if let Some(index) = &self.index {
            if index.template.as_os_str().is_empty() {
                push("index.template".to_string(), "must name an HTML template");
            }
        }

        if !self.scripts.entries.is_empty() && self.scripts.command.is_empty() {
            push("scripts.command".to_string(), "is required when script entries are declared");
        }

        for (mode, overrides) in
            [("development", &self.output.development), ("production", &self.output.production)]
        {
            for key in overrides.keys() {
                if key.parse::<ArtifactRole>().is_err() {
                    push(format!("output.{}.{}", mode, key), "is not an artifact role");
                }
            }
        }

        if self.watch.debounce_ms == 0 {
            push("watch.debounce_ms".to_string(), "must be a positive integer");
        }
        for (i, pattern) in self.watch.ignore.iter().enumerate() {
            if regex::Regex::new(pattern).is_err() {
                push(format!("watch.ignore[{}]", i), "is not a valid regular expression");
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Whether a stage in this configuration emits an artifact of `role` named `name`.
    pub fn declares_artifact(&self, role: ArtifactRole, name: &str) -> bool {
        match role {
            ArtifactRole::Style | ArtifactRole::GeneratedMetadata => {
                self.styles.entries.get(name).is_some_and(|e| e.role() == role)
            }
            ArtifactRole::Script => self.scripts.entries.contains_key(name),
            // Media names come from the files on disk, the doc site has a single name
            ArtifactRole::Media | ArtifactRole::Doc => true,
            ArtifactRole::Page => self.index.is_some(),
        }
    }
}
