//! Index page stage.
//!
//! Renders the project's HTML template with the final paths of the style and
//! script entries, which are only known once those stages have written their
//! output, and copies the favicon next to the page.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use crate::build::{
    ArtifactRole, Binding, BuildContext, ConfigPath, EmittedArtifact, InputPattern, Stage,
    StageInput, StageOutput, TaskError,
};
use crate::config::IndexConfig;
use crate::stages::{logical_name, write_output, SetupError};

/// Logical name of the rendered page.
pub const PAGE: &str = "index.html";

const TOOL: &str = "index";

/// Placeholder namespaces; anything else in `{{ }}` is left for the page's own scripts.
const NAMESPACES: [&str; 3] = ["styles", "scripts", "favicon"];

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}")
        .expect("BUG: invalid PLACEHOLDER_RE regex literal")
});

/// Renders the index page template.
pub struct IndexStage {
    ctx: Arc<BuildContext>,
    template: PathBuf,
    favicon: Option<PathBuf>,
    bindings: Vec<Binding>,
}

impl IndexStage {
    /// Create the stage, binding every given style and script entry.
    pub fn new(
        ctx: Arc<BuildContext>,
        config: &IndexConfig,
        styles: &[String],
        scripts: &[String],
    ) -> Result<Self, SetupError> {
        let mut bindings = Vec::new();
        for name in styles {
            bindings.push(Binding::new(ArtifactRole::Style, &format!("styles.{}", name))?.with_entry(name));
        }
        for name in scripts {
            bindings.push(Binding::new(ArtifactRole::Script, &format!("scripts.{}", name))?.with_entry(name));
        }

        Ok(Self {
            template: ctx.resolve_path(&config.template),
            favicon: config.favicon.as_deref().map(|p| ctx.resolve_path(p)),
            ctx,
            bindings,
        })
    }

    /// The values before bindings are applied.
    pub fn template(&self) -> Value {
        json!({ "styles": {}, "scripts": {} })
    }

    /// Bindings to declare for this stage.
    pub fn bindings(&self) -> Vec<Binding> {
        self.bindings.clone()
    }

    async fn read_favicon(&self) -> Result<Option<(String, Vec<u8>)>, TaskError> {
        let Some(path) = &self.favicon else {
            return Ok(None);
        };
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| TaskError::io(format!("reading {}", path.display()), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "favicon.ico".to_string());
        Ok(Some((name, contents)))
    }
}

#[async_trait]
impl Stage for IndexStage {
    fn produces(&self) -> Vec<ArtifactRole> {
        vec![ArtifactRole::Page]
    }

    fn declares(&self) -> Vec<(ArtifactRole, String)> {
        vec![(ArtifactRole::Page, PAGE.to_string())]
    }

    fn inputs(&self) -> Vec<InputPattern> {
        let mut inputs = vec![InputPattern::file(&self.template)];
        inputs.extend(self.favicon.iter().map(InputPattern::file));
        inputs
    }

    async fn run(&self, input: StageInput) -> Result<StageOutput, TaskError> {
        let mut values = input.config.unwrap_or_else(|| self.template());
        let source = tokio::fs::read_to_string(&self.template)
            .await
            .map_err(|e| TaskError::io(format!("reading {}", self.template.display()), e))?;

        let favicon = match self.read_favicon().await? {
            Some((name, contents)) => {
                let relative = self.ctx.planner().plan(ArtifactRole::Page, &name)?.finalize(&contents);
                if let Value::Object(map) = &mut values {
                    map.insert("favicon".to_string(), Value::String(logical_name(&relative)));
                }
                Some((name, relative, contents))
            }
            None => None,
        };

        // Render before writing so a bad template leaves nothing behind
        let html = render(&source, &values)?;
        let mut output = StageOutput::default();

        if let Some((name, relative, contents)) = favicon {
            write_output(&self.ctx.out_dir().join(&relative), &contents).await?;
            output.artifacts.push(EmittedArtifact::new(ArtifactRole::Page, name, relative));
        }

        let relative = self.ctx.planner().plan(ArtifactRole::Page, PAGE)?.finalize(html.as_bytes());
        write_output(&self.ctx.out_dir().join(&relative), html.as_bytes()).await?;
        tracing::debug!(path = %relative.display(), "index page rendered");
        output.artifacts.push(EmittedArtifact::new(ArtifactRole::Page, PAGE, relative));
        Ok(output)
    }
}

/// Fill the `styles`, `scripts` and `favicon` placeholders of `template`.
pub fn render(template: &str, values: &Value) -> Result<String, TaskError> {
    let mut html = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else { continue };
        let namespace = key.as_str().split('.').next().unwrap_or_default();
        if !NAMESPACES.contains(&namespace) {
            continue;
        }
        html.push_str(&template[last..whole.start()]);
        html.push_str(&expand(key.as_str(), values)?);
        last = whole.end();
    }
    html.push_str(&template[last..]);
    Ok(html)
}

fn expand(key: &str, values: &Value) -> Result<String, TaskError> {
    let unknown = || TaskError::tool(TOOL, format!("unknown placeholder '{{{{ {} }}}}'", key));
    let path = ConfigPath::parse(key).map_err(|_| unknown())?;
    match path.get(values) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Object(entries)) => Ok(tags(key, entries)),
        _ => Err(unknown()),
    }
}

fn tags(group: &str, entries: &Map<String, Value>) -> String {
    entries
        .values()
        .filter_map(Value::as_str)
        .map(|path| match group {
            "scripts" => format!(r#"<script src="{}"></script>"#, path),
            _ => format!(r#"<link rel="stylesheet" href="{}">"#, path),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;
    use crate::config::default_config;

    fn resolved() -> Value {
        json!({
            "styles": {"main": "css/main.0123.min.css", "docs": "css/docs.4567.min.css"},
            "scripts": {"main": "js/main.bundle.89ab.min.js"},
        })
    }

    #[test]
    fn test_render_named_entries() {
        let html = render(r#"<link href="{{ styles.main }}"><script src="{{scripts.main}}">"#, &resolved()).unwrap();
        assert_eq!(html, r#"<link href="css/main.0123.min.css"><script src="js/main.bundle.89ab.min.js">"#);
    }

    #[test]
    fn test_render_all_entries_as_tags() {
        let html = render("<head>{{ styles }}</head>{{ scripts }}", &resolved()).unwrap();
        assert!(html.contains(r#"<link rel="stylesheet" href="css/docs.4567.min.css">"#));
        assert!(html.contains(r#"<link rel="stylesheet" href="css/main.0123.min.css">"#));
        assert!(html.ends_with(r#"<script src="js/main.bundle.89ab.min.js"></script>"#));
    }

    #[test]
    fn test_foreign_placeholders_untouched() {
        let html = render("<p>{{ message }}</p>", &resolved()).unwrap();
        assert_eq!(html, "<p>{{ message }}</p>");
    }

    #[test]
    fn test_unknown_entry_is_an_error() {
        let err = render("{{ styles.print }}", &resolved()).unwrap_err();
        assert_eq!(err.kind(), "ToolError");
        assert!(err.to_string().contains("styles.print"));
        assert!(render("{{ favicon }}", &resolved()).is_err());
    }

    #[tokio::test]
    async fn test_run_writes_page_and_favicon() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/favicon.ico"), b"\0\0\x01\0").unwrap();
        std::fs::write(
            dir.path().join("index.html"),
            r#"<link rel="icon" href="{{ favicon }}"><link href="{{ styles.main }}">"#,
        )
        .unwrap();

        let ctx = BuildContext::new(default_config(), dir.path().to_path_buf(), BuildMode::Production)
            .unwrap();
        let config = IndexConfig { favicon: Some(PathBuf::from("images/favicon.ico")), ..IndexConfig::default() };
        let stage = IndexStage::new(Arc::new(ctx), &config, &["main".to_string()], &[]).unwrap();
        assert_eq!(stage.bindings().len(), 1);
        assert_eq!(stage.inputs().len(), 2);

        let values = json!({"styles": {"main": "css/main.abc.min.css"}, "scripts": {}});
        let output = stage.run(StageInput { pass: 1, config: Some(values) }).await.unwrap();

        let paths: Vec<_> = output.artifacts.iter().map(|a| a.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("favicon.ico"), PathBuf::from(PAGE)]);
        let page = std::fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
        assert_eq!(page, r#"<link rel="icon" href="favicon.ico"><link href="css/main.abc.min.css">"#);
        assert!(dir.path().join("dist/favicon.ico").is_file());
    }

    #[tokio::test]
    async fn test_bad_template_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "{{ scripts.main }}").unwrap();
        let ctx = BuildContext::new(default_config(), dir.path().to_path_buf(), BuildMode::Development)
            .unwrap();
        let stage = IndexStage::new(Arc::new(ctx), &IndexConfig::default(), &[], &[]).unwrap();

        assert!(stage.run(StageInput { pass: 1, config: None }).await.is_err());
        assert!(!dir.path().join("dist").exists());
    }
}
