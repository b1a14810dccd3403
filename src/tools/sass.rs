//! Dart Sass, driven through its command line.

use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::build::{CompileError, SourceLocation, TaskError};
use crate::tools::{CompiledStyle, StyleCompiler, StyleRequest, ToolCommand};

const TOOL: &str = "sass";

/// Runs the `sass` executable once per entry.
#[derive(Debug, Clone)]
pub struct SassCompiler {
    binary: String,
}

impl SassCompiler {
    /// Use the given executable name or path.
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl StyleCompiler for SassCompiler {
    fn name(&self) -> &str {
        TOOL
    }

    async fn compile(&self, request: &StyleRequest) -> Result<CompiledStyle, TaskError> {
        let staging = tempfile::tempdir()
            .map_err(|e| TaskError::io("creating sass staging directory", e))?;
        let css_path = staging.path().join("out.css");
        let map_path = staging.path().join("out.css.map");

        let mut command = ToolCommand::new(TOOL, &self.binary)
            .arg(format!("--style={}", request.output_style))
            .args(["--no-color", "--no-unicode", "--source-map", "--source-map-urls=absolute"]);
        for load_path in &request.load_paths {
            command = command.arg(format!("--load-path={}", load_path.display()));
        }
        let output = command.arg(&request.entry).arg(&css_path).output().await?;

        if !output.success() {
            return Err(parse_error(&output.stderr, &request.entry).into());
        }

        let css = tokio::fs::read_to_string(&css_path)
            .await
            .map_err(|e| TaskError::io("reading sass output", e))?;
        let source_map = tokio::fs::read_to_string(&map_path).await.ok();

        Ok(CompiledStyle {
            css: strip_source_map_comment(&css),
            source_map,
            warnings: output.stderr_lines(),
        })
    }
}

/// Drop the `sourceMappingURL` comment sass appends; the final one names the
/// planned file instead.
pub fn strip_source_map_comment(css: &str) -> String {
    let kept: Vec<&str> =
        css.lines().filter(|l| !l.trim_start().starts_with("/*# sourceMappingURL=")).collect();
    kept.join("\n").trim_end().to_string()
}

// e.g. "  sass/main.scss 3:15  root stylesheet"
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s+(\d+):(\d+)\s").expect("BUG: invalid LOCATION_RE regex literal")
});

/// Turn sass's stderr into a compile error with the first location it names.
pub fn parse_error(stderr: &str, entry: &Path) -> CompileError {
    let message = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.strip_prefix("Error: ").unwrap_or(l).to_string())
        .unwrap_or_else(|| "compilation failed".to_string());

    let location = stderr.lines().find_map(|line| {
        let caps = LOCATION_RE.captures(line)?;
        let line_no = caps[2].parse().ok()?;
        let column = caps[3].parse().ok()?;
        Some(SourceLocation::at(&caps[1], line_no, column))
    });

    CompileError::new(TOOL, message)
        .with_location(location.unwrap_or_else(|| SourceLocation::file(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STDERR: &str = "Error: expected \"{\".\n  ,\n3 | a { color: red\n  |               ^\n  '\n  sass/main.scss 3:15  root stylesheet\n";

    #[test]
    fn test_parse_error_extracts_location() {
        let err = parse_error(STDERR, Path::new("/p/sass/main.scss"));
        assert_eq!(err.tool, "sass");
        assert_eq!(err.message, "expected \"{\".");
        assert_eq!(err.location, Some(SourceLocation::at("sass/main.scss", 3, 15)));
    }

    #[test]
    fn test_parse_error_without_location_names_entry() {
        let err = parse_error("Error: Can't find stylesheet to import.\n", Path::new("/p/main.scss"));
        assert_eq!(err.message, "Can't find stylesheet to import.");
        assert_eq!(err.location, Some(SourceLocation::file("/p/main.scss")));

        let empty = parse_error("", Path::new("/p/main.scss"));
        assert_eq!(empty.message, "compilation failed");
    }

    #[test]
    fn test_strip_source_map_comment() {
        let css = "a{color:red}\n\n/*# sourceMappingURL=out.css.map */\n";
        assert_eq!(strip_source_map_comment(css), "a{color:red}");
        assert_eq!(strip_source_map_comment("a{b:c}"), "a{b:c}");
    }
}
