//! In-process CSS compiler backed by lightningcss.

use async_trait::async_trait;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use std::path::Path;

use crate::build::{CompileError, SourceLocation, TaskError};
use crate::config::OutputStyle;
use crate::tools::{CompiledStyle, StyleCompiler, StyleRequest};

const TOOL: &str = "lightningcss";

/// Compiles plain CSS entries: parses, minifies, prints.
#[derive(Debug, Clone, Default)]
pub struct LightningCompiler;

impl LightningCompiler {
    /// Create the compiler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StyleCompiler for LightningCompiler {
    fn name(&self) -> &str {
        TOOL
    }

    async fn compile(&self, request: &StyleRequest) -> Result<CompiledStyle, TaskError> {
        let source = tokio::fs::read_to_string(&request.entry)
            .await
            .map_err(|e| TaskError::io(format!("reading {}", request.entry.display()), e))?;
        let minify = request.output_style == OutputStyle::Compressed;
        let css = compile_css(&source, &request.entry, minify)?;
        let source_map = source_map_for(&request.entry);
        Ok(CompiledStyle { css, source_map: Some(source_map), warnings: Vec::new() })
    }
}

/// Parse and print a stylesheet.
pub fn compile_css(source: &str, path: &Path, minify: bool) -> Result<String, CompileError> {
    let filename = path.to_string_lossy().into_owned();
    let options = ParserOptions { filename: filename.clone(), ..ParserOptions::default() };

    let mut sheet = StyleSheet::parse(source, options).map_err(|e| {
        let error = CompileError::new(TOOL, e.kind.to_string());
        match &e.loc {
            // lightningcss lines are 0-indexed
            Some(loc) => error.with_location(SourceLocation::at(path, loc.line as usize + 1, loc.column as usize)),
            None => error.with_location(SourceLocation::file(path)),
        }
    })?;

    if minify {
        sheet
            .minify(MinifyOptions::default())
            .map_err(|e| CompileError::new(TOOL, e.kind.to_string()))?;
    }

    let printed = sheet
        .to_css(PrinterOptions { minify, ..PrinterOptions::default() })
        .map_err(|e| CompileError::new(TOOL, e.kind.to_string()))?;
    Ok(printed.code)
}

/// A source map naming the entry as its only source.
///
/// Output is not mapped back line by line.
fn source_map_for(entry: &Path) -> String {
    serde_json::json!({
        "version": 3,
        "sources": [entry.to_string_lossy()],
        "names": [],
        "mappings": "",
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minified_output() {
        let css = compile_css(".a {\n  color: #ff0000;\n}\n", Path::new("a.css"), true).unwrap();
        assert_eq!(css, ".a{color:red}");
    }

    #[test]
    fn test_expanded_output_keeps_rules() {
        let css = compile_css(".a { color: blue; }", Path::new("a.css"), false).unwrap();
        assert!(css.contains(".a {"));
        assert!(css.contains("color: #00f") || css.contains("color: blue"));
    }

    #[test]
    fn test_syntax_error_has_location() {
        let err = compile_css(".a { color: red; }\n..b { color: red; }\n", Path::new("sass/bad.css"), true)
            .unwrap_err();
        assert_eq!(err.tool, "lightningcss");
        let location = err.location.expect("location");
        assert_eq!(location.file, Path::new("sass/bad.css"));
    }

    #[tokio::test]
    async fn test_compile_reads_entry() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("site.css");
        std::fs::write(&entry, "body { margin: 0px }").unwrap();

        let compiled = LightningCompiler::new()
            .compile(&StyleRequest { entry, load_paths: vec![], output_style: OutputStyle::Compressed })
            .await
            .unwrap();
        assert_eq!(compiled.css, "body{margin:0}");
        let map: serde_json::Value = serde_json::from_str(compiled.source_map.as_deref().unwrap()).unwrap();
        assert_eq!(map["version"], 3);
    }
}
