//! Script bundling through a configured command template.

use async_trait::async_trait;
use std::path::Path;

use crate::build::{BuildMode, CompileError, TaskError};
use crate::tools::{ScriptBundler, ToolCommand};

/// Runs the configured bundler once per entry.
///
/// `{entry}` and `{output}` in any argument are replaced with the entry path
/// and the staging output file.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    command: Vec<String>,
    production_args: Vec<String>,
}

impl CommandBundler {
    /// Create a bundler from a command template.
    pub fn new(command: Vec<String>, production_args: Vec<String>) -> Self {
        Self { command, production_args }
    }

    /// The argv for one entry.
    pub fn argv(&self, entry: &Path, output: &Path, mode: BuildMode) -> Vec<String> {
        let entry = entry.to_string_lossy();
        let output = output.to_string_lossy();
        let extra = match mode {
            BuildMode::Production => self.production_args.as_slice(),
            BuildMode::Development => &[],
        };
        self.command
            .iter()
            .chain(extra)
            .map(|arg| arg.replace("{entry}", &entry).replace("{output}", &output))
            .collect()
    }
}

#[async_trait]
impl ScriptBundler for CommandBundler {
    fn name(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("bundler")
    }

    async fn bundle(&self, entry: &Path, output: &Path, mode: BuildMode) -> Result<Vec<String>, TaskError> {
        let argv = self.argv(entry, output, mode);
        let result = ToolCommand::from_argv(self.name(), &argv)?.output().await?;
        if !result.success() {
            let message = result
                .stderr_lines()
                .into_iter()
                .next()
                .unwrap_or_else(|| format!("exited with {}", result.status));
            return Err(CompileError::new(self.name(), message).into());
        }
        Ok(result.stderr_lines())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_substitution() {
        let bundler = CommandBundler::new(
            vec!["esbuild".into(), "{entry}".into(), "--bundle".into(), "--outfile={output}".into()],
            vec!["--minify".into()],
        );
        let dev = bundler.argv(Path::new("src/app.js"), Path::new("/tmp/x/app.js"), BuildMode::Development);
        assert_eq!(dev, vec!["esbuild", "src/app.js", "--bundle", "--outfile=/tmp/x/app.js"]);

        let prod = bundler.argv(Path::new("src/app.js"), Path::new("/tmp/x/app.js"), BuildMode::Production);
        assert_eq!(prod.last().map(String::as_str), Some("--minify"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bundle_runs_command() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("app.js");
        std::fs::write(&entry, "console.log(1)").unwrap();
        let output = dir.path().join("out.js");

        let bundler = CommandBundler::new(
            vec!["cp".into(), "{entry}".into(), "{output}".into()],
            vec![],
        );
        bundler.bundle(&entry, &output, BuildMode::Development).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "console.log(1)");

        let missing = dir.path().join("missing.js");
        let err = bundler.bundle(&missing, &output, BuildMode::Development).await.unwrap_err();
        assert_eq!(err.kind(), "CompileError");
    }
}
