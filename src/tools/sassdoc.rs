//! SassDoc, driven through its command line.

use async_trait::async_trait;
use std::io::Write;

use crate::build::{CompileError, TaskError};
use crate::tools::{DocGenerator, DocRequest, ToolCommand};

/// Runs the doc generator with the resolved config written to a JSON file.
#[derive(Debug, Clone)]
pub struct SassdocGenerator {
    binary: String,
}

impl SassdocGenerator {
    /// Use the given executable name or path.
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// Tool name: the executable's file name.
    fn tool(&self) -> &str {
        self.binary.rsplit(['/', '\\']).next().unwrap_or(&self.binary)
    }
}

#[async_trait]
impl DocGenerator for SassdocGenerator {
    fn name(&self) -> &str {
        self.tool()
    }

    async fn generate(&self, request: &DocRequest) -> Result<Vec<String>, TaskError> {
        let tool = self.tool().to_string();
        let mut config_file = tempfile::Builder::new()
            .prefix("stylebook-docs-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| TaskError::io("creating doc config file", e))?;
        let json = serde_json::to_vec_pretty(&request.config)
            .map_err(|e| TaskError::tool(&tool, format!("serializing config: {}", e)))?;
        config_file
            .write_all(&json)
            .and_then(|_| config_file.flush())
            .map_err(|e| TaskError::io("writing doc config file", e))?;

        let output = ToolCommand::new(&tool, &self.binary)
            .arg(&request.src_dir)
            .arg("--config")
            .arg(config_file.path())
            .arg("--no-update-notifier")
            .current_dir(&request.working_dir)
            .output()
            .await?;

        if !output.success() {
            let message = output
                .stderr_lines()
                .into_iter()
                .find(|l| !l.trim().is_empty())
                .unwrap_or_else(|| format!("exited with {}", output.status));
            return Err(CompileError::new(tool, message.trim().to_string()).into());
        }

        Ok(output.stderr_lines())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &std::path::Path, body: &str) -> String {
        let path = dir.join("fake-sassdoc");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_config_is_passed_as_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dist");
        std::fs::create_dir_all(&out).unwrap();
        // Copy the config next to the working directory so the test can inspect it
        let binary = script(dir.path(), "cp \"$3\" ./seen.json");

        let generator = SassdocGenerator::new(binary);
        assert_eq!(generator.name(), "fake-sassdoc");
        let request = DocRequest {
            src_dir: dir.path().join("sass"),
            working_dir: out.clone(),
            config: serde_json::json!({"dest": "docs", "herman": {"customCSS": "css/main.css"}}),
        };
        generator.generate(&request).await.unwrap();

        let seen: serde_json::Value =
            serde_json::from_slice(&std::fs::read(out.join("seen.json")).unwrap()).unwrap();
        assert_eq!(seen["herman"]["customCSS"], "css/main.css");
    }

    #[tokio::test]
    async fn test_failure_is_compile_error() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "echo 'Error: unknown theme herman' >&2; exit 1");

        let request = DocRequest {
            src_dir: dir.path().to_path_buf(),
            working_dir: dir.path().to_path_buf(),
            config: serde_json::json!({}),
        };
        let err = SassdocGenerator::new(binary).generate(&request).await.unwrap_err();
        assert_eq!(err.kind(), "CompileError");
        assert!(err.to_string().contains("unknown theme herman"));
    }
}
