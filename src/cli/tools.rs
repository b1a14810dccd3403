//! Lint and format command implementations

use std::process::ExitCode;

use super::{GlobalArgs, Project, EXIT_CONFIG, EXIT_ERROR, EXIT_SUCCESS};
use crate::tools::process::ToolCommand;

/// Which configured command to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Lint,
    Format,
}

impl ToolKind {
    fn name(self) -> &'static str {
        match self {
            ToolKind::Lint => "lint",
            ToolKind::Format => "format",
        }
    }
}

/// Run the configured lint or format command from the project root.
pub async fn run_tool(global: &GlobalArgs, kind: ToolKind, extra: &[String]) -> ExitCode {
    let project = match Project::load(global, None) {
        Ok(project) => project,
        Err(code) => return code,
    };
    let tools = &project.ctx.config().tools;
    let argv = match kind {
        ToolKind::Lint => &tools.lint,
        ToolKind::Format => &tools.format,
    };

    let command = match ToolCommand::from_argv(kind.name(), argv) {
        Ok(command) => command.args(extra).current_dir(project.ctx.project_root()),
        Err(_) => {
            eprintln!("Error: no {} command configured", kind.name());
            eprintln!("Set [tools] {} = [\"...\"] in stylebook.toml", kind.name());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match command.status().await {
        Ok(status) if status.success() => ExitCode::from(EXIT_SUCCESS),
        Ok(status) => {
            eprintln!("{} failed ({})", kind.name(), status);
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Error: {}: {}", e.kind(), e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
