//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod tools;
mod watch;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::build::{BuildContext, BuildMode, Pipeline};
use crate::config::loader::{load_project, merge_cli_overrides, mode_from_env, CliOverrides};
use crate::tools::Toolchain;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_CONFIG: u8 = 2;

/// Stylebook - build stylesheets, their styleguide and assets
#[derive(Parser)]
#[command(name = "stylebook")]
#[command(about = "Stylebook - build stylesheets, their styleguide and assets")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: search upwards for stylebook.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Build mode: development or production (overrides STYLEBOOK_MODE)
    #[arg(long, global = true)]
    pub mode: Option<BuildMode>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the stylesheet source directory
    #[arg(long, global = true)]
    pub src: Option<PathBuf>,

    /// Override the output directory
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile the stylesheet entries
    CompileStyles,

    /// Generate the styleguide, compiling the stylesheets it links first
    GenerateDocs,

    /// Clean the output directory and run every task
    Build {
        /// Keep the previous output instead of cleaning first
        #[arg(long)]
        no_clean: bool,
    },

    /// Build, then rebuild affected tasks when sources change
    Watch {
        /// Do not start the development server
        #[arg(long)]
        no_serve: bool,

        /// Keep the previous output for the first pass
        #[arg(long)]
        no_clean: bool,

        /// Development server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Build once, then serve the output without watching
    Serve {
        /// Keep the previous output instead of cleaning first
        #[arg(long)]
        no_clean: bool,

        /// Development server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the configured lint command
    Lint {
        /// Extra arguments passed to the linter
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the configured format command
    Format {
        /// Extra arguments passed to the formatter
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    crate::logging::init_tracing(cli.global.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> ExitCode {
    let global = cli.global;
    match cli.command {
        Commands::CompileStyles => build::run_task(&global, crate::stages::STYLES).await,
        Commands::GenerateDocs => build::run_task(&global, crate::stages::DOCS).await,
        Commands::Build { no_clean } => build::run_build(&global, no_clean).await,
        Commands::Watch { no_serve, no_clean, port } => {
            watch::run_watch(&global, !no_serve, no_clean, port).await
        }
        Commands::Serve { no_clean, port } => watch::run_serve(&global, no_clean, port).await,
        Commands::Lint { args } => tools::run_tool(&global, tools::ToolKind::Lint, &args).await,
        Commands::Format { args } => tools::run_tool(&global, tools::ToolKind::Format, &args).await,
    }
}

/// A loaded project ready to assemble.
pub(crate) struct Project {
    pub ctx: Arc<BuildContext>,
    pub config_path: Option<PathBuf>,
}

impl Project {
    /// Load the configuration, apply CLI overrides and pick the build mode.
    ///
    /// Every failure here is a configuration error.
    pub fn load(global: &GlobalArgs, port: Option<u16>) -> Result<Self, ExitCode> {
        let loaded = load_project(global.config.as_deref()).map_err(config_error)?;
        match &loaded.path {
            Some(path) => tracing::debug!("Using config: {}", path.display()),
            None => tracing::debug!("No stylebook.toml found, using defaults"),
        }

        let mut config = loaded.config;
        let overrides = CliOverrides { out: global.out.clone(), src: global.src.clone(), port };
        merge_cli_overrides(&mut config, &overrides);

        let mode = match global.mode {
            Some(mode) => mode,
            None => mode_from_env().map_err(config_error)?,
        };
        tracing::debug!(%mode, root = %loaded.project_root.display(), "project loaded");

        let ctx = BuildContext::new(config, loaded.project_root, mode)
            .map_err(config_error)?
            .with_verbose(global.verbose);
        Ok(Self { ctx: Arc::new(ctx), config_path: loaded.path })
    }

    /// Assemble the pipeline with the configured tools.
    pub fn pipeline(&self) -> Result<Pipeline, ExitCode> {
        let tools = Toolchain::from_config(self.ctx.config());
        crate::stages::assemble(self.ctx.clone(), &tools).map_err(config_error)
    }
}

fn config_error(e: impl std::fmt::Display) -> ExitCode {
    eprintln!("Error: {}", e);
    ExitCode::from(EXIT_CONFIG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stylebook", "build", "--mode", "production", "--out", "public", "--no-clean",
        ])
        .unwrap();
        assert_eq!(cli.global.mode, Some(BuildMode::Production));
        assert_eq!(cli.global.out, Some(PathBuf::from("public")));
        assert!(matches!(cli.command, Commands::Build { no_clean: true }));
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(Cli::try_parse_from(["stylebook", "--mode", "staging", "build"]).is_err());
    }

    #[test]
    fn test_lint_passes_extra_args() {
        let cli = Cli::try_parse_from(["stylebook", "lint", "--fix", "sass/"]).unwrap();
        match cli.command {
            Commands::Lint { args } => assert_eq!(args, vec!["--fix", "sass/"]),
            _ => panic!("expected lint"),
        }
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from(["stylebook", "serve", "--no-clean", "--port", "8080"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { no_clean: true, port: Some(8080) }));
    }

    #[test]
    fn test_watch_flags() {
        let cli = Cli::try_parse_from(["stylebook", "watch", "--no-serve", "-p", "4000"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Watch { no_serve: true, no_clean: false, port: Some(4000) }
        ));
    }
}
