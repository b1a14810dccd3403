//! Watch and serve command implementations

use std::path::PathBuf;
use std::process::ExitCode;

use super::build::build_all;
use super::{GlobalArgs, Project, EXIT_CONFIG, EXIT_ERROR, EXIT_SUCCESS};
use crate::serve::{serve, ReloadChannel, ReloadScheduler};
use crate::watch::{watch_and_rebuild, WatchError, WatchOptions};

/// Run the watch command, optionally with the development server.
pub async fn run_watch(
    global: &GlobalArgs,
    with_server: bool,
    no_clean: bool,
    port: Option<u16>,
) -> ExitCode {
    let project = match Project::load(global, port) {
        Ok(project) => project,
        Err(code) => return code,
    };
    let mut pipeline = match project.pipeline() {
        Ok(pipeline) => pipeline,
        Err(code) => return code,
    };
    let ctx = &project.ctx;
    let config = ctx.config();

    let reload = if with_server {
        let channel = ReloadChannel::new();
        let handle = ReloadScheduler::from_config(channel.clone(), &config.serve).spawn();
        let serve_config = config.serve.clone();
        let root = ctx.out_dir().join(&serve_config.root);
        tokio::spawn(async move {
            if let Err(e) = serve(&serve_config, root, channel).await {
                tracing::error!("development server stopped: {}", e);
                eprintln!("Error: {}", e);
            }
        });
        Some(handle)
    } else {
        None
    };

    println!("Starting watch mode ({})...", ctx.mode());
    println!("Press Ctrl+C to stop");
    println!();

    let options = WatchOptions {
        root: ctx.project_root().to_path_buf(),
        out_dir: ctx.out_dir(),
        config_file: project.config_path.clone(),
        config: config.watch.clone(),
        clean: !no_clean,
    };

    match watch_and_rebuild(&mut pipeline, options, reload).await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e @ WatchError::Pipeline(_)) => {
            eprintln!("Build error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Build once, then serve the output without watching.
pub async fn run_serve(global: &GlobalArgs, no_clean: bool, port: Option<u16>) -> ExitCode {
    let (project, root) = match prepare_serve(global, no_clean, port).await {
        Ok(prepared) => prepared,
        Err(code) => return ExitCode::from(code),
    };
    let serve_config = &project.ctx.config().serve;

    match serve(serve_config, root, ReloadChannel::new()).await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Load the project and run the build pass `serve` starts with.
///
/// Returns the directory to serve, or the exit code when nothing should be served.
async fn prepare_serve(
    global: &GlobalArgs,
    no_clean: bool,
    port: Option<u16>,
) -> Result<(Project, PathBuf), u8> {
    let project = Project::load(global, port).map_err(|_| EXIT_CONFIG)?;
    let mut pipeline = project.pipeline().map_err(|_| EXIT_CONFIG)?;

    let code = build_all(&project, &mut pipeline, no_clean).await;
    if code != EXIT_SUCCESS {
        return Err(code);
    }
    let root = project.ctx.out_dir().join(&project.ctx.config().serve.root);
    Ok((project, root))
}
