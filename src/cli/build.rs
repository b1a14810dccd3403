//! Build command implementations (compile-styles, generate-docs, build)

use std::process::ExitCode;

use super::{GlobalArgs, Project, EXIT_CONFIG, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{PassKind, PassReport, Pipeline, PipelineError};
use crate::watch::print_report;

/// Run one task plus everything it depends on, without cleaning.
pub async fn run_task(global: &GlobalArgs, task: &str) -> ExitCode {
    let project = match Project::load(global, None) {
        Ok(project) => project,
        Err(code) => return code,
    };
    let mut pipeline = match project.pipeline() {
        Ok(pipeline) => pipeline,
        Err(code) => return code,
    };

    if !pipeline.graph().contains(task) {
        eprintln!("Error: nothing to do for '{}': the task is not configured", task);
        return ExitCode::from(EXIT_CONFIG);
    }

    println!("Building {} ({})...", task, project.ctx.mode());
    finish(pipeline.run(&[task], PassKind::Incremental).await)
}

/// Run every configured task.
pub async fn run_build(global: &GlobalArgs, no_clean: bool) -> ExitCode {
    let project = match Project::load(global, None) {
        Ok(project) => project,
        Err(code) => return code,
    };
    let mut pipeline = match project.pipeline() {
        Ok(pipeline) => pipeline,
        Err(code) => return code,
    };
    ExitCode::from(build_all(&project, &mut pipeline, no_clean).await)
}

/// One pass over every task, cleaning first unless `no_clean`.
///
/// Prints the report and returns the exit code.
pub(crate) async fn build_all(project: &Project, pipeline: &mut Pipeline, no_clean: bool) -> u8 {
    let kind = if no_clean { PassKind::Incremental } else { PassKind::Full };
    println!("Building ({})...", project.ctx.mode());
    if project.ctx.is_verbose() {
        println!("  Source: {}", project.ctx.src_dir().display());
        println!("  Output: {}", project.ctx.out_dir().display());
        println!("  Tasks: {}", pipeline.graph().names().join(", "));
    }
    let result = pipeline.run_all(kind).await;
    report(&result);
    exit_code(&result)
}

fn finish(result: Result<PassReport, PipelineError>) -> ExitCode {
    report(&result);
    ExitCode::from(exit_code(&result))
}

fn report(result: &Result<PassReport, PipelineError>) {
    match result {
        Ok(report) => print_report(report),
        Err(e @ PipelineError::UnsafeClean { .. }) => {
            eprintln!("Error: {}", e);
            eprintln!("Point --out at a dedicated directory or pass --no-clean");
        }
        Err(e) => eprintln!("Build error: {}", e),
    }
}

/// 0 when every task succeeded, 2 for an unsafe clean, 1 otherwise.
pub(crate) fn exit_code(result: &Result<PassReport, PipelineError>) -> u8 {
    match result {
        Ok(report) if report.is_success() => EXIT_SUCCESS,
        Ok(_) => EXIT_ERROR,
        Err(PipelineError::UnsafeClean { .. }) => EXIT_CONFIG,
        Err(_) => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildContext, BuildMode, CompileError, SourceLocation, TaskError, TaskResult};
    use crate::config::default_config;
    use crate::tools::{CompiledStyle, DocGenerator, DocRequest, StyleCompiler, StyleRequest, Toolchain};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    struct Broken;

    #[async_trait]
    impl StyleCompiler for Broken {
        fn name(&self) -> &str {
            "sass"
        }

        async fn compile(&self, request: &StyleRequest) -> Result<CompiledStyle, TaskError> {
            Err(CompileError::new("sass", "expected \"}\".")
                .with_location(SourceLocation::at(&request.entry, 2, 1))
                .into())
        }
    }

    #[async_trait]
    impl DocGenerator for Broken {
        fn name(&self) -> &str {
            "sassdoc"
        }

        async fn generate(&self, _request: &DocRequest) -> Result<Vec<String>, TaskError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_compile_error_exits_one_and_names_task() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BuildContext::new(default_config(), dir.path().to_path_buf(), BuildMode::Development)
            .unwrap();
        let tools = Toolchain { styles: Arc::new(Broken), docs: Arc::new(Broken), scripts: None };
        let mut pipeline = crate::stages::assemble(Arc::new(ctx), &tools).unwrap();

        let result = pipeline.run_all(PassKind::Full).await;
        assert_eq!(exit_code(&result), EXIT_ERROR);

        let summary = result.unwrap().summary();
        assert!(summary.contains("styles: failed: CompileError"), "{}", summary);
        assert!(summary.contains("main.scss:2:1"), "{}", summary);
        assert!(summary.contains("docs: SkippedDueToDependencyFailure"), "{}", summary);
    }

    #[test]
    fn test_exit_codes() {
        let mut ok = PassReport::new(1);
        ok.add_result(TaskResult::succeeded("media".into(), vec![], Duration::ZERO));
        assert_eq!(exit_code(&Ok(ok)), EXIT_SUCCESS);

        let unsafe_clean = Err(PipelineError::UnsafeClean {
            out: PathBuf::from("."),
            protected: PathBuf::from("./sass"),
        });
        assert_eq!(exit_code(&unsafe_clean), EXIT_CONFIG);

        let missing = Err(PipelineError::Graph(crate::build::GraphError::UnknownTask("x".into())));
        assert_eq!(exit_code(&missing), EXIT_ERROR);
    }
}
