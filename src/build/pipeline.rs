//! Build pipeline orchestration.
//!
//! A pass runs the selected tasks and their dependencies. Independent tasks
//! run concurrently as futures polled by a single loop; the artifact set,
//! the binding resolver and the completion ledger are only touched by that
//! loop, so no locking is involved. Task failures become per-task results and
//! never escape [`Pipeline::run`].

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

use crate::build::{
    ArtifactDescriptor, ArtifactSet, BindingTable, GraphError, PassId, PassReport, PipelineGraph,
    StageInput, StageOutput, TaskError, TaskNode, TaskResult,
};

/// Errors that stop a pass before any task runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A requested target does not exist
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The output directory contains the project or the sources
    #[error("refusing to clean {out}: it contains {protected}")]
    UnsafeClean {
        /// Output directory
        out: PathBuf,
        /// Protected directory inside it
        protected: PathBuf,
    },
    /// Cleaning the output directory failed
    #[error("cleaning {path}: {source}")]
    Clean {
        /// Directory being cleaned
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Whether a pass starts from an empty output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Clean the output directory first
    Full,
    /// Write over the previous pass's output
    Incremental,
}

/// An immutable task graph plus its binding declarations.
pub struct Pipeline {
    graph: PipelineGraph,
    bindings: BindingTable,
    out_dir: Option<PathBuf>,
    protected: Vec<PathBuf>,
    next_pass: PassId,
}

impl Pipeline {
    /// Create a pipeline. Passes are numbered from 1.
    pub fn new(graph: PipelineGraph, bindings: BindingTable) -> Self {
        Self { graph, bindings, out_dir: None, protected: Vec::new(), next_pass: 1 }
    }

    /// Set the directory cleared by full passes, and directories that must
    /// never be inside it.
    pub fn with_output_dir(mut self, out_dir: PathBuf, protected: Vec<PathBuf>) -> Self {
        self.out_dir = Some(out_dir);
        self.protected = protected;
        self
    }

    /// The task graph.
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// The binding declarations.
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Run every task.
    pub async fn run_all(&mut self, kind: PassKind) -> Result<PassReport, PipelineError> {
        let names = self.graph.names();
        self.run(&names, kind).await
    }

    /// Run `targets` and everything they depend on.
    pub async fn run<S: AsRef<str>>(
        &mut self,
        targets: &[S],
        kind: PassKind,
    ) -> Result<PassReport, PipelineError> {
        let selected = self.graph.with_dependencies(targets)?;
        if kind == PassKind::Full {
            self.clean().await?;
        }

        let pass = self.next_pass;
        self.next_pass += 1;
        Ok(self.execute(pass, &selected).await)
    }

    async fn execute(&self, pass: PassId, selected: &BTreeSet<String>) -> PassReport {
        let start = Instant::now();
        let mut report = PassReport::new(pass);
        let mut artifacts = ArtifactSet::new(pass);
        let mut resolver = self.bindings.begin_pass(pass);
        resolver.observe(&artifacts);

        tracing::info!(pass, tasks = ?selected, "pass started");

        let mut waiting: Vec<&TaskNode> =
            self.graph.ordered().filter(|n| selected.contains(&n.name)).collect();
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut unsuccessful: HashSet<String> = HashSet::new();
        let mut running = FuturesUnordered::new();

        loop {
            // Settle everything that can be decided without waiting
            let mut i = 0;
            while i < waiting.len() {
                let node = waiting[i];
                if let Some(dep) = node.depends_on.iter().find(|d| unsuccessful.contains(*d)) {
                    tracing::warn!(pass, task = %node.name, dependency = %dep, "skipped");
                    report.add_result(TaskResult::skipped(node.name.clone(), dep.clone()));
                    unsuccessful.insert(node.name.clone());
                    waiting.remove(i);
                    continue;
                }

                let ready = node.depends_on.iter().all(|d| succeeded.contains(d));
                if !ready || !resolver.is_eligible(&node.name) {
                    i += 1;
                    continue;
                }

                for (role, name) in node.stage.declares() {
                    if let Err(e) = artifacts.declare(ArtifactDescriptor::pending(pass, role, name)) {
                        tracing::warn!(pass, task = %node.name, "{}", e);
                    }
                }
                let input = StageInput { pass, config: resolver.config(&node.name).cloned() };
                let stage = node.stage.clone();
                let name = node.name.clone();
                tracing::info!(pass, task = %name, "task started");
                running.push(async move {
                    let started = Instant::now();
                    let result = stage.run(input).await;
                    (name, result, started.elapsed())
                });
                waiting.remove(i);
            }

            let Some((name, result, duration)) = running.next().await else {
                break;
            };
            let outcome = result.and_then(|output| record(&mut artifacts, output));
            match outcome {
                Ok(output) => {
                    tracing::info!(pass, task = %name, elapsed = ?duration, "task succeeded");
                    let outputs = output.artifacts.iter().map(|a| a.path.clone()).collect();
                    report.add_result(
                        TaskResult::succeeded(name.clone(), outputs, duration)
                            .with_warnings(output.warnings),
                    );
                    succeeded.insert(name);
                    for stage in resolver.observe(&artifacts) {
                        tracing::debug!(pass, task = %stage, "bindings resolved");
                    }
                }
                Err(error) => {
                    tracing::error!(pass, task = %name, kind = error.kind(), error = %error, "task failed");
                    report.add_result(TaskResult::failed(name.clone(), error, duration));
                    unsuccessful.insert(name);
                }
            }
        }

        // Nothing is running and nothing can start: the rest never will
        let mut never_ran: Vec<String> = report
            .tasks
            .iter()
            .filter(|r| !r.status.is_success() && !r.status.is_failure())
            .map(|r| r.task.clone())
            .collect();
        let mut unfinished: HashSet<String> = HashSet::new();
        for node in &waiting {
            match node.depends_on.iter().find(|d| unfinished.contains(*d)) {
                Some(dep) => report.add_result(TaskResult::skipped(node.name.clone(), dep.clone())),
                None => report.add_result(TaskResult::blocked(node.name.clone())),
            }
            unfinished.insert(node.name.clone());
        }
        never_ran.extend(waiting.iter().map(|n| n.name.clone()));

        report.blocked = resolver.blocked(never_ran.iter().map(String::as_str));
        for blocked in &report.blocked {
            tracing::warn!(pass, "{}", blocked);
        }

        report.artifacts = artifacts;
        let report = report.with_duration(start.elapsed());
        tracing::info!(pass, success = report.is_success(), elapsed = ?report.duration, "pass finished");
        report
    }

    async fn clean(&self) -> Result<(), PipelineError> {
        let Some(out) = &self.out_dir else {
            return Ok(());
        };
        if !tokio::fs::try_exists(out).await.unwrap_or(false) {
            return Ok(());
        }

        let out_abs = canonical(out);
        for protected in &self.protected {
            if canonical(protected).starts_with(&out_abs) {
                return Err(PipelineError::UnsafeClean {
                    out: out.clone(),
                    protected: protected.clone(),
                });
            }
        }

        tracing::debug!(path = %out.display(), "cleaning output directory");
        tokio::fs::remove_dir_all(out)
            .await
            .map_err(|source| PipelineError::Clean { path: out.clone(), source })
    }
}

/// Finalize a stage's artifacts in the pass's set.
fn record(artifacts: &mut ArtifactSet, output: StageOutput) -> Result<StageOutput, TaskError> {
    for artifact in &output.artifacts {
        artifacts.finalize(artifact)?;
    }
    Ok(output)
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("graph", &self.graph)
            .field("out_dir", &self.out_dir)
            .field("next_pass", &self.next_pass)
            .finish_non_exhaustive()
    }
}
