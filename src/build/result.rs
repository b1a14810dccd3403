//! Build pass result types.
//!
//! Contains types for representing the outcome of a pipeline pass.

use std::path::PathBuf;
use std::time::Duration;

use crate::build::{ArtifactSet, BlockedBinding, PassId, TaskError};

/// Outcome of a single task within a pass.
#[derive(Debug)]
pub enum TaskStatus {
    /// The stage ran and its artifacts were finalized
    Succeeded,
    /// The stage ran and failed
    Failed(TaskError),
    /// Never started because a dependency failed
    Skipped {
        /// The failed (or itself skipped) dependency
        failed_dependency: String,
    },
    /// Never started because bindings stayed unresolved
    Blocked,
}

impl TaskStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Succeeded)
    }

    /// Check if the status indicates the task failed while running.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed(_))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed(err) => write!(f, "failed: {}: {}", err.kind(), err),
            TaskStatus::Skipped { failed_dependency } => {
                write!(f, "SkippedDueToDependencyFailure: '{}' failed", failed_dependency)
            }
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// Result of one task.
#[derive(Debug)]
pub struct TaskResult {
    /// Task name
    pub task: String,
    /// Outcome
    pub status: TaskStatus,
    /// Files written, relative to the output directory
    pub outputs: Vec<PathBuf>,
    /// Run time (zero for tasks that never started)
    pub duration: Duration,
    /// Warning messages (if any)
    pub warnings: Vec<String>,
}

impl TaskResult {
    /// Create a successful result.
    pub fn succeeded(task: String, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { task, status: TaskStatus::Succeeded, outputs, duration, warnings: vec![] }
    }

    /// Create a failed result.
    pub fn failed(task: String, error: TaskError, duration: Duration) -> Self {
        Self { task, status: TaskStatus::Failed(error), outputs: vec![], duration, warnings: vec![] }
    }

    /// Create a result for a task skipped because of `failed_dependency`.
    pub fn skipped(task: String, failed_dependency: String) -> Self {
        Self {
            task,
            status: TaskStatus::Skipped { failed_dependency },
            outputs: vec![],
            duration: Duration::ZERO,
            warnings: vec![],
        }
    }

    /// Create a result for a task whose bindings never resolved.
    pub fn blocked(task: String) -> Self {
        Self {
            task,
            status: TaskStatus::Blocked,
            outputs: vec![],
            duration: Duration::ZERO,
            warnings: vec![],
        }
    }

    /// Add warnings to the result.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of a complete pass.
#[derive(Debug)]
pub struct PassReport {
    /// Pass sequence number
    pub pass: PassId,
    /// Per-task results, in completion order
    pub tasks: Vec<TaskResult>,
    /// Bindings that were still unresolved when the pass settled
    pub blocked: Vec<BlockedBinding>,
    /// Artifacts of this pass
    pub artifacts: ArtifactSet,
    /// Total pass duration
    pub duration: Duration,
}

impl PassReport {
    /// Create an empty report.
    pub fn new(pass: PassId) -> Self {
        Self {
            pass,
            tasks: Vec::new(),
            blocked: Vec::new(),
            artifacts: ArtifactSet::new(pass),
            duration: Duration::ZERO,
        }
    }

    /// Add a task result.
    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Look up a task's result.
    pub fn task(&self, name: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.task == name)
    }

    /// Names of tasks that ran, in completion order.
    pub fn ran(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|r| matches!(r.status, TaskStatus::Succeeded | TaskStatus::Failed(_)))
            .map(|r| r.task.as_str())
            .collect()
    }

    /// Get the number of successful tasks.
    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.is_success()).count()
    }

    /// Get the number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Get the number of skipped tasks.
    pub fn skipped_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, TaskStatus::Skipped { .. })).count()
    }

    /// Get the number of blocked tasks.
    pub fn blocked_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, TaskStatus::Blocked)).count()
    }

    /// A pass succeeds only if every task it selected succeeded.
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(TaskResult::is_success) && self.blocked.is_empty()
    }

    /// Get all warnings.
    pub fn all_warnings(&self) -> Vec<&String> {
        self.tasks.iter().flat_map(|r| r.warnings.iter()).collect()
    }

    /// Format a summary of the pass.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let failed = self.failed_count();
        let skipped = self.skipped_count();
        let blocked = self.blocked_count();
        let total = self.tasks.len();

        if self.is_success() {
            lines.push(format!(
                "Build succeeded: {} tasks in {}",
                success,
                crate::watch::format_duration(self.duration)
            ));
        } else {
            lines.push(format!(
                "Build failed: {} succeeded, {} failed, {} skipped, {} blocked ({} total)",
                success, failed, skipped, blocked, total
            ));
            for task in self.tasks.iter().filter(|r| !r.is_success()) {
                lines.push(format!("  - {}: {}", task.task, task.status));
            }
            for binding in &self.blocked {
                lines.push(format!("  - {}", binding));
            }
        }

        let warnings = self.all_warnings();
        if !warnings.is_empty() {
            lines.push(format!("Warnings ({}): ", warnings.len()));
            for warning in warnings.iter().take(5) {
                lines.push(format!("  - {}", warning));
            }
            if warnings.len() > 5 {
                lines.push(format!("  ... and {} more", warnings.len() - 5));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{ArtifactRole, Binding, CompileError};

    #[test]
    fn test_task_status_display() {
        assert_eq!(TaskStatus::Succeeded.to_string(), "succeeded");
        let failed = TaskStatus::Failed(CompileError::new("sass", "bad").into());
        assert_eq!(failed.to_string(), "failed: CompileError: sass: bad");
        let skipped = TaskStatus::Skipped { failed_dependency: "styles".to_string() };
        assert!(skipped.to_string().starts_with("SkippedDueToDependencyFailure"));
    }

    #[test]
    fn test_pass_report_counts() {
        let mut report = PassReport::new(1);
        report.add_result(TaskResult::succeeded("media".into(), vec![], Duration::ZERO));
        report.add_result(TaskResult::failed(
            "styles".into(),
            CompileError::new("sass", "bad").into(),
            Duration::ZERO,
        ));
        report.add_result(TaskResult::skipped("docs".into(), "styles".into()));

        assert_eq!(report.success_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.ran(), vec!["media", "styles"]);
        assert!(!report.is_success());

        let summary = report.summary();
        assert!(summary.contains("Build failed"));
        assert!(summary.contains("docs: SkippedDueToDependencyFailure"));
    }

    #[test]
    fn test_blocked_pass_is_not_success() {
        let mut report = PassReport::new(1);
        report.add_result(TaskResult::blocked("docs".into()));
        report.blocked.push(BlockedBinding {
            stage: "docs".into(),
            binding: Binding::new(ArtifactRole::Style, "herman.customCSS").unwrap(),
        });

        assert!(!report.is_success());
        assert!(report.summary().contains("BlockedBinding: 'docs'"));
    }

    #[test]
    fn test_pass_report_success_summary() {
        let mut report = PassReport::new(1);
        report.add_result(
            TaskResult::succeeded("styles".into(), vec![PathBuf::from("css/main.css")], Duration::ZERO)
                .with_warnings(vec!["deprecated".into()]),
        );
        let report = report.with_duration(Duration::from_millis(120));

        assert!(report.is_success());
        assert_eq!(report.task("styles").unwrap().outputs, vec![PathBuf::from("css/main.css")]);
        let summary = report.summary();
        assert!(summary.contains("Build succeeded: 1 tasks"));
        assert!(summary.contains("Warnings (1)"));
    }
}
