//! Task error types.
//!
//! Errors raised inside a task never escape the pipeline executor: they are
//! recorded in the task's result and reported with the task name.

use std::path::PathBuf;
use thiserror::Error;

/// Location of an error inside a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Path to the file containing the error
    pub file: PathBuf,
    /// Line number (1-indexed, None if unknown)
    pub line: Option<usize>,
    /// Column number (1-indexed, None if unknown)
    pub column: Option<usize>,
}

impl SourceLocation {
    /// A location naming only the file.
    pub fn file(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into(), line: None, column: None }
    }

    /// A location with line and column.
    pub fn at(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self { file: file.into(), line: Some(line), column: Some(column) }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(col) = self.column {
                write!(f, ":{}", col)?;
            }
        }
        Ok(())
    }
}

/// Malformed input reported by a compiler or generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Tool that rejected the input (e.g. "sass", "sassdoc")
    pub tool: String,
    /// Tool message
    pub message: String,
    /// Where the problem is, when the tool says
    pub location: Option<SourceLocation>,
}

impl CompileError {
    /// Create a compile error without location.
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self { tool: tool.into(), message: message.into(), location: None }
    }

    /// Attach a location.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.tool, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {})", location)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Failure of a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The tool rejected its input
    #[error("{0}")]
    Compile(#[from] CompileError),
    /// A tool could not be started or died abnormally
    #[error("{tool}: {message}")]
    Tool {
        /// Tool name
        tool: String,
        /// What went wrong
        message: String,
    },
    /// Filesystem error while reading inputs or writing outputs
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Output naming failed
    #[error("{0}")]
    Planner(#[from] crate::build::PlannerError),
    /// Artifact bookkeeping failed
    #[error("{0}")]
    Artifact(#[from] crate::build::ArtifactError),
}

impl TaskError {
    /// Short name of the error kind, printed next to the task name.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Compile(_) => "CompileError",
            TaskError::Tool { .. } => "ToolError",
            TaskError::Io { .. } => "IoError",
            TaskError::Planner(crate::build::PlannerError::UnknownRole(_)) => "UnknownRole",
            TaskError::Planner(_) => "PlannerError",
            TaskError::Artifact(_) => "ArtifactError",
        }
    }

    /// Wrap an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TaskError::Io { context: context.into(), source }
    }

    /// A tool failure that is not about the input.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        TaskError::Tool { tool: tool.into(), message: message.into() }
    }
}
