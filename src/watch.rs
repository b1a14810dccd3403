//! Watch mode for incremental rebuilds on file changes
//!
//! File system events are mapped to the tasks whose inputs they touch,
//! debounced, and run as one incremental pass over the affected tasks and
//! everything depending on them. A running pass is never interrupted: events
//! arriving meanwhile are queued for the next pass.

use notify::{EventKind, RecursiveMode, Watcher};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::build::{InputPattern, PassKind, PassReport, Pipeline, PipelineError, PipelineGraph};
use crate::config::schema::WatchConfig;
use crate::serve::ReloadHandle;

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("failed to watch {path}: {source}")]
    WatchPath {
        /// Directory that could not be watched
        path: PathBuf,
        /// Underlying error
        #[source]
        source: notify::Error,
    },
    /// An ignore pattern is not a valid regular expression
    #[error("invalid ignore pattern '{pattern}': {source}")]
    InvalidIgnore {
        /// The pattern
        pattern: String,
        /// Parser error
        #[source]
        source: regex::Error,
    },
    /// A pass could not start
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File created
    Added,
    /// File contents or metadata changed
    Changed,
    /// File deleted
    Removed,
}

/// A file system change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path of the file
    pub changed_path: PathBuf,
    /// What happened
    pub kind: ChangeKind,
}

impl WatchEvent {
    /// Create an event.
    pub fn new(changed_path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self { changed_path: changed_path.into(), kind }
    }

    /// Convert a notify event; access events and the like yield nothing.
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Added,
            EventKind::Modify(_) => ChangeKind::Changed,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => return Vec::new(),
        };
        event.paths.into_iter().map(|p| Self::new(p, kind)).collect()
    }
}

/// Watch controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Nothing to do
    Idle,
    /// Changes recorded, timer not armed yet
    Pending,
    /// Waiting for the debounce window to pass without further changes
    Debouncing,
    /// A pass is in flight
    Running,
}

impl std::fmt::Display for WatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchState::Idle => write!(f, "idle"),
            WatchState::Pending => write!(f, "pending"),
            WatchState::Debouncing => write!(f, "debouncing"),
            WatchState::Running => write!(f, "running"),
        }
    }
}

/// Maps changes to task sets and decides when a pass starts.
///
/// The controller does no I/O; the driver feeds it events and the clock.
#[derive(Debug)]
pub struct WatchController {
    state: WatchState,
    debounce: Duration,
    deadline: Option<Instant>,
    pending: BTreeSet<String>,
    queued: BTreeSet<String>,
    inputs: Vec<(String, Vec<InputPattern>)>,
    dependents: BTreeMap<String, BTreeSet<String>>,
    ignore: Vec<Regex>,
    ignored_dirs: Vec<PathBuf>,
    config_file: Option<PathBuf>,
}

impl WatchController {
    /// Create a controller for the tasks of `graph`.
    pub fn new(graph: &PipelineGraph, config: &WatchConfig) -> Result<Self, WatchError> {
        let ignore = config
            .ignore
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|source| WatchError::InvalidIgnore { pattern: pattern.clone(), source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let inputs = graph.ordered().map(|n| (n.name.clone(), n.stage.inputs())).collect();
        let dependents = graph
            .ordered()
            .map(|n| (n.name.clone(), graph.with_dependents(&[n.name.as_str()])))
            .collect();

        Ok(Self {
            state: WatchState::Idle,
            debounce: Duration::from_millis(u64::from(config.debounce_ms)),
            deadline: None,
            pending: BTreeSet::new(),
            queued: BTreeSet::new(),
            inputs,
            dependents,
            ignore,
            ignored_dirs: Vec::new(),
            config_file: None,
        })
    }

    /// Changes to this file affect every task.
    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.config_file = Some(path);
        self
    }

    /// Changes below this directory are never relevant (the output tree).
    pub fn ignore_dir(mut self, dir: PathBuf) -> Self {
        self.ignored_dirs.push(dir);
        self
    }

    /// Current state.
    pub fn state(&self) -> WatchState {
        self.state
    }

    /// When the debounce window closes, while debouncing.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Tasks recorded for the next pass.
    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending
    }

    /// Tasks whose inputs cover `path` (every task for the config file).
    pub fn tasks_for(&self, path: &Path) -> BTreeSet<String> {
        if self.is_ignored(path) {
            return BTreeSet::new();
        }
        if self.config_file.as_deref() == Some(path) {
            return self.inputs.iter().map(|(name, _)| name.clone()).collect();
        }
        self.inputs
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|p| p.matches(path)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignored_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        self.ignore.iter().any(|re| re.is_match(&name))
    }

    /// Record a change. Returns whether it mattered.
    pub fn on_event(&mut self, event: &WatchEvent, now: Instant) -> bool {
        let tasks = self.tasks_for(&event.changed_path);
        if tasks.is_empty() {
            return false;
        }
        tracing::debug!(path = %event.changed_path.display(), kind = ?event.kind, ?tasks, "change");

        match self.state {
            WatchState::Idle => {
                self.pending.extend(tasks);
                self.transition(WatchState::Pending);
                self.arm(now);
            }
            WatchState::Pending => {
                self.pending.extend(tasks);
                self.arm(now);
            }
            WatchState::Debouncing => {
                self.pending.extend(tasks);
                self.deadline = Some(now + self.debounce);
            }
            WatchState::Running => self.queued.extend(tasks),
        }
        true
    }

    fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
        self.transition(WatchState::Debouncing);
    }

    /// Start a pass if the debounce window has closed.
    ///
    /// Returns the tasks to run: everything recorded plus their dependents.
    pub fn poll(&mut self, now: Instant) -> Option<BTreeSet<String>> {
        if self.state != WatchState::Debouncing || self.deadline.is_some_and(|d| now < d) {
            return None;
        }
        self.deadline = None;
        let mut tasks = BTreeSet::new();
        for task in std::mem::take(&mut self.pending) {
            match self.dependents.get(&task) {
                Some(dependents) => tasks.extend(dependents.iter().cloned()),
                None => {
                    tasks.insert(task);
                }
            }
        }
        self.transition(WatchState::Running);
        Some(tasks)
    }

    /// The running pass completed.
    pub fn finish(&mut self, now: Instant) {
        if self.state != WatchState::Running {
            return;
        }
        if self.queued.is_empty() {
            self.transition(WatchState::Idle);
        } else {
            self.pending = std::mem::take(&mut self.queued);
            self.transition(WatchState::Pending);
            self.arm(now);
        }
    }

    fn transition(&mut self, next: WatchState) {
        tracing::debug!(from = %self.state, to = %next, "watch state");
        self.state = next;
    }
}

/// Tracks failing tasks across passes to report recoveries
#[derive(Debug, Default)]
pub struct ErrorTracker {
    /// Tasks that failed in the previous pass
    failing: HashSet<String>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with a pass report, returning tasks that are fixed now
    pub fn update(&mut self, report: &PassReport) -> Vec<String> {
        let mut fixed = Vec::new();
        for task in &report.tasks {
            if task.is_success() {
                if self.failing.remove(&task.task) {
                    fixed.push(task.task.clone());
                }
            } else if task.status.is_failure() {
                self.failing.insert(task.task.clone());
            }
        }
        fixed.sort();
        fixed
    }

    /// Check if there are any tracked failures
    pub fn has_errors(&self) -> bool {
        !self.failing.is_empty()
    }

    /// Number of failing tasks
    pub fn error_count(&self) -> usize {
        self.failing.len()
    }
}

/// Options for watch mode
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Directory watched recursively (the project root)
    pub root: PathBuf,
    /// Output directory, whose changes are ignored
    pub out_dir: PathBuf,
    /// Config file; its changes rerun everything
    pub config_file: Option<PathBuf>,
    /// Watch configuration (debounce, clear screen, ignore patterns)
    pub config: WatchConfig,
    /// Clean the output directory before the first pass
    pub clean: bool,
}

/// Run an initial pass, then watch and rebuild until Ctrl+C.
pub async fn watch_and_rebuild(
    pipeline: &mut Pipeline,
    options: WatchOptions,
    reload: Option<ReloadHandle>,
) -> Result<(), WatchError> {
    let mut controller = WatchController::new(pipeline.graph(), &options.config)?
        .ignore_dir(options.out_dir.clone());
    if let Some(config_file) = &options.config_file {
        controller = controller.with_config_file(config_file.clone());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        match result {
            Ok(event) => {
                for change in WatchEvent::from_notify(event) {
                    let _ = tx.send(change);
                }
            }
            Err(e) => tracing::warn!("watch error: {}", e),
        }
    })
    .map_err(WatchError::WatcherInit)?;
    watcher
        .watch(&options.root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::WatchPath { path: options.root.clone(), source })?;

    let mut tracker = ErrorTracker::new();

    if options.config.clear_screen {
        clear_screen();
    }
    println!("[{}] Building...", timestamp());
    let kind = if options.clean { PassKind::Full } else { PassKind::Incremental };
    let report = pipeline.run_all(kind).await?;
    finish_pass(&report, &mut tracker, reload.as_ref());
    println!("[{}] Watching {} for changes...", timestamp(), options.root.display());

    loop {
        let sleep = match controller.deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline),
            None => tokio::time::sleep(Duration::from_secs(3600)),
        };

        tokio::select! {
            change = rx.recv() => {
                let Some(change) = change else { break };
                if controller.on_event(&change, Instant::now()) {
                    if let Some(name) = change.changed_path.file_name() {
                        println!("[{}] Changed: {}", timestamp(), name.to_string_lossy());
                    }
                }
            }
            _ = sleep, if controller.deadline().is_some() => {
                let Some(tasks) = controller.poll(Instant::now()) else { continue };
                let tasks: Vec<String> = tasks.into_iter().collect();
                if options.config.clear_screen {
                    clear_screen();
                }
                println!("[{}] Building {}...", timestamp(), tasks.join(", "));

                let run = pipeline.run(&tasks, PassKind::Incremental);
                tokio::pin!(run);
                let report = loop {
                    tokio::select! {
                        report = &mut run => break report,
                        Some(change) = rx.recv() => {
                            controller.on_event(&change, Instant::now());
                        }
                    }
                };
                match report {
                    Ok(report) => finish_pass(&report, &mut tracker, reload.as_ref()),
                    Err(e) => eprintln!("[{}] Error: {}", timestamp(), e),
                }
                controller.finish(Instant::now());
                println!("[{}] Watching {} for changes...", timestamp(), options.root.display());
            }
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Stopping.", timestamp());
                break;
            }
        }
    }

    Ok(())
}

/// Report a completed pass and ask connected browsers to reload.
///
/// Failed passes reload too, so the page reflects whatever is on disk now.
fn finish_pass(report: &PassReport, tracker: &mut ErrorTracker, reload: Option<&ReloadHandle>) {
    for task in tracker.update(report) {
        println!("[{}] Fixed: {}", timestamp(), task);
    }
    print_report(report);
    if tracker.has_errors() {
        eprintln!("[{}] {} task(s) still failing", timestamp(), tracker.error_count());
    }
    if let Some(reload) = reload {
        reload.notify();
    }
}

/// Print a pass report to the console
pub fn print_report(report: &PassReport) {
    let summary = report.summary();
    if report.is_success() {
        println!("[{}] {}", timestamp(), summary);
    } else {
        eprintln!("[{}] {}", timestamp(), summary);
    }
}

fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Get current timestamp for logging
fn timestamp() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400; // seconds since midnight
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
