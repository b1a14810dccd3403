//! Watch mode integration tests
//!
//! Drives the watch controller by hand against an assembled pipeline, the way
//! the watch loop does, and checks the resulting passes and reloads.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

use stylebook::build::{BuildContext, BuildMode, PassKind, TaskError};
use stylebook::config::{default_config, WatchConfig};
use stylebook::serve::{ReloadChannel, ReloadScheduler};
use stylebook::stages::{assemble, DOCS, MEDIA, STYLES};
use stylebook::tools::{
    CompiledStyle, DocGenerator, DocRequest, StyleCompiler, StyleRequest, Toolchain,
};
use stylebook::watch::{ChangeKind, WatchController, WatchEvent, WatchState};

struct Passthrough;

#[async_trait]
impl StyleCompiler for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn compile(&self, request: &StyleRequest) -> Result<CompiledStyle, TaskError> {
        let css = fs::read_to_string(&request.entry).map_err(|e| TaskError::io("reading", e))?;
        Ok(CompiledStyle { css, ..CompiledStyle::default() })
    }
}

#[derive(Default)]
struct CountingDocs(AtomicUsize);

#[async_trait]
impl DocGenerator for CountingDocs {
    fn name(&self) -> &str {
        "docs"
    }

    async fn generate(&self, _request: &DocRequest) -> Result<Vec<String>, TaskError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("sass/components")).unwrap();
    fs::write(dir.path().join("sass/main.scss"), ".a { color: red; }").unwrap();
    fs::write(dir.path().join("sass/components/_old.scss"), ".old {}").unwrap();
    dir
}

fn event(root: &Path, relative: &str, kind: ChangeKind) -> WatchEvent {
    WatchEvent::new(root.join(relative), kind)
}

#[tokio::test]
async fn test_deleted_partial_reruns_styles_and_docs_with_one_reload() {
    let dir = project();
    let root = dir.path();
    let docs = Arc::new(CountingDocs::default());
    let tools = Toolchain { styles: Arc::new(Passthrough), docs: docs.clone(), scripts: None };
    let ctx = Arc::new(BuildContext::new(default_config(), root.to_path_buf(), BuildMode::Development).unwrap());
    let mut pipeline = assemble(ctx.clone(), &tools).unwrap();

    let initial = pipeline.run_all(PassKind::Full).await.unwrap();
    assert!(initial.is_success(), "{}", initial.summary());
    assert_eq!(docs.0.load(Ordering::SeqCst), 1);

    let mut controller = WatchController::new(pipeline.graph(), &WatchConfig::default())
        .unwrap()
        .ignore_dir(ctx.out_dir());
    assert_eq!(controller.state(), WatchState::Idle);

    let channel = ReloadChannel::new();
    let mut reloads = channel.subscribe();
    let reload = ReloadScheduler::new(channel, Duration::from_millis(20), Duration::from_millis(100))
        .spawn();

    fs::remove_file(root.join("sass/components/_old.scss")).unwrap();
    let t0 = Instant::now();
    assert!(controller.on_event(&event(root, "sass/components/_old.scss", ChangeKind::Removed), t0));
    assert_eq!(controller.state(), WatchState::Debouncing);
    assert!(controller.pending().contains(STYLES));

    // Output written by the pass itself is not a change
    assert!(!controller.on_event(&event(root, "dist/css/main.css", ChangeKind::Changed), t0));

    assert!(controller.poll(t0 + Duration::from_millis(100)).is_none());
    let tasks: Vec<String> = controller.poll(t0 + Duration::from_millis(300)).unwrap().into_iter().collect();
    assert_eq!(controller.state(), WatchState::Running);
    assert_eq!(tasks, vec![DOCS.to_string(), STYLES.to_string()]);

    let report = pipeline.run(&tasks, PassKind::Incremental).await.unwrap();
    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.ran(), vec![STYLES, DOCS]);
    assert!(report.task(MEDIA).is_none());
    assert_eq!(docs.0.load(Ordering::SeqCst), 2);

    reload.notify();
    controller.finish(Instant::now());
    assert_eq!(controller.state(), WatchState::Idle);

    tokio::time::timeout(Duration::from_secs(5), reloads.recv()).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(reloads.try_recv().is_err());
}

#[tokio::test]
async fn test_config_change_reruns_everything() {
    let dir = project();
    let root = dir.path();
    let tools = Toolchain {
        styles: Arc::new(Passthrough),
        docs: Arc::new(CountingDocs::default()),
        scripts: None,
    };
    let ctx = Arc::new(BuildContext::new(default_config(), root.to_path_buf(), BuildMode::Development).unwrap());
    let pipeline = assemble(ctx, &tools).unwrap();

    let mut controller = WatchController::new(pipeline.graph(), &WatchConfig::default())
        .unwrap()
        .with_config_file(root.join("stylebook.toml"));

    let t0 = Instant::now();
    controller.on_event(&event(root, "stylebook.toml", ChangeKind::Changed), t0);
    let tasks = controller.poll(t0 + Duration::from_secs(1)).unwrap();
    assert_eq!(tasks.len(), pipeline.graph().len());
}

#[tokio::test]
async fn test_burst_of_events_is_one_run_over_the_union() {
    let dir = project();
    let root = dir.path();
    let tools = Toolchain {
        styles: Arc::new(Passthrough),
        docs: Arc::new(CountingDocs::default()),
        scripts: None,
    };
    let ctx = Arc::new(BuildContext::new(default_config(), root.to_path_buf(), BuildMode::Development).unwrap());
    let pipeline = assemble(ctx, &tools).unwrap();
    let mut controller = WatchController::new(pipeline.graph(), &WatchConfig::default()).unwrap();

    let t0 = Instant::now();
    let step = Duration::from_millis(50);
    controller.on_event(&event(root, "sass/main.scss", ChangeKind::Changed), t0);
    controller.on_event(&event(root, "fonts/new.woff", ChangeKind::Added), t0 + step);
    controller.on_event(&event(root, "sass/_vars.scss", ChangeKind::Added), t0 + step * 2);
    controller.on_event(&event(root, "sass/.#main.scss", ChangeKind::Added), t0 + step * 3);

    let mut runs = Vec::new();
    let mut now = t0;
    while now < t0 + Duration::from_secs(2) {
        if let Some(tasks) = controller.poll(now) {
            runs.push(tasks);
            controller.finish(now);
        }
        now += Duration::from_millis(10);
    }

    assert_eq!(runs.len(), 1);
    assert!(runs[0].contains(STYLES) && runs[0].contains(DOCS) && runs[0].contains(MEDIA));
}
