//! Integration tests for the change observers
//!
//! These tests use temporary directories and real filesystem operations
//! to validate the observers' behavior in realistic scenarios.

use podsync_watcher::{
    create_observer, ChangeKind, DebounceCoordinator, IgnoreFile, ObserverKind, RawChange,
    TickOutcome, WatcherConfig, DEFAULT_PATTERNS, DOTFILE_PATTERN,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type Seen = Arc<Mutex<Vec<RawChange>>>;

struct Running {
    stop: CancellationToken,
    handle: JoinHandle<podsync_core::Result<()>>,
    seen: Seen,
}

fn start(root: &Path, kind: ObserverKind) -> Running {
    let config = WatcherConfig::builder()
        .poll_interval_ms(20)
        .observer(kind)
        .build();
    let ignore = IgnoreFile::in_root(root, ".podsyncignore");
    ignore.ensure_defaults().unwrap();

    let stop = CancellationToken::new();
    let seen: Seen = Arc::default();
    let mut observer = create_observer(&config, ignore, stop.clone());
    let sink = Arc::clone(&seen);
    let root = root.to_path_buf();
    let handle = std::thread::spawn(move || {
        observer.watch(&root, &move |change: RawChange| sink.lock().unwrap().push(change))
    });

    // Let the initial registration finish
    std::thread::sleep(Duration::from_millis(300));
    Running { stop, handle, seen }
}

fn wait_for(seen: &Seen, predicate: impl Fn(&RawChange) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if seen.lock().unwrap().iter().any(&predicate) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    false
}

fn ends_with(change: &RawChange, suffix: &str) -> bool {
    change.path.ends_with(suffix)
}

#[test]
fn test_file_creation_detection() {
    let dir = TempDir::new().unwrap();
    let running = start(dir.path(), ObserverKind::current());

    std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
    assert!(wait_for(&running.seen, |c| ends_with(c, "app.js")));

    running.stop.cancel();
    running.handle.join().unwrap().unwrap();
}

#[test]
fn test_new_directory_is_watched() {
    let dir = TempDir::new().unwrap();
    let running = start(dir.path(), ObserverKind::PerDirectory);

    let nested = dir.path().join("src/components");
    std::fs::create_dir_all(&nested).unwrap();
    // Give the observer time to register the new directories
    std::thread::sleep(Duration::from_millis(300));
    std::fs::write(nested.join("Button.tsx"), "export {}").unwrap();

    assert!(wait_for(&running.seen, |c| ends_with(
        c,
        "src/components/Button.tsx"
    )));

    running.stop.cancel();
    running.handle.join().unwrap().unwrap();
}

#[test]
fn test_excluded_paths_are_not_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
    let running = start(dir.path(), ObserverKind::PerDirectory);

    std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
    std::fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
    std::fs::write(dir.path().join("visible.txt"), "x").unwrap();

    assert!(wait_for(&running.seen, |c| ends_with(c, "visible.txt")));
    let seen = running.seen.lock().unwrap().clone();
    assert!(!seen
        .iter()
        .any(|c| c.path.components().any(|p| p.as_os_str() == "node_modules")));
    assert!(!seen.iter().any(|c| ends_with(c, ".env")));

    running.stop.cancel();
    running.handle.join().unwrap().unwrap();
}

#[test]
fn test_ignore_file_edits_apply_without_restart() {
    let dir = TempDir::new().unwrap();
    let running = start(dir.path(), ObserverKind::PerDirectory);

    let ignore = IgnoreFile::in_root(dir.path(), ".podsyncignore");
    ignore.add("*.tmp").unwrap();
    std::thread::sleep(Duration::from_millis(50));

    std::fs::write(dir.path().join("scratch.tmp"), "x").unwrap();
    std::fs::write(dir.path().join("kept.txt"), "x").unwrap();

    assert!(wait_for(&running.seen, |c| ends_with(c, "kept.txt")));
    assert!(!running
        .seen
        .lock()
        .unwrap()
        .iter()
        .any(|c| ends_with(c, "scratch.tmp")));

    running.stop.cancel();
    running.handle.join().unwrap().unwrap();
}

#[test]
fn test_ignore_rule_changes_update_watched_directories() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("fixtures")).unwrap();
    std::fs::create_dir_all(dir.path().join("vendor")).unwrap();
    std::fs::write(dir.path().join(".podsyncignore"), "fixtures\n").unwrap();
    let running = start(dir.path(), ObserverKind::PerDirectory);

    // Swap the rules: `fixtures` is now included, `vendor` excluded
    let mut rules = vec![DOTFILE_PATTERN, "vendor"];
    rules.extend_from_slice(DEFAULT_PATTERNS);
    std::fs::write(dir.path().join(".podsyncignore"), rules.join("\n") + "\n").unwrap();
    std::fs::write(dir.path().join("touch.txt"), "x").unwrap();
    assert!(wait_for(&running.seen, |c| ends_with(c, "touch.txt")));

    std::fs::write(dir.path().join("vendor/lib.js"), "x").unwrap();
    std::fs::write(dir.path().join("fixtures/data.json"), "{}").unwrap();
    assert!(
        wait_for(&running.seen, |c| ends_with(c, "fixtures/data.json")),
        "change inside a newly included directory was not reported"
    );
    std::fs::write(dir.path().join("after.txt"), "x").unwrap();
    assert!(wait_for(&running.seen, |c| ends_with(c, "after.txt")));
    assert!(!running
        .seen
        .lock()
        .unwrap()
        .iter()
        .any(|c| c.path.components().any(|p| p.as_os_str() == "vendor")));

    running.stop.cancel();
    running.handle.join().unwrap().unwrap();
}

#[test]
fn test_removal_is_reported() {
    let dir = TempDir::new().unwrap();
    let doomed = dir.path().join("doomed.txt");
    std::fs::write(&doomed, "x").unwrap();
    let running = start(dir.path(), ObserverKind::current());

    std::fs::remove_file(&doomed).unwrap();
    assert!(wait_for(&running.seen, |c| ends_with(c, "doomed.txt")
        && c.kind == ChangeKind::Removed));

    running.stop.cancel();
    running.handle.join().unwrap().unwrap();
}

#[test]
fn test_second_observer_on_same_root_is_rejected() {
    let dir = TempDir::new().unwrap();
    let running = start(dir.path(), ObserverKind::current());

    let config = WatcherConfig::default();
    let mut second = create_observer(
        &config,
        IgnoreFile::in_root(dir.path(), ".podsyncignore"),
        CancellationToken::new(),
    );
    let result = second.watch(dir.path(), &|_change: RawChange| {});
    assert!(result.is_err());

    running.stop.cancel();
    running.handle.join().unwrap().unwrap();
}

#[test]
fn test_missing_root_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = WatcherConfig::default();
    let missing = dir.path().join("missing");
    let mut observer = create_observer(
        &config,
        IgnoreFile::in_root(&missing, ".podsyncignore"),
        CancellationToken::new(),
    );
    assert!(observer.watch(&missing, &|_change: RawChange| {}).is_err());
}

#[tokio::test]
async fn test_observer_feeds_coordinator() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let config = WatcherConfig::builder()
        .poll_interval_ms(20)
        .quiet_period_ms(300)
        .build();
    let ignore = IgnoreFile::in_root(&root, ".podsyncignore");
    ignore.ensure_defaults().unwrap();

    let coordinator =
        Arc::new(DebounceCoordinator::new(&root, config.quiet_period()).with_exclusions(ignore.clone()));
    let stop = CancellationToken::new();
    let mut observer = create_observer(&config, ignore, stop.clone());
    let sink = Arc::clone(&coordinator);
    let watch_root = root.clone();
    let handle =
        tokio::task::spawn_blocking(move || observer.watch(&watch_root, sink.as_ref()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    for name in ["a.txt", "b.txt", "c.txt"] {
        tokio::fs::write(root.join(name), name).await.unwrap();
    }

    let flushed: Arc<Mutex<Vec<PathBuf>>> = Arc::default();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let target = Arc::clone(&flushed);
        let outcome = coordinator
            .tick(|paths| async move {
                target.lock().unwrap().extend(paths);
                Ok(())
            })
            .await
            .unwrap();
        if matches!(outcome, TickOutcome::Flushed { .. })
            && flushed.lock().unwrap().len() >= 3
        {
            break;
        }
        assert!(Instant::now() < deadline, "changes were never flushed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let flushed = flushed.lock().unwrap().clone();
    for name in ["a.txt", "b.txt", "c.txt"] {
        assert!(flushed.contains(&root.join(name)));
    }

    stop.cancel();
    handle.await.unwrap().unwrap();
}
