use std::time::{Duration, SystemTime};

use upload_assembler::upload::GarbageCollector;

const HOUR: Duration = Duration::from_secs(3600);

fn make_upload_dir(root: &std::path::Path, name: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("0"), b"fragment").unwrap();
    std::fs::write(dir.join("1"), b"fragment").unwrap();
}

#[tokio::test]
async fn test_sweep_removes_expired_directories() {
    let dir = tempfile::tempdir().unwrap();
    make_upload_dir(dir.path(), "abandoned");
    let gc = GarbageCollector::new(dir.path(), 1.0, HOUR);

    let stats = gc.sweep_at(SystemTime::now() + 2 * HOUR).await;

    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.failed, 0);
    assert!(!dir.path().join("abandoned").exists());
}

#[tokio::test]
async fn test_sweep_keeps_fresh_directories() {
    let dir = tempfile::tempdir().unwrap();
    make_upload_dir(dir.path(), "in-progress");
    let gc = GarbageCollector::new(dir.path(), 1.0, HOUR);

    let stats = gc.sweep().await;

    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.removed, 0);
    assert!(dir.path().join("in-progress").join("0").exists());
}

#[tokio::test]
async fn test_sweep_skips_plain_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("stray-file"), b"not an upload").unwrap();
    let gc = GarbageCollector::new(dir.path(), 1.0, HOUR);

    let stats = gc.sweep_at(SystemTime::now() + 2 * HOUR).await;

    assert_eq!(stats.scanned, 0);
    assert_eq!(stats.removed, 0);
    assert!(dir.path().join("stray-file").exists());
}

#[tokio::test]
async fn test_sweep_of_missing_root_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let gc = GarbageCollector::new(dir.path().join("missing"), 1.0, HOUR);

    let stats = gc.sweep().await;
    assert_eq!(stats.removed, 0);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_maybe_run_with_certain_probability_sweeps() {
    let dir = tempfile::tempdir().unwrap();
    make_upload_dir(dir.path(), "fresh");
    let gc = GarbageCollector::new(dir.path(), 1.0, HOUR);

    let stats = gc.maybe_run().await.expect("probability 1 always sweeps");
    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.removed, 0);
}

#[tokio::test]
async fn test_maybe_run_with_zero_probability_never_sweeps() {
    let dir = tempfile::tempdir().unwrap();
    let gc = GarbageCollector::new(dir.path(), 0.0, HOUR);

    for _ in 0..100 {
        assert!(gc.maybe_run().await.is_none());
    }
}

#[tokio::test]
async fn test_periodic_sweeper_runs_on_interval() {
    let dir = tempfile::tempdir().unwrap();
    make_upload_dir(dir.path(), "old");
    // Let the directory age past a zero expiry.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let gc = std::sync::Arc::new(GarbageCollector::new(dir.path(), 1.0, Duration::ZERO));

    let handle = gc.spawn_periodic(Duration::from_millis(20));
    for _ in 0..100 {
        if !dir.path().join("old").exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();

    assert!(!dir.path().join("old").exists());
}
