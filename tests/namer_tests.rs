use std::collections::HashSet;
use std::sync::Arc;

use upload_assembler::upload::{UniqueNamer, UploadError};

#[tokio::test]
async fn test_free_name_is_used_as_is() {
    let dir = tempfile::tempdir().unwrap();
    let namer = UniqueNamer::default();

    let path = namer.allocate(dir.path(), "report.pdf").await.unwrap();

    assert_eq!(path, dir.path().join("report.pdf"));
    // A placeholder now reserves the name
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[tokio::test]
async fn test_taken_name_gets_numeric_suffix() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("report.pdf"), b"existing").unwrap();
    let namer = UniqueNamer::default();

    let path = namer.allocate(dir.path(), "report.pdf").await.unwrap();
    let name = path.file_name().unwrap().to_str().unwrap().to_string();

    let suffix = name
        .strip_prefix("report-")
        .and_then(|rest| rest.strip_suffix(".pdf"))
        .expect("name should look like report-<n>.pdf");
    let n: u64 = suffix.parse().unwrap();
    assert!((1..=999).contains(&n));

    // The original file is untouched
    assert_eq!(std::fs::read(dir.path().join("report.pdf")).unwrap(), b"existing");
}

#[tokio::test]
async fn test_name_without_extension() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Makefile"), b"all:").unwrap();

    let path = UniqueNamer::default()
        .allocate(dir.path(), "Makefile")
        .await
        .unwrap();
    let name = path.file_name().unwrap().to_str().unwrap();

    assert!(name.starts_with("Makefile-"));
    assert!(!name.contains('.'));
}

#[tokio::test]
async fn test_repeated_allocations_never_collide() {
    let dir = tempfile::tempdir().unwrap();
    let namer = UniqueNamer::default();

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let path = namer.allocate(dir.path(), "photo.jpg").await.unwrap();
        assert!(seen.insert(path));
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 20);
}

#[tokio::test]
async fn test_concurrent_allocations_never_collide() {
    let dir = Arc::new(tempfile::tempdir().unwrap());
    let namer = Arc::new(UniqueNamer::default());

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let dir = Arc::clone(&dir);
            let namer = Arc::clone(&namer);
            tokio::spawn(async move { namer.allocate(dir.path(), "same.txt").await })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let path = handle.await.unwrap().unwrap();
        assert!(seen.insert(path), "two uploads received the same name");
    }
}

#[tokio::test]
async fn test_exhaustion_is_an_allocation_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("only.txt"), b"x").unwrap();

    // A single attempt can only try the original name.
    let err = UniqueNamer::new(1)
        .allocate(dir.path(), "only.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Allocation(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_missing_directory_is_an_allocation_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    let err = UniqueNamer::default()
        .allocate(&missing, "a.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Allocation(_)));
}
