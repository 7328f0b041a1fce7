//! 병렬 순회 통합 테스트

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use layerscan_inspector::InspectorError;
use layerscan_inspector::walker::{WalkOptions, walk_dir};
use tokio_util::sync::CancellationToken;

fn populate(root: &Path, files: usize) {
    for i in 0..files {
        let dir = root.join(format!("d{}", i % 7));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("f{i}.txt")), format!("{i}")).unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_file_is_delivered_once() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 200);

    let opts = WalkOptions {
        concurrency: 8,
        ..Default::default()
    };
    let mut paths = Vec::new();
    walk_dir(
        dir.path(),
        &opts,
        &CancellationToken::new(),
        |path, _, _| Ok(Some(path.to_owned())),
        |path| {
            paths.push(path);
            Ok(())
        },
    )
    .await
    .unwrap();

    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn skip_lists_prune_files_and_dirs() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 14);

    let opts = WalkOptions {
        concurrency: 2,
        skip_files: vec!["d1/f1.txt".to_owned()],
        skip_dirs: vec!["d0".to_owned()],
    };
    let mut paths = Vec::new();
    walk_dir(
        dir.path(),
        &opts,
        &CancellationToken::new(),
        |path, _, _| Ok(Some(path.to_owned())),
        |path| {
            paths.push(path);
            Ok(())
        },
    )
    .await
    .unwrap();

    assert!(!paths.iter().any(|p| p.starts_with("d0/")));
    assert!(!paths.contains(&"d1/f1.txt".to_owned()));
    assert!(paths.contains(&"d1/f8.txt".to_owned()));
    assert_eq!(paths.len(), 14 - 2 - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn on_result_error_stops_delivery() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 500);

    let mut calls = 0;
    let err = walk_dir(
        dir.path(),
        &WalkOptions::default(),
        &CancellationToken::new(),
        |_, _, _| Ok(Some(())),
        |()| {
            calls += 1;
            Err(InspectorError::Artifact("stop".to_owned()))
        },
    )
    .await
    .unwrap_err();

    assert_eq!(calls, 1);
    assert!(err.to_string().starts_with("on result"), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn on_file_error_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 50);

    let err = walk_dir(
        dir.path(),
        &WalkOptions::default(),
        &CancellationToken::new(),
        |path, _, _| {
            if path.ends_with("f13.txt") {
                return Err(InspectorError::Artifact("bad file".to_owned()));
            }
            Ok(None::<()>)
        },
        |()| Ok(()),
    )
    .await
    .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("f13.txt"), "{message}");
    assert!(message.contains("bad file"), "{message}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn external_cancel_returns_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path(), 300);

    let cancel = CancellationToken::new();
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    let trigger = cancel.clone();

    let err = walk_dir(
        dir.path(),
        &WalkOptions {
            concurrency: 2,
            ..Default::default()
        },
        &cancel,
        move |_, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 5 {
                trigger.cancel();
            }
            Ok(Some(()))
        },
        |()| Ok(()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, InspectorError::Cancelled));
    assert!(processed.load(Ordering::SeqCst) < 300);
}
