mod common;

use std::fs;
use std::time::Duration;

use tailall::{Diagnostic, RemoveReason};
use tempfile::tempdir;
use tokio::time;

#[tokio::test]
pub async fn test_lines_in_write_order() {
    let logdir = tempdir().unwrap();
    fs::write(logdir.path().join("a.log"), "").unwrap();

    let (root, mut rx, _log) = common::start(logdir.path());
    let logfile = root.join("a.log");

    let mut file = common::attach(&logfile).await;
    common::write(&mut file, "x\n");
    common::write(&mut file, "y\n");

    assert_eq!(
        common::take_lines(&mut rx, 2).await,
        vec![(logfile.clone(), "x".to_string()), (logfile, "y".to_string())]
    );
}

#[tokio::test]
pub async fn test_nested_directories() {
    let logdir = tempdir().unwrap();
    fs::create_dir_all(logdir.path().join("app/2024")).unwrap();
    fs::write(logdir.path().join("app/2024/deep.log"), "").unwrap();

    let (root, mut rx, _log) = common::start(logdir.path());
    let logfile = root.join("app/2024/deep.log");

    let mut file = common::attach(&logfile).await;
    common::write(&mut file, "from below\n");

    assert_eq!(
        common::take_lines(&mut rx, 1).await,
        vec![(logfile, "from below".to_string())]
    );
}

#[tokio::test]
pub async fn test_two_files_keep_their_order() {
    let logdir = tempdir().unwrap();
    fs::write(logdir.path().join("a.log"), "").unwrap();
    fs::write(logdir.path().join("b.log"), "").unwrap();

    let (root, mut rx, _log) = common::start(logdir.path());
    let a = root.join("a.log");
    let b = root.join("b.log");

    let mut file_a = common::attach(&a).await;
    let mut file_b = common::attach(&b).await;

    for i in 0..5 {
        common::write(&mut file_a, &format!("a{}\n", i));
        common::write(&mut file_b, &format!("b{}\n", i));
    }

    let lines = common::take_lines(&mut rx, 10).await;

    let from = |path: &std::path::Path| {
        lines
            .iter()
            .filter(|(source, _)| source == path)
            .map(|(_, line)| line.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(from(a.as_path()), vec!["a0", "a1", "a2", "a3", "a4"]);
    assert_eq!(from(b.as_path()), vec!["b0", "b1", "b2", "b3", "b4"]);
}

#[tokio::test]
pub async fn test_close_stops_watching() {
    let logdir = tempdir().unwrap();
    fs::write(logdir.path().join("a.log"), "").unwrap();

    let (root, mut rx, log) = common::start(logdir.path());
    let logfile = root.join("a.log");

    let mut file = common::attach(&logfile).await;
    common::write(&mut file, "last words\n");
    drop(file);

    assert_eq!(
        common::take_lines(&mut rx, 1).await,
        vec![(logfile.clone(), "last words".to_string())]
    );

    time::sleep(Duration::from_millis(300)).await;
    assert!(log
        .records()
        .contains(&Diagnostic::WatchRemoved(logfile, RemoveReason::Close)));
}
