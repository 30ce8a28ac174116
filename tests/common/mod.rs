use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tailall::{run, Line, MemoryLog, Monitor, MonitorConfig, MuxedEvents};
use tokio::sync::mpsc;
use tokio::time;

/// Watches `dir` in a background task. Returns the canonical root and the
/// receiving end of the line stream.
pub fn start(dir: &Path) -> (PathBuf, mpsc::UnboundedReceiver<Line>, Arc<MemoryLog>) {
    let mut events = MuxedEvents::new().unwrap();
    let root = events.add_root(dir).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let log = Arc::new(MemoryLog::new());
    let mut monitor = Monitor::with_config(tx, MonitorConfig::default(), log.clone());

    tokio::spawn(async move {
        run(events, &mut monitor).await.unwrap();
    });

    (root, rx, log)
}

/// Opens an existing file for appending and writes a first line, so that the
/// monitor attaches to it. Nothing written so far will be reported.
pub async fn attach(path: &Path) -> File {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    write(&mut file, "seed\n");
    time::sleep(Duration::from_millis(300)).await;
    file
}

pub fn write(file: &mut File, data: &str) {
    file.write_all(data.as_bytes()).unwrap();
    file.flush().unwrap();
}

pub async fn take_lines(
    rx: &mut mpsc::UnboundedReceiver<Line>,
    n: usize,
) -> Vec<(PathBuf, String)> {
    let mut lines = Vec::with_capacity(n);
    while lines.len() < n {
        let line = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for lines")
            .expect("line stream ended");
        lines.push(line.into_inner());
    }
    lines
}
