//! Prints lines appended to any file below the given directories, fed
//! through a channel rather than straight to stdout.
//!
//! Usage:
//!     lines /path/to/dir1 /path/to/dir2 ...

use std::sync::Arc;

use tokio::sync::mpsc;

use tailall::{watch_paths, JsonLog, Line, Monitor, MonitorConfig, WatchOptions};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let (tx, mut rx) = mpsc::unbounded_channel::<Line>();

    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("({}) {}", line.source().display(), line.line());
        }
    });

    let mut monitor = Monitor::with_config(tx, MonitorConfig::default(), Arc::new(JsonLog));
    watch_paths(&args, WatchOptions::default(), &mut monitor).await?;

    drop(monitor);
    printer.await?;

    Ok(())
}
