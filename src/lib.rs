//! Tail every file under a directory.
//!
//! Files beneath the watched roots that are being appended to are discovered
//! through filesystem notifications (driven by [`notify`](https://crates.io/crates/notify)),
//! and their new lines are merged into a single stream of `(path, line)`
//! pairs.
//!
//! ## Example
//!
//! ```no_run
//! use tailall::{watch_paths, Monitor, TsvWriter, WatchOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tailall::Error> {
//!     // Prints `path<TAB>line` for every line appended under /var/log.
//!     let mut monitor = Monitor::new(TsvWriter::stdout());
//!
//!     watch_paths(["/var/log"], WatchOptions::default(), &mut monitor).await
//! }
//! ```
//!
//! ## Caveats
//!
//! A file starts being tailed on its first modification, attaching at the end
//! of whatever it holds by then. The write that triggered the watch is
//! therefore not reported; a file that is opened, written once and closed
//! (`echo hi >> logfile`) yields nothing.
//!
//! Writers are assumed to write whole lines. A line is reported only once its
//! newline is on disk, so a writer that flushes a line in pieces can see it
//! reported after lines other files wrote later.

mod diagnostics;
mod dispatch;
mod error;
mod events;
mod monitor;
mod sink;
mod watcher;

pub use diagnostics::{Diagnostic, Diagnostics, JsonLog, MemoryLog, RemoveReason, Severity};
pub use dispatch::{run, watch_paths};
pub use error::Error;
pub use events::{FsEvent, FsEventKind, MuxedEvents, WatchOptions};
pub use monitor::{Monitor, MonitorConfig};
pub use sink::{Line, LineSink, SinkError, TsvWriter};
pub use watcher::{Drain, Watcher, WatcherConfig};

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
