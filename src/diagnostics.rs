//! Side-channel records about what the monitor is doing.
//!
//! Nothing here ever reaches the line output. Every record renders as a JSON
//! array of a unix timestamp followed by string fields, e.g.
//! `[1700000000,"unwatch","/var/log/app.log","gc"]`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

/// Why a watcher was dropped from the monitor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RemoveReason {
    /// The writer closed the file.
    Close,
    /// No reads for longer than the stale age.
    Gc,
    /// Reading the file failed.
    Error,
}

impl RemoveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoveReason::Close => "close",
            RemoveReason::Gc => "gc",
            RemoveReason::Error => "error",
        }
    }
}

impl fmt::Display for RemoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    WatchDir(PathBuf),
    WatchStarted(PathBuf),
    WatchRemoved(PathBuf, RemoveReason),
    /// Opening the file failed, so no watcher was registered.
    WatchError(PathBuf, String),
    ReadError(PathBuf, String),
    SlowLine(Duration, PathBuf),
    SlowDrain(Duration, PathBuf),
    Truncated(PathBuf),
    EventError(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

fn tag(s: &str) -> Value {
    Value::String(s.to_string())
}

fn path_field(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

fn secs_field(d: &Duration) -> Value {
    Value::String(format!("{:.6}", d.as_secs_f64()))
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::WatchDir(_)
            | Diagnostic::WatchStarted(_)
            | Diagnostic::WatchRemoved(..) => Severity::Info,
            Diagnostic::SlowLine(..) | Diagnostic::SlowDrain(..) | Diagnostic::Truncated(_) => {
                Severity::Warn
            }
            Diagnostic::WatchError(..) | Diagnostic::ReadError(..) | Diagnostic::EventError(_) => {
                Severity::Error
            }
        }
    }

    /// The string fields of the record, without the timestamp.
    pub fn fields(&self) -> Vec<Value> {
        match self {
            Diagnostic::WatchDir(path) => vec![tag("watch dir"), path_field(path)],
            Diagnostic::WatchStarted(path) => vec![tag("watch file"), path_field(path)],
            Diagnostic::WatchRemoved(path, reason) => {
                vec![tag("unwatch"), path_field(path), tag(reason.as_str())]
            }
            Diagnostic::WatchError(path, desc) => {
                vec![tag("error"), path_field(path), tag(desc.as_str())]
            }
            Diagnostic::ReadError(path, desc) => {
                vec![tag("read error"), path_field(path), tag(desc.as_str())]
            }
            Diagnostic::SlowLine(took, path) => {
                vec![tag("slow"), secs_field(took), path_field(path)]
            }
            Diagnostic::SlowDrain(took, path) => {
                vec![tag("slow drain"), secs_field(took), path_field(path)]
            }
            Diagnostic::Truncated(path) => vec![tag("truncated"), path_field(path)],
            Diagnostic::EventError(desc) => vec![tag("event error"), tag(desc.as_str())],
        }
    }

    /// Renders the record stamped with the given unix time.
    pub fn to_record(&self, unix_secs: u64) -> Value {
        let mut record = Vec::with_capacity(4);
        record.push(Value::from(unix_secs));
        record.extend(self.fields());
        Value::Array(record)
    }
}

/// Collaborator that receives every diagnostic. Shared between the monitor and
/// each of its watchers.
pub trait Diagnostics: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Emits records through `tracing` at a level matching their severity.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLog;

impl Diagnostics for JsonLog {
    fn record(&self, diagnostic: Diagnostic) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let record = diagnostic.to_record(now);

        match diagnostic.severity() {
            Severity::Info => tracing::info!("{}", record),
            Severity::Warn => tracing::warn!("{}", record),
            Severity::Error => tracing::error!("{}", record),
        }
    }
}

/// Keeps every record in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<Vec<Diagnostic>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl Diagnostics for MemoryLog {
    fn record(&self, diagnostic: Diagnostic) {
        if let Ok(mut records) = self.records.lock() {
            records.push(diagnostic);
        }
    }
}
