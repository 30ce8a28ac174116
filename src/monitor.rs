//! The set of active watchers and what happens to them on each event.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::diagnostics::{Diagnostic, Diagnostics, JsonLog, RemoveReason};
use crate::events::{FsEvent, FsEventKind};
use crate::sink::{Line, LineSink};
use crate::watcher::{Watcher, WatcherConfig};
use crate::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonitorConfig {
    /// Sweep for stale watchers every this many events. Zero disables the
    /// sweep.
    pub gc_interval: u64,
    /// A watcher not read for longer than this is closed by the sweep.
    pub gc_stale_age: Duration,
    pub watcher: WatcherConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            gc_interval: 10_000,
            gc_stale_age: Duration::from_secs(180),
            watcher: WatcherConfig::default(),
        }
    }
}

/// Keeps at most one [`Watcher`] per path and forwards everything they read
/// to a [`LineSink`].
///
/// A path starts being watched on its first modification, and stops on a
/// write-close, when its watcher goes stale, or when reading it fails. The
/// monitor is the only owner of open file handles.
pub struct Monitor<S> {
    watchers: HashMap<PathBuf, Watcher>,
    events_seen: u64,
    config: MonitorConfig,
    sink: S,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<S> fmt::Debug for Monitor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("watchers", &self.watchers)
            .field("events_seen", &self.events_seen)
            .field("config", &self.config)
            .finish()
    }
}

impl<S: LineSink> Monitor<S> {
    /// A monitor with default settings, logging through `tracing`.
    pub fn new(sink: S) -> Self {
        Monitor::with_config(sink, MonitorConfig::default(), Arc::new(JsonLog))
    }

    pub fn with_config(sink: S, config: MonitorConfig, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Monitor {
            watchers: HashMap::new(),
            events_seen: 0,
            config,
            sink,
            diagnostics,
        }
    }

    /// Handles a single event to completion, including reading every line it
    /// made available.
    ///
    /// Returns [`Error::SinkClosed`] once the sink stops accepting lines.
    pub async fn on_event(&mut self, event: &FsEvent) -> Result<(), Error> {
        self.events_seen += 1;

        match event.kind() {
            FsEventKind::Modified => self.handle_modified(event.path()).await?,
            FsEventKind::ClosedWrite => {
                self.remove(event.path(), RemoveReason::Close);
            }
        }

        if self.config.gc_interval > 0 && self.events_seen % self.config.gc_interval == 0 {
            self.gc();
        }

        Ok(())
    }

    async fn handle_modified(&mut self, path: &Path) -> Result<(), Error> {
        if !self.watchers.contains_key(path) {
            match Watcher::create(path, self.config.watcher, self.diagnostics.clone()).await {
                Ok(watcher) => {
                    self.watchers.insert(path.to_path_buf(), watcher);
                    self.diagnostics
                        .record(Diagnostic::WatchStarted(path.to_path_buf()));
                }
                Err(e) => {
                    // The next modification will try again
                    self.diagnostics
                        .record(Diagnostic::WatchError(path.to_path_buf(), e.to_string()));
                    return Ok(());
                }
            }
        }

        let watcher = match self.watchers.get_mut(path) {
            Some(watcher) => watcher,
            None => return Ok(()),
        };

        let mut drain = watcher.drain();
        let failure = loop {
            match drain.next_line().await {
                Ok(Some(line)) => self.sink.emit(&Line::new(path, line))?,
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };

        if let Some(e) = failure {
            self.diagnostics
                .record(Diagnostic::ReadError(path.to_path_buf(), e.to_string()));
            self.remove(path, RemoveReason::Error);
        }

        Ok(())
    }

    /// Closes and forgets the watcher for `path`, if any. Returns whether
    /// there was one.
    pub fn remove(&mut self, path: &Path, reason: RemoveReason) -> bool {
        match self.watchers.remove(path) {
            Some(watcher) => {
                watcher.close();
                self.diagnostics
                    .record(Diagnostic::WatchRemoved(path.to_path_buf(), reason));
                true
            }
            None => false,
        }
    }

    /// Closes every watcher that has not been read for longer than the stale
    /// age.
    pub fn gc(&mut self) {
        let now = Instant::now();
        let stale_age = self.config.gc_stale_age;

        let stale: Vec<PathBuf> = self
            .watchers
            .iter()
            .filter(|(_, watcher)| now.saturating_duration_since(watcher.last_read()) > stale_age)
            .map(|(path, _)| path.clone())
            .collect();

        for path in stale {
            self.remove(&path, RemoveReason::Gc);
        }
    }

    /// Closes every watcher.
    pub fn shutdown(&mut self) {
        let paths: Vec<PathBuf> = self.watchers.keys().cloned().collect();

        for path in paths {
            self.remove(&path, RemoveReason::Close);
        }
    }

    /// Closes every watcher without recording anything. Used when output is
    /// gone and the process is on its way out.
    pub fn abandon(&mut self) {
        for (_, watcher) in self.watchers.drain() {
            watcher.close();
        }
    }

    pub fn is_watching(&self, path: impl AsRef<Path>) -> bool {
        self.watchers.contains_key(path.as_ref())
    }

    /// Paths currently being watched, in no particular order.
    pub fn watched(&self) -> impl Iterator<Item = &Path> {
        self.watchers.keys().map(PathBuf::as_path)
    }

    pub fn watcher(&self, path: impl AsRef<Path>) -> Option<&Watcher> {
        self.watchers.get(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Number of events handled so far.
    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &dyn Diagnostics {
        self.diagnostics.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(mut self) -> S {
        self.shutdown();
        let Monitor { sink, .. } = self;
        sink
    }
}
