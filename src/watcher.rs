//! Everything related to reading newly appended lines of a single file.

use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::Instant;

use crate::diagnostics::{Diagnostic, Diagnostics};

/// Thresholds for the slow I/O warnings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WatcherConfig {
    /// A single line read taking longer than this is reported.
    pub slow_line: Duration,
    /// A full drain taking longer than this is reported.
    pub slow_drain: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            slow_line: Duration::from_millis(100),
            slow_drain: Duration::from_secs(1),
        }
    }
}

/// Tails one file: owns its handle and the byte offset just past the last
/// complete line handed out.
pub struct Watcher {
    path: PathBuf,
    reader: BufReader<File>,
    pos: u64,
    last_read: Instant,
    config: WatcherConfig,
    diagnostics: Arc<dyn Diagnostics>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("path", &self.path)
            .field("pos", &self.pos)
            .field("last_read", &self.last_read)
            .finish()
    }
}

impl Watcher {
    /// Opens `path` and attaches at its current end, so nothing written before
    /// this call is ever returned.
    pub async fn create(
        path: impl Into<PathBuf>,
        config: WatcherConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> io::Result<Self> {
        let path = path.into();
        let mut file = File::open(&path).await?;

        if file.metadata().await?.is_dir() {
            return Err(io::Error::new(io::ErrorKind::Other, "Is a directory"));
        }

        let pos = file.seek(SeekFrom::End(0)).await?;

        Ok(Watcher {
            path,
            reader: BufReader::new(file),
            pos,
            last_read: Instant::now(),
            config,
            diagnostics,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Offset just past the last complete line returned.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// When the file was last read, successfully, whether or not it had
    /// anything new.
    pub fn last_read(&self) -> Instant {
        self.last_read
    }

    /// Starts reading whatever complete lines were appended since the last
    /// drain. See [`Drain::next_line`].
    pub fn drain(&mut self) -> Drain<'_> {
        Drain {
            watcher: self,
            started: Instant::now(),
            buf: Vec::new(),
            state: DrainState::Start,
        }
    }

    /// Releases the file handle.
    pub fn close(self) {
        let Watcher { reader, .. } = self;
        drop(reader);
    }

    #[cfg(test)]
    pub(crate) fn replace_handle(&mut self, file: File) {
        self.reader = BufReader::new(file);
    }

    // Puts the handle back at the cursor, dropping any read-ahead. A file
    // shorter than the cursor has been truncated and is read from the start.
    async fn rewind(&mut self) -> io::Result<()> {
        let len = self.reader.get_ref().metadata().await?.len();
        if len < self.pos {
            self.pos = 0;
            self.diagnostics
                .record(Diagnostic::Truncated(self.path.clone()));
        }

        self.reader.seek(SeekFrom::Start(self.pos)).await?;

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DrainState {
    Start,
    Reading,
    Done,
}

/// A finite run over the complete lines currently available in a file.
///
/// Yields lines until the end of the file, or until only an unterminated
/// tail is left; that tail stays unread and is picked up by a later drain
/// once its newline arrives.
pub struct Drain<'a> {
    watcher: &'a mut Watcher,
    started: Instant,
    buf: Vec<u8>,
    state: DrainState,
}

impl fmt::Debug for Drain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drain")
            .field("watcher", &self.watcher)
            .field("state", &self.state)
            .finish()
    }
}

impl Drain<'_> {
    /// Returns the next complete line with its terminator stripped, or `None`
    /// once no further complete line is available. Keeps returning `None`
    /// after that; call [`Watcher::drain`] again to pick up later writes.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self.state {
            DrainState::Done => return Ok(None),
            DrainState::Start => {
                self.state = DrainState::Reading;
                if let Err(e) = self.watcher.rewind().await {
                    self.state = DrainState::Done;
                    return Err(e);
                }
            }
            DrainState::Reading => {}
        }

        self.buf.clear();

        let then = Instant::now();
        let res = self.watcher.reader.read_until(b'\n', &mut self.buf).await;
        let took = then.elapsed();
        if took > self.watcher.config.slow_line {
            self.watcher
                .diagnostics
                .record(Diagnostic::SlowLine(took, self.watcher.path.clone()));
        }

        let n = match res {
            Ok(n) => n,
            Err(e) => {
                self.state = DrainState::Done;
                return Err(e);
            }
        };
        self.watcher.last_read = then;

        if n == 0 || self.buf.last() != Some(&b'\n') {
            self.finish();
            return Ok(None);
        }

        self.watcher.pos += n as u64;

        Ok(Some(decode_line(&self.buf)))
    }

    /// Drives the drain to the end, collecting every line.
    pub async fn collect(mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    fn finish(&mut self) {
        self.state = DrainState::Done;

        let took = self.started.elapsed();
        if took > self.watcher.config.slow_drain {
            self.watcher
                .diagnostics
                .record(Diagnostic::SlowDrain(took, self.watcher.path.clone()));
        }
    }
}

fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }

    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemoryLog;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::tempdir;

    fn append(path: &Path, data: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(data.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    async fn watcher_for(path: &Path) -> (Watcher, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::new());
        let watcher = Watcher::create(path, WatcherConfig::default(), log.clone())
            .await
            .unwrap();
        (watcher, log)
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"foo\n"), "foo");
        assert_eq!(decode_line(b"foo\r\n"), "foo");
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b"a\tb\n"), "a\tb");
        assert_eq!(decode_line(b"caf\xc3\xa9\n"), "café");
    }

    #[tokio::test]
    async fn test_starts_at_end_of_file() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("old.log");
        fs::write(&path, "already\nthere\n").unwrap();

        let (mut watcher, _log) = watcher_for(&path).await;
        assert_eq!(watcher.position(), 14);
        assert!(watcher.drain().collect().await.unwrap().is_empty());

        append(&path, "new\n");
        assert_eq!(watcher.drain().collect().await.unwrap(), vec!["new"]);
        assert_eq!(watcher.position(), 18);
    }

    #[tokio::test]
    async fn test_lines_in_write_order() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("a.log");
        fs::write(&path, "").unwrap();

        let (mut watcher, _log) = watcher_for(&path).await;

        append(&path, "x\n");
        append(&path, "y\nz\n");
        assert_eq!(watcher.drain().collect().await.unwrap(), vec!["x", "y", "z"]);

        // Nothing new, nothing returned.
        assert!(watcher.drain().collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_terminator() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("partial.log");
        fs::write(&path, "").unwrap();

        let (mut watcher, _log) = watcher_for(&path).await;

        append(&path, "one\nOH");
        assert_eq!(watcher.drain().collect().await.unwrap(), vec!["one"]);
        assert_eq!(watcher.position(), 4);

        append(&path, "HAI");
        assert!(watcher.drain().collect().await.unwrap().is_empty());
        assert_eq!(watcher.position(), 4);

        append(&path, "\r\n");
        assert_eq!(watcher.drain().collect().await.unwrap(), vec!["OHHAI"]);
        assert_eq!(watcher.position(), 11);
    }

    #[tokio::test]
    async fn test_drain_is_finite_and_restartable() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("restart.log");
        fs::write(&path, "").unwrap();

        let (mut watcher, _log) = watcher_for(&path).await;
        append(&path, "a\nb\n");

        {
            let mut drain = watcher.drain();
            assert_eq!(drain.next_line().await.unwrap().as_deref(), Some("a"));
            // Abandoned halfway through.
        }

        append(&path, "c\n");
        let mut drain = watcher.drain();
        assert_eq!(drain.next_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(drain.next_line().await.unwrap().as_deref(), Some("c"));
        assert_eq!(drain.next_line().await.unwrap(), None);
        assert_eq!(drain.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncation_resets_cursor() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("trunc.log");
        fs::write(&path, "").unwrap();

        let (mut watcher, log) = watcher_for(&path).await;
        append(&path, "first line\nsecond line\n");
        assert_eq!(watcher.drain().collect().await.unwrap().len(), 2);

        fs::write(&path, "fresh\n").unwrap();
        assert_eq!(watcher.drain().collect().await.unwrap(), vec!["fresh"]);
        assert_eq!(watcher.position(), 6);
        assert!(log.records().contains(&Diagnostic::Truncated(path.clone())));
    }

    #[tokio::test]
    async fn test_create_missing_file() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("nope.log");

        let log = Arc::new(MemoryLog::new());
        let res = Watcher::create(&path, WatcherConfig::default(), log).await;
        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_directory() {
        let tmp_dir = tempdir().unwrap();

        let res = Watcher::create(
            tmp_dir.path(),
            WatcherConfig::default(),
            Arc::new(MemoryLog::new()),
        )
        .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_slow_reads_are_reported() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("slow.log");
        fs::write(&path, "").unwrap();

        let log = Arc::new(MemoryLog::new());
        let config = WatcherConfig {
            slow_line: Duration::ZERO,
            slow_drain: Duration::ZERO,
        };
        let mut watcher = Watcher::create(&path, config, log.clone()).await.unwrap();

        append(&path, "x\n");
        assert_eq!(watcher.drain().collect().await.unwrap(), vec!["x"]);

        let records = log.records();
        assert!(records
            .iter()
            .any(|r| matches!(r, Diagnostic::SlowLine(_, p) if p == &path)));
        assert!(records
            .iter()
            .any(|r| matches!(r, Diagnostic::SlowDrain(_, p) if p == &path)));
    }

    #[tokio::test]
    async fn test_fast_reads_are_quiet() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("fast.log");
        fs::write(&path, "").unwrap();

        let (mut watcher, log) = watcher_for(&path).await;
        append(&path, "x\n");
        watcher.drain().collect().await.unwrap();

        assert!(log.records().is_empty());
    }
}
