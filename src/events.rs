//! Everything related to watching directory trees for file modifications and
//! closes.

use std::collections::{HashSet, VecDeque};
use std::fmt::{self, Debug, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task;

use futures_util::stream::{Stream as FuturesStream, StreamExt};
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind};
use notify::{EventKind, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::Error;

/// The two kinds of filesystem notification the monitor reacts to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FsEventKind {
    /// New data was written to the file.
    Modified,
    /// A writer that had the file open for writing closed it.
    ClosedWrite,
}

/// A single `(path, kind)` notification.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FsEvent {
    path: PathBuf,
    kind: FsEventKind,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FsEventKind) -> Self {
        FsEvent {
            path: path.into(),
            kind,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        FsEvent::new(path, FsEventKind::Modified)
    }

    pub fn closed_write(path: impl Into<PathBuf>) -> Self {
        FsEvent::new(path, FsEventKind::ClosedWrite)
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn kind(&self) -> FsEventKind {
        self.kind
    }
}

/// How a root directory gets watched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WatchOptions {
    /// Watch every directory below the root, not just the root itself.
    pub recursive: bool,
    /// Also watch directories created after the root was added.
    pub auto_add: bool,
    /// Treat each root as a glob pattern and watch every match.
    pub glob: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions {
            recursive: true,
            auto_add: false,
            glob: false,
        }
    }
}

/// Watches directory trees, and can be polled to receive [`FsEvent`]s.
///
/// Internally, `MuxedEvents` contains a [`notify::Watcher`] from where raw
/// filesystem events are proxied. Only data modifications and write-closes
/// are passed on, one [`FsEvent`] per affected path.
///
/// [`notify::Watcher`]: ../notify/trait.Watcher.html
pub struct MuxedEvents {
    inner: notify::RecommendedWatcher,
    options: WatchOptions,
    /// Directories watched individually (non-recursively).
    watched_directories: HashSet<PathBuf>,
    /// Roots handed to notify, in whichever mode applies.
    roots: HashSet<PathBuf>,
    pending: VecDeque<Result<FsEvent, Error>>,
    event_stream: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
}

impl Debug for MuxedEvents {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("MuxedEvents")
            .field("options", &self.options)
            .field("watched_directories", &self.watched_directories)
            .field("roots", &self.roots)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl MuxedEvents {
    /// Constructs a new `MuxedEvents` instance with default options.
    pub fn new() -> Result<Self, Error> {
        Self::with_options(WatchOptions::default())
    }

    pub fn with_options(options: WatchOptions) -> Result<Self, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = notify::recommended_watcher(move |res| {
            // The only way `send` can fail is if the receiver is dropped,
            // and `MuxedEvents` controls both.
            let _ = tx.send(res);
        })?;

        Ok(MuxedEvents {
            inner,
            options,
            watched_directories: HashSet::new(),
            roots: HashSet::new(),
            pending: VecDeque::new(),
            event_stream: rx,
        })
    }

    pub fn options(&self) -> WatchOptions {
        self.options
    }

    /// Adds a root to watch. A directory is watched according to the
    /// [`WatchOptions`]; a plain file is watched on its own.
    ///
    /// Returns the canonicalized version of the path originally supplied,
    /// which is the prefix of every path reported for it.
    pub fn add_root(&mut self, path: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let path = absolutify(path.as_ref())?;

        if self.roots.contains(&path) {
            return Ok(path);
        }

        if !path.exists() {
            return Err(Error::AddFailure(path));
        }

        if !path.is_dir() {
            self.inner
                .watch(&path, RecursiveMode::NonRecursive)
                .map_err(|_e| Error::AddFailure(path.clone()))?;
        } else {
            match (self.options.recursive, self.options.auto_add) {
                // notify picks up new subdirectories on its own in this mode
                (true, true) => {
                    self.inner
                        .watch(&path, RecursiveMode::Recursive)
                        .map_err(|_e| Error::AddFailure(path.clone()))?;
                }
                (true, false) => self.add_tree(&path)?,
                (false, _) => self
                    .add_directory(&path)
                    .map_err(|_e| Error::AddFailure(path.clone()))?,
            }
        }

        self.roots.insert(path.clone());

        Ok(path)
    }

    /// Adds every root `path` names. With [`WatchOptions::glob`] set, `path`
    /// is a pattern and each matching directory becomes a root, in lexical
    /// order; a pattern matching no directory is an error.
    pub fn add_roots(&mut self, path: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
        let path = path.as_ref();

        if !self.options.glob {
            return Ok(vec![self.add_root(path)?]);
        }

        let pattern = path
            .to_str()
            .ok_or_else(|| Error::AddFailure(path.to_path_buf()))?;

        let mut roots = Vec::new();
        for entry in glob::glob(pattern)? {
            match entry {
                Ok(matched) if matched.is_dir() => roots.push(self.add_root(matched)?),
                Ok(_) => {}
                Err(e) => self.pending.push_back(Err(Error::SkippedDirectory(
                    e.path().to_path_buf(),
                    e.error().to_string(),
                ))),
            }
        }

        if roots.is_empty() {
            return Err(Error::AddFailure(path.to_path_buf()));
        }

        Ok(roots)
    }

    // The tree as it is right now, and nothing created later. Only the root
    // itself has to be watchable; anything below it that isn't is skipped
    // and reported through the stream.
    fn add_tree(&mut self, root: &Path) -> Result<(), Error> {
        self.add_directory(root)
            .map_err(|_e| Error::AddFailure(root.to_path_buf()))?;

        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => self.add_subdirectory(entry.path()),
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    self.pending
                        .push_back(Err(Error::SkippedDirectory(path, e.to_string())));
                }
            }
        }

        Ok(())
    }

    fn add_subdirectory(&mut self, path: &Path) {
        if let Err(e) = self.add_directory(path) {
            self.pending.push_back(Err(Error::SkippedDirectory(
                path.to_path_buf(),
                e.to_string(),
            )));
        }
    }

    fn add_directory(&mut self, path: impl AsRef<Path>) -> notify::Result<()> {
        let path = path.as_ref();

        if self.watched_directories.contains(path) {
            return Ok(());
        }

        self.inner.watch(path, RecursiveMode::NonRecursive)?;
        self.watched_directories.insert(path.to_path_buf());

        Ok(())
    }

    fn handle_event(&mut self, event: notify::Event) {
        if let EventKind::Create(create_kind) = event.kind {
            self.handle_create(create_kind, &event.paths);
            return;
        }

        if let Some(kind) = classify(&event.kind) {
            for path in event.paths {
                self.pending.push_back(Ok(FsEvent::new(path, kind)));
            }
        }
    }

    fn handle_create(&mut self, kind: CreateKind, paths: &[PathBuf]) {
        // Recursive roots with auto-add are followed by notify itself.
        if !self.options.auto_add || self.options.recursive {
            return;
        }

        for path in paths {
            let is_dir = match kind {
                CreateKind::Folder => true,
                // Some backends don't say what was created
                CreateKind::Any | CreateKind::Other => path.is_dir(),
                CreateKind::File => false,
            };
            let parent_watched = path
                .parent()
                .map(|parent| self.watched_directories.contains(parent))
                .unwrap_or(false);

            if is_dir && parent_watched {
                self.add_subdirectory(path);
            }
        }
    }

    /// Waits for the next event. Returns `None` once the underlying watcher
    /// has shut down.
    pub async fn next_event(&mut self) -> Option<Result<FsEvent, Error>> {
        self.next().await
    }
}

fn classify(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        // Windows returns `Any` for file modification, so handle that
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            Some(FsEventKind::Modified)
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(FsEventKind::ClosedWrite),
        _ => None,
    }
}

impl FuturesStream for MuxedEvents {
    type Item = Result<FsEvent, Error>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return task::Poll::Ready(Some(event));
            }

            match futures_util::ready!(self.event_stream.poll_recv(cx)) {
                None => return task::Poll::Ready(None),
                Some(Err(e)) => return task::Poll::Ready(Some(Err(e.into()))),
                Some(Ok(event)) => self.handle_event(event),
            }
        }
    }
}

fn absolutify(path: &Path) -> io::Result<PathBuf> {
    if let Ok(abs) = path.canonicalize() {
        return Ok(abs);
    }

    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
