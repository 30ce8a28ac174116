use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to add path to watch: {}", .0.display())]
    AddFailure(PathBuf),
    #[error("Skipped directory {}: {}", .0.display(), .1)]
    SkippedDirectory(PathBuf, String),
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Event source error: {0}")]
    Notify(#[from] notify::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The downstream consumer went away. Not a failure; callers should shut
    /// down quietly.
    #[error("Output sink closed")]
    SinkClosed,
    #[error("Failed to write line: {0}")]
    Sink(io::Error),
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::Closed => Error::SinkClosed,
            SinkError::Io(e) => Error::Sink(e),
        }
    }
}
