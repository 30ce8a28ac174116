//! Where captured lines go.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

/// A single line captured for a given source path, with its terminator
/// stripped.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Line {
    /// The path from where the line was read.
    source: PathBuf,
    line: String,
}

impl Line {
    pub fn new(source: impl Into<PathBuf>, line: impl Into<String>) -> Self {
        Line {
            source: source.into(),
            line: line.into(),
        }
    }

    /// Returns a reference to the file from where the line was read.
    pub fn source(&self) -> &Path {
        self.source.as_path()
    }

    /// Returns a reference to the line.
    pub fn line(&self) -> &str {
        self.line.as_str()
    }

    /// Returns the internal components that make up a `Line`. Hidden as the
    /// return signature may change.
    #[doc(hidden)]
    pub fn into_inner(self) -> (PathBuf, String) {
        let Line { source, line } = self;

        (source, line)
    }
}

/// Why a line could not be delivered.
#[derive(Debug)]
pub enum SinkError {
    /// The consumer is gone for good (broken pipe, dropped receiver). This is
    /// the signal for an orderly shutdown rather than an error.
    Closed,
    Io(io::Error),
}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::BrokenPipe {
            SinkError::Closed
        } else {
            SinkError::Io(e)
        }
    }
}

/// Consumer of captured lines.
pub trait LineSink {
    fn emit(&mut self, line: &Line) -> Result<(), SinkError>;
}

impl<S: LineSink + ?Sized> LineSink for Box<S> {
    fn emit(&mut self, line: &Line) -> Result<(), SinkError> {
        (**self).emit(line)
    }
}

/// Forwards lines into a channel. A dropped receiver reads as
/// [`SinkError::Closed`].
impl LineSink for mpsc::UnboundedSender<Line> {
    fn emit(&mut self, line: &Line) -> Result<(), SinkError> {
        self.send(line.clone()).map_err(|_| SinkError::Closed)
    }
}

/// Renders each line as `path<TAB>line<NEWLINE>`, flushing after every record.
#[derive(Debug)]
pub struct TsvWriter<W> {
    out: W,
}

impl TsvWriter<io::Stdout> {
    pub fn stdout() -> Self {
        TsvWriter::new(io::stdout())
    }
}

impl<W: Write> TsvWriter<W> {
    pub fn new(out: W) -> Self {
        TsvWriter { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LineSink for TsvWriter<W> {
    fn emit(&mut self, line: &Line) -> Result<(), SinkError> {
        writeln!(self.out, "{}\t{}", line.source().display(), line.line())?;
        self.out.flush()?;
        Ok(())
    }
}
