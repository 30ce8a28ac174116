//! The event loop tying an event source to a [`Monitor`].

use std::path::Path;

use futures_util::pin_mut;
use futures_util::stream::{Stream as FuturesStream, StreamExt};

use crate::diagnostics::Diagnostic;
use crate::events::{FsEvent, MuxedEvents, WatchOptions};
use crate::monitor::Monitor;
use crate::sink::LineSink;
use crate::Error;

/// Feeds events to `monitor` one at a time, each handled to completion
/// before the next is pulled.
///
/// Returns `Ok(())` when the event stream ends or the sink is closed, and
/// every watcher has been closed either way, without diagnostics in the
/// latter case. Errors from the event source itself are logged and skipped.
pub async fn run<E, S>(events: E, monitor: &mut Monitor<S>) -> Result<(), Error>
where
    E: FuturesStream<Item = Result<FsEvent, Error>>,
    S: LineSink,
{
    pin_mut!(events);

    let res = loop {
        let event = match events.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                monitor
                    .diagnostics()
                    .record(Diagnostic::EventError(e.to_string()));
                continue;
            }
            None => break Ok(()),
        };

        match monitor.on_event(&event).await {
            Ok(()) => {}
            Err(Error::SinkClosed) => {
                monitor.abandon();
                return Ok(());
            }
            Err(e) => break Err(e),
        }
    };

    monitor.shutdown();

    res
}

/// Watches every root in `paths` (or every match, for glob patterns) and
/// tails the files beneath them into `monitor` until the sink is closed.
pub async fn watch_paths<I, P, S>(
    paths: I,
    options: WatchOptions,
    monitor: &mut Monitor<S>,
) -> Result<(), Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
    S: LineSink,
{
    let mut events = MuxedEvents::with_options(options)?;

    for path in paths {
        for root in events.add_roots(path)? {
            monitor.diagnostics().record(Diagnostic::WatchDir(root));
        }
    }

    run(events, monitor).await
}
