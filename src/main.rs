//! Tail every file under the given directories.
//!
//! Usage:
//!     tailall log_dir [log_dir ...]
//!
//! Lines go to stdout as `path<TAB>line`, diagnostics to stderr. Closing the
//! reading end of the pipe (`tailall /var/log | head`) ends the program
//! quietly.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use tailall::{watch_paths, JsonLog, Monitor, MonitorConfig, TsvWriter, WatchOptions};

#[derive(Debug, Parser)]
#[command(name = "tailall", version, about = "Tail every file under a directory")]
struct Args {
    /// Directories to watch, or glob patterns with --glob
    dirs: Vec<PathBuf>,

    /// Sweep for idle files every this many events
    #[arg(long, default_value_t = 10_000)]
    gc_interval: u64,

    /// Stop tailing a file after this many seconds without a read
    #[arg(long, default_value_t = 180)]
    gc_stale_age: u64,

    /// Only watch the top level of each directory
    #[arg(long)]
    no_recursive: bool,

    /// Also watch directories created after startup
    #[arg(long)]
    auto_add: bool,

    /// Treat each argument as a glob pattern, e.g. '/srv/*/logs'
    #[arg(long)]
    glob: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.dirs.is_empty() {
        eprintln!("{}", Args::command().render_usage());
        return ExitCode::from(1);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_level(false)
        .with_target(false)
        .init();

    let config = MonitorConfig {
        gc_interval: args.gc_interval,
        gc_stale_age: Duration::from_secs(args.gc_stale_age),
        ..MonitorConfig::default()
    };
    let options = WatchOptions {
        recursive: !args.no_recursive,
        auto_add: args.auto_add,
        glob: args.glob,
    };

    let mut monitor = Monitor::with_config(TsvWriter::stdout(), config, Arc::new(JsonLog));

    // A closed stdout comes back as `Ok` as well.
    match watch_paths(&args.dirs, options, &mut monitor).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
