//! Prints the modify/close event stream for a given set of directories.
//!
//! Usage:
//!     events /path/to/dir1 /path/to/dir2 ...
//!
//! Assumes some files below them will eventually be written to in order to
//! generate events.

use tailall::MuxedEvents;

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut events = MuxedEvents::new()?;

    for dir in args {
        events.add_root(&dir)?;
    }

    while let Some(event) = events.next_event().await {
        match event {
            Ok(event) => println!("event: {:?} {}", event.kind(), event.path().display()),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    Ok(())
}
