//! Offline queue commands: save without sending, count, print.

use std::path::Path;

use tracing::debug;

use crate::cli::Cli;
use crate::commands::{build_pipeline, heartbeat as heartbeat_cmd};
use crate::config::Settings;
use crate::error::Error;
use crate::heartbeat::Heartbeat;
use crate::offline::{Queue, QueueSender, PRINT_MAX_DEFAULT};
use crate::pipeline::NoopSender;

/// Save heartbeats to the offline queue without trying the API.
///
/// Used when the batch exceeds the send limit, when sending is rate
/// limited, and when the API returned an auth error. Without an explicit
/// batch, the main heartbeat and stdin extras are built from the flags.
pub fn save_heartbeats(
    cli: &Cli,
    settings: &Settings,
    heartbeats: Option<Vec<Heartbeat>>,
    queue_path: &Path,
) -> Result<(), Error> {
    let heartbeats =
        heartbeats.unwrap_or_else(|| heartbeat_cmd::build_heartbeats(cli, settings));

    save_batch(settings, heartbeats, queue_path)
}

/// Run an already-built batch through the enrichment pipeline into the
/// queue.
pub fn save_batch(
    settings: &Settings,
    heartbeats: Vec<Heartbeat>,
    queue_path: &Path,
) -> Result<(), Error> {
    if settings.offline_disabled {
        return Err(Error::Generic("saving to offline queue disabled".to_string()));
    }

    debug!("saving {} heartbeat(s) to offline queue", heartbeats.len());

    let sender = QueueSender::new(NoopSender, queue_path.to_path_buf());
    let mut pipeline = build_pipeline(settings, Box::new(sender));

    // the noop sender always errors so the queue decorator captures
    // everything; that error is expected and dropped here
    let _ = pipeline.run(heartbeats);

    Ok(())
}

/// Print the total number of queued heartbeats to stdout.
pub fn count(settings: &Settings) -> Result<(), Error> {
    let queue_path = settings.queue_path()?;
    let count = Queue::open(&queue_path)?.count()?;

    println!("{count}");

    Ok(())
}

/// Print up to `limit` queued heartbeats as JSON without deleting them.
pub fn print(settings: &Settings, limit: Option<usize>) -> Result<(), Error> {
    let queue_path = settings.queue_path()?;
    let heartbeats = Queue::open(&queue_path)?.read_many(limit.unwrap_or(PRINT_MAX_DEFAULT))?;

    println!("{}", serde_json::to_string_pretty(&heartbeats)?);

    Ok(())
}
