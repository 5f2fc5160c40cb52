//! The sync command: drain the offline queue to the API.

use tracing::debug;

use crate::backoff::BackoffSender;
use crate::commands::heartbeat::build_client;
use crate::config::Settings;
use crate::error::Error;
use crate::offline;
use crate::ratelimit::{self, RateLimitParams};
use crate::state::StateFile;

/// Sync queued heartbeats regardless of the rate limit.
pub fn run(settings: &Settings) -> Result<(), Error> {
    if settings.offline_disabled {
        return Ok(());
    }

    sync_offline_activity(settings)
}

/// Sync queued heartbeats unless the rate limit window is still open.
/// Runs piggybacked after a successful heartbeat send.
pub fn run_with_rate_limiting(settings: &Settings) -> Result<(), Error> {
    if settings.offline_disabled {
        return Ok(());
    }

    let state_file = StateFile::new(settings.internal_config_path()?);
    let state = state_file.load().unwrap_or_default();

    let limited = ratelimit::rate_limited(&RateLimitParams {
        disabled: settings.offline_disabled,
        last_sent_at: state.heartbeats_last_sent_at,
        timeout: settings.rate_limit,
    });

    if limited {
        debug!("skip syncing offline activity to respect rate limit");
        return Ok(());
    }

    sync_offline_activity(settings)
}

fn sync_offline_activity(settings: &Settings) -> Result<(), Error> {
    let queue_path = settings.queue_path()?;

    let state_file = StateFile::new(settings.internal_config_path()?);
    let state = state_file.load().unwrap_or_default();

    let client = build_client(settings)?;
    let mut sender = BackoffSender::new(
        client,
        state_file.clone(),
        state.backoff_at,
        state.backoff_retries,
    );

    offline::sync(&queue_path, settings.sync_max, &mut sender)?;

    if let Err(err) = ratelimit::reset(&state_file) {
        tracing::error!("failed to reset rate limit: {err}");
    }

    debug!("successfully synced offline activity");

    Ok(())
}
