//! Exponential backoff gate in front of the API sender.
//!
//! After `n` consecutive failures, sends are skipped until
//! `backoff_at + 15s * 2^(n-1)`, capped at 24 hours. A success zeroes the
//! persisted state; a failure stamps `backoff_at = now` and increments the
//! retry counter. Parsed `backoff_at` values in the future are clamped to
//! now, which protects against clock skew.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error};

use crate::error::Error;
use crate::heartbeat::{Heartbeat, HeartbeatResult};
use crate::pipeline::Sender;
use crate::state::{format_timestamp, StateFile};

/// Base wait in seconds after the first failure.
const BACKOFF_BASE_SECS: i64 = 15;
/// Upper bound of the computed wait.
const BACKOFF_MAX_SECS: i64 = 24 * 60 * 60;

/// Sender decorator implementing the backoff gate.
pub struct BackoffSender<S> {
    inner: S,
    state_file: StateFile,
    at: Option<DateTime<Utc>>,
    retries: u32,
}

impl<S> BackoffSender<S> {
    pub fn new(inner: S, state_file: StateFile, at: Option<DateTime<Utc>>, retries: u32) -> Self {
        // clamp future timestamps to now
        let at = at.map(|at| at.min(Utc::now()));

        Self {
            inner,
            state_file,
            at,
            retries,
        }
    }

    fn record_success(&mut self) {
        if self.at.is_none() && self.retries == 0 {
            return;
        }

        self.at = None;
        self.retries = 0;

        if let Err(err) = self.state_file.write(&[
            ("backoff_at", String::new()),
            ("backoff_retries", "0".to_string()),
        ]) {
            error!("failed to reset backoff: {err}");
        }
    }

    fn record_failure(&mut self) {
        let now = Utc::now();
        self.retries += 1;
        self.at = Some(now);

        if let Err(err) = self.state_file.write(&[
            ("backoff_at", format_timestamp(now)),
            ("backoff_retries", self.retries.to_string()),
        ]) {
            error!("failed to update backoff: {err}");
        }
    }
}

impl<S: Sender> Sender for BackoffSender<S> {
    fn send_heartbeats(&mut self, heartbeats: Vec<Heartbeat>) -> Result<Vec<HeartbeatResult>, Error> {
        if should_backoff(self.retries, self.at) {
            return Err(Error::Backoff(
                "won't send heartbeat due to backoff".to_string(),
            ));
        }

        match self.inner.send_heartbeats(heartbeats) {
            Ok(results) => {
                self.record_success();
                Ok(results)
            }
            Err(err) => {
                // auth errors gate future sends too; backoff errors cannot
                // originate from the inner sender
                self.record_failure();
                Err(err)
            }
        }
    }
}

/// Whether the gate is closed for the given retry count and timestamp.
pub fn should_backoff(retries: u32, at: Option<DateTime<Utc>>) -> bool {
    let Some(at) = at else {
        return false;
    };

    if retries < 1 {
        return false;
    }

    let wait_secs = BACKOFF_BASE_SECS
        .saturating_mul(1i64 << (retries - 1).min(62))
        .min(BACKOFF_MAX_SECS);

    let reopen_at = at + Duration::seconds(wait_secs);
    let closed = Utc::now() < reopen_at;

    if closed {
        debug!(
            "skipping heartbeat due to backoff without sending to api, backoff over at {}",
            format_timestamp(reopen_at)
        );
    }

    closed
}
