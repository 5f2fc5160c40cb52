//! Rate limiting between API deliveries.
//!
//! Within the configured window of the last successful send, the API is
//! skipped entirely for the invocation and heartbeats go to the offline
//! queue. Every successful send refreshes the persisted timestamp.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::Error;
use crate::state::{format_timestamp, StateFile};

/// Params for the rate limit decision.
#[derive(Debug, Clone, Default)]
pub struct RateLimitParams {
    pub disabled: bool,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub timeout: Duration,
}

/// Whether heartbeats should be queued instead of sent.
pub fn rate_limited(params: &RateLimitParams) -> bool {
    if params.disabled {
        return false;
    }

    if params.timeout.is_zero() {
        return false;
    }

    let Some(last_sent_at) = params.last_sent_at else {
        return false;
    };

    let elapsed = Utc::now() - last_sent_at;

    elapsed < chrono::Duration::from_std(params.timeout).unwrap_or(chrono::Duration::zero())
}

/// Update the persisted `heartbeats_last_sent_at` timestamp to now.
pub fn reset(state_file: &StateFile) -> Result<(), Error> {
    state_file.write(&[("heartbeats_last_sent_at", format_timestamp(Utc::now()))])
}
