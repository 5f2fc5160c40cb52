//! Heartbeat processing pipeline.
//!
//! A batch of heartbeats flows through an ordered chain of [`Stage`]s, each
//! of which may enrich, rewrite, or drop heartbeats, and ends at a
//! [`Sender`]. Stages are infallible: data-shape problems drop the
//! offending heartbeat with a debug log and processing continues. Only the
//! sender (and its decorators, backoff and offline queue) produce typed
//! errors.

use tracing::debug;

use crate::error::Error;
use crate::heartbeat::{Heartbeat, HeartbeatResult};

/// A pipeline stage that transforms a batch in place.
pub trait Stage {
    /// Stage name for debug logging.
    fn name(&self) -> &'static str;

    /// Apply this stage to the batch.
    fn process(&mut self, heartbeats: Vec<Heartbeat>) -> Vec<Heartbeat>;
}

/// The terminal delivery target of a pipeline.
pub trait Sender {
    fn send_heartbeats(&mut self, heartbeats: Vec<Heartbeat>) -> Result<Vec<HeartbeatResult>, Error>;
}

/// An ordered chain of stages ending at a sender.
///
/// Stages execute in the declared order. An empty batch after the last
/// stage short-circuits with an empty result; the sender is never invoked.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    sender: Box<dyn Sender>,
}

impl Pipeline {
    pub fn new(sender: Box<dyn Sender>) -> Self {
        Self {
            stages: Vec::new(),
            sender,
        }
    }

    /// Append a stage to the end of the chain.
    pub fn with(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Run the batch through all stages and hand the survivors to the sender.
    pub fn run(&mut self, mut heartbeats: Vec<Heartbeat>) -> Result<Vec<HeartbeatResult>, Error> {
        for stage in &mut self.stages {
            debug!("execute {}", stage.name());
            heartbeats = stage.process(heartbeats);
        }

        if heartbeats.is_empty() {
            debug!("no heartbeats left after filtering. abort heartbeat handling.");
            return Ok(Vec::new());
        }

        self.sender.send_heartbeats(heartbeats)
    }
}

/// A sender that refuses to send, used to route batches straight into the
/// offline queue decorator.
pub struct NoopSender;

impl Sender for NoopSender {
    fn send_heartbeats(&mut self, _: Vec<Heartbeat>) -> Result<Vec<HeartbeatResult>, Error> {
        Err(Error::Api(
            "skip sending heartbeats and only save to offline queue".to_string(),
        ))
    }
}
