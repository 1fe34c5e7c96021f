//! Indexing progress events.
//!
//! Pollers push events into a bounded channel without ever waiting on it; a relay
//! task drains the channel, logs each event and fans it out to any subscribers.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Capacity of the subscriber broadcast channel
const BROADCAST_CAPACITY: usize = 256;

/// One file is still being indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub filename: String,
    pub elapsed_secs: u64,
}

/// Sending half handed to pipelines
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSink {
    /// Create a sink and the receiver that drains it
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Report progress without blocking. Events are dropped when the channel is full.
    pub fn report(&self, filename: &str, elapsed: Duration) {
        let event = ProgressEvent {
            filename: filename.to_string(),
            elapsed_secs: elapsed.as_secs(),
        };

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(filename = %event.filename, "Progress channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(filename = %filename, "Progress channel closed");
            }
        }
    }
}

/// Drains pipeline progress and republishes it to subscribers
pub struct ProgressRelay {
    sink: ProgressSink,
    broadcast: broadcast::Sender<ProgressEvent>,
}

impl ProgressRelay {
    /// Start the relay task. Must be called inside a tokio runtime.
    pub fn start(capacity: usize) -> Self {
        let (sink, mut rx) = ProgressSink::channel(capacity);
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);

        let fanout = broadcast.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                info!(
                    filename = %event.filename,
                    elapsed_secs = event.elapsed_secs,
                    "Indexing in progress"
                );
                // No subscribers is fine
                let _ = fanout.send(event);
            }
            debug!("Progress relay stopped");
        });

        Self { sink, broadcast }
    }

    pub fn sink(&self) -> ProgressSink {
        self.sink.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.broadcast.subscribe()
    }
}
