//! Broadcast engine: two bounded queues (root messages and replies) drained
//! by a single worker that fans each value out to every registered
//! connection.
//!
//! Producers never block. If a queue cannot take a value immediately the
//! value is dropped and counted (fail-open). Within one queue delivery is
//! FIFO; the two queues are independent and may interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::events::{FinalMessage, FinalMessageReply, TYPE_MESSAGE, TYPE_MESSAGE_REPLY};
use super::registry::ConnectionRegistry;

/// A broadcast value was dropped instead of queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} broadcast queue saturated, event dropped")]
pub struct QueueSaturated(pub &'static str);

/// Producer handle shared by every dispatch loop. Store it in `AppState`.
pub struct BroadcastHub {
    messages: mpsc::Sender<FinalMessage>,
    replies: mpsc::Sender<FinalMessageReply>,
    dropped: AtomicU64,
}

/// The sole consumer of both queues.
pub struct BroadcastWorker {
    messages: mpsc::Receiver<FinalMessage>,
    replies: mpsc::Receiver<FinalMessageReply>,
    registry: Arc<ConnectionRegistry>,
}

/// Create a hub/worker pair. `capacity` applies to each queue.
pub fn channel(capacity: usize, registry: Arc<ConnectionRegistry>) -> (BroadcastHub, BroadcastWorker) {
    let (messages_tx, messages_rx) = mpsc::channel(capacity.max(1));
    let (replies_tx, replies_rx) = mpsc::channel(capacity.max(1));
    let hub = BroadcastHub {
        messages: messages_tx,
        replies: replies_tx,
        dropped: AtomicU64::new(0),
    };
    let worker = BroadcastWorker {
        messages: messages_rx,
        replies: replies_rx,
        registry,
    };
    (hub, worker)
}

impl BroadcastHub {
    /// Queue a persisted root message for fan-out.
    pub fn enqueue_message(&self, value: FinalMessage) -> Result<(), QueueSaturated> {
        let result = self.messages.try_send(value);
        self.record(TYPE_MESSAGE, result)
    }

    /// Queue a persisted reply for fan-out.
    pub fn enqueue_reply(&self, value: FinalMessageReply) -> Result<(), QueueSaturated> {
        let result = self.replies.try_send(value);
        self.record(TYPE_MESSAGE_REPLY, result)
    }

    /// Number of values dropped since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record<T>(&self, queue: &'static str, result: Result<(), TrySendError<T>>) -> Result<(), QueueSaturated> {
        let reason = match result {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(_)) => "full",
            Err(TrySendError::Closed(_)) => "closed",
        };
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(queue, reason, dropped, "broadcast queue rejected event");
        Err(QueueSaturated(queue))
    }
}

impl BroadcastWorker {
    /// Drain both queues until every hub handle is gone.
    pub async fn run(mut self) {
        let mut messages_open = true;
        let mut replies_open = true;

        while messages_open || replies_open {
            tokio::select! {
                next = self.messages.recv(), if messages_open => match next {
                    Some(value) => {
                        fan_out(&self.registry, TYPE_MESSAGE, &value).await;
                    }
                    None => messages_open = false,
                },
                next = self.replies.recv(), if replies_open => match next {
                    Some(value) => {
                        fan_out(&self.registry, TYPE_MESSAGE_REPLY, &value).await;
                    }
                    None => replies_open = false,
                },
            }
        }

        tracing::info!("broadcast worker stopped");
    }
}

/// Deliver one value to every connection in a registry snapshot.
///
/// Writes run concurrently and each failure only removes its own recipient.
/// Returns once every write has finished or failed.
pub async fn fan_out<T: Serialize>(registry: &ConnectionRegistry, kind: &'static str, value: &T) -> usize {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(?err, kind, "failed to serialize broadcast event");
            return 0;
        }
    };

    let recipients = registry.snapshot();
    let results = join_all(recipients.iter().map(|(id, sink)| {
        let text = text.as_str();
        async move { (id, sink.send_text(text).await) }
    }))
    .await;

    let mut delivered = 0;
    for (id, result) in results {
        match result {
            Ok(()) => delivered += 1,
            Err(err) => {
                tracing::warn!(conn_id = %id, kind, %err, "broadcast delivery failed, dropping client");
                registry.remove(id).await;
            }
        }
    }

    tracing::debug!(kind, recipients = recipients.len(), delivered, "broadcast fan-out complete");
    delivered
}
