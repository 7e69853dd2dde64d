//! Bounded work queue of identifiers
//!
//! A producer task feeds the identifiers of a range into a bounded channel;
//! workers share the receiving end and wait at most a fixed time per dequeue
//! so they can observe cancellation between items.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Result of a single dequeue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dequeue {
    /// Next identifier to process
    Item(u64),
    /// Nothing arrived within the wait; the producer may still be running
    Empty,
    /// Producer finished and every identifier has been handed out
    Closed,
}

/// Shared receiving end of the identifier channel
#[derive(Debug)]
pub struct WorkQueue {
    receiver: Mutex<mpsc::Receiver<u64>>,
}

/// Outcome of the producer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Produced {
    /// Number of identifiers handed to the channel
    pub enqueued: u64,
    /// Whether the whole range was enqueued before cancellation
    pub finished: bool,
}

impl WorkQueue {
    /// Starts a producer feeding `ids` into a channel of `capacity` slots
    ///
    /// The producer stops early when `cancel` fires. Dropping its sender is
    /// what eventually lets workers observe [`Dequeue::Closed`].
    pub fn spawn(
        ids: RangeInclusive<u64>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, JoinHandle<Produced>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let producer = tokio::spawn(async move {
            let mut enqueued = 0u64;
            for id in ids {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("Producer cancelled after {} identifiers", enqueued);
                        return Produced { enqueued, finished: false };
                    }
                    sent = sender.send(id) => {
                        if sent.is_err() {
                            return Produced { enqueued, finished: false };
                        }
                        enqueued += 1;
                    }
                }
            }
            Produced {
                enqueued,
                finished: true,
            }
        });

        let queue = Arc::new(Self {
            receiver: Mutex::new(receiver),
        });
        (queue, producer)
    }

    /// Waits up to `wait` for the next identifier
    pub async fn pop(&self, wait: Duration) -> Dequeue {
        let attempt = tokio::time::timeout(wait, async {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        })
        .await;

        match attempt {
            Ok(Some(id)) => Dequeue::Item(id),
            Ok(None) => Dequeue::Closed,
            Err(_) => Dequeue::Empty,
        }
    }

    /// Returns true once the producer is gone and nothing is left to hand out
    ///
    /// Only meaningful after the workers have stopped: a buffered identifier
    /// is consumed by the check.
    pub async fn is_drained(&self) -> bool {
        let mut receiver = self.receiver.lock().await;
        matches!(
            receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        )
    }
}
