//! Bounded FIFO hand-off between pipeline stages.
//!
//! A queue is closed by dropping every [`QueueSender`]. The pipeline keeps one
//! primary sender per queue and calls [`QueueSender::close`] on it only after
//! every task holding a clone has been joined, so consumers never see closure
//! while a producer could still send.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Create a bounded queue holding at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is zero, like [`mpsc::channel`].
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueSender { tx }, QueueReceiver { rx: Arc::new(Mutex::new(rx)) })
}

/// Returned when sending on a queue whose consumers are all gone.
#[derive(PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Debug for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueClosed(..)")
    }
}

impl<T> fmt::Display for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is closed")
    }
}

impl<T> std::error::Error for QueueClosed<T> {}

/// Outcome of [`QueueSender::send_or_cancel`].
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome<T> {
    Sent,
    Cancelled(T),
    Closed(T),
}

/// Producer half. Cloning it adds another producer.
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T> fmt::Debug for QueueSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender").field("capacity", &self.tx.max_capacity()).finish()
    }
}

impl<T> QueueSender<T> {
    /// Enqueue `item`, waiting while the queue is full.
    pub async fn send(&self, item: T) -> Result<(), QueueClosed<T>> {
        self.tx.send(item).await.map_err(|mpsc::error::SendError(item)| QueueClosed(item))
    }

    /// Like [`send`](Self::send), but gives up as soon as `cancel` fires.
    pub async fn send_or_cancel(&self, item: T, cancel: &CancellationToken) -> SendOutcome<T> {
        if cancel.is_cancelled() {
            return SendOutcome::Cancelled(item);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SendOutcome::Cancelled(item),
            permit = self.tx.reserve() => permit,
        };

        match permit {
            Ok(permit) => {
                permit.send(item);
                SendOutcome::Sent
            }
            Err(_) => SendOutcome::Closed(item),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Give up this producer handle.
    ///
    /// Consumers observe closure once this is the last sender alive.
    pub fn close(self) {
        drop(self);
    }
}

/// Consumer half. Clones share the same underlying receiver, so each item is
/// delivered to exactly one of them.
pub struct QueueReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self { rx: Arc::clone(&self.rx) }
    }
}

impl<T> fmt::Debug for QueueReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueReceiver").field("consumers", &Arc::strong_count(&self.rx)).finish()
    }
}

impl<T> QueueReceiver<T> {
    /// Next item, or `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
