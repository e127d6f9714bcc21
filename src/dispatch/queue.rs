//! Bounded dispatch queue.
//!
//! # Responsibilities
//! - Hold accepted items until a worker takes them
//! - Reject new items immediately when full (no waiting)
//! - Let any number of workers dequeue, one item each
//!
//! # Design Decisions
//! - `tokio::sync::mpsc` bounded channel; `try_send` gives fail-closed enqueue
//! - The receiver sits behind an async mutex so workers share it; the lock is
//!   held only while waiting for the next item, never during processing

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

/// An item the queue refused. Carries the item back to the caller.
#[derive(Debug)]
pub enum Rejected<T> {
    /// `capacity` items are already waiting.
    Full(T),
    /// Every worker has gone away.
    Closed(T),
}

impl<T> Rejected<T> {
    pub fn into_inner(self) -> T {
        match self {
            Rejected::Full(item) | Rejected::Closed(item) => item,
        }
    }
}

/// Producer side, owned by the accept loop.
#[derive(Debug)]
pub struct DispatchQueue<T> {
    tx: mpsc::Sender<T>,
    capacity: usize,
}

/// Consumer side, cloned into every worker.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

/// Create a queue holding at most `capacity` waiting items.
///
/// # Panics
///
/// Panics if `capacity` is 0; configuration validation rules that out.
pub fn bounded<T>(capacity: usize) -> (DispatchQueue<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        DispatchQueue { tx, capacity },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl<T> DispatchQueue<T> {
    /// Try to enqueue without waiting.
    pub fn try_enqueue(&self, item: T) -> Result<(), Rejected<T>> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => Rejected::Full(item),
            TrySendError::Closed(item) => Rejected::Closed(item),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items currently waiting.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item. `None` once the producer is gone and the queue is drained.
    pub async fn dequeue(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
