//! Worker pool.
//!
//! Each worker owns at most one item at a time. The item is moved into the
//! processing future and dropped when that future completes, before the
//! worker asks for the next one.

use std::future::Future;

use tokio::task::JoinHandle;

use crate::dispatch::queue::QueueReceiver;

/// Spawn `count` workers that process items from `receiver` one at a time.
///
/// Workers exit once the queue's producer is dropped and the queue is drained.
pub fn spawn_workers<T, F, Fut>(count: usize, receiver: QueueReceiver<T>, process: F) -> Vec<JoinHandle<()>>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    (0..count)
        .map(|worker_id| {
            let receiver = receiver.clone();
            let process = process.clone();
            tokio::spawn(async move {
                tracing::trace!(worker_id, "Worker started");
                while let Some(item) = receiver.dequeue().await {
                    process(item).await;
                }
                tracing::debug!(worker_id, "Worker stopped, queue closed");
            })
        })
        .collect()
}
