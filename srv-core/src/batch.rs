//! Bounded worker pool for multi-site operations.
//!
//! Items are pushed into a pre-filled, closed channel; up to `workers` tasks
//! drain it concurrently. Every item gets its own result and one failure never
//! stops the others. Each operation runs in its own task, so a panic costs
//! exactly one item, which is reported as [`ItemPanicked`].

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Result of one batch item, in input order.
#[derive(Debug)]
pub struct BatchResult<T, R, E> {
    pub item: T,
    pub result: Result<R, E>,
}

/// The operation for one item panicked instead of returning.
#[derive(Debug, Error)]
#[error("operation panicked: {reason}")]
pub struct ItemPanicked {
    pub reason: String,
}

/// Run `op` for every item with at most `workers` in flight.
pub async fn run_batch<T, R, E, F, Fut>(items: Vec<T>, workers: usize, op: F) -> Vec<BatchResult<T, R, E>>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: From<ItemPanicked> + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }

    let total = items.len();
    let (tx, rx) = mpsc::channel::<(usize, T)>(total);
    let worker_count = workers.clamp(1, total);
    for entry in items.into_iter().enumerate() {
        // Capacity equals the item count, so this never waits.
        if tx.send(entry).await.is_err() {
            break;
        }
    }
    drop(tx);

    let (done_tx, mut done_rx) = mpsc::channel::<(usize, BatchResult<T, R, E>)>(total);
    let rx = Arc::new(Mutex::new(rx));
    let op = Arc::new(op);
    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let rx = rx.clone();
        let op = op.clone();
        let done_tx = done_tx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let next = rx.lock().await.recv().await;
                let Some((index, item)) = next else { break };
                let task = {
                    let op = op.clone();
                    let item = item.clone();
                    tokio::spawn(async move { op(item).await })
                };
                let result = match task.await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!(index, error = %err, "batch item panicked");
                        Err(E::from(ItemPanicked {
                            reason: err.to_string(),
                        }))
                    }
                };
                if done_tx.send((index, BatchResult { item, result })).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(done_tx);

    let mut results = Vec::with_capacity(total);
    while let Some(entry) = done_rx.recv().await {
        results.push(entry);
    }
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "batch worker failed");
        }
    }
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, r)| r).collect()
}
