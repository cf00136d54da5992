//! Bounded worker pool
//!
//! A fixed set of long-lived workers pulls items from one bounded channel.
//! Producers wait in [`WorkerPool::submit`] while the channel is full, which
//! caps the number of queued items at the configured capacity. Shutdown closes
//! the channel; workers drain whatever is still queued, in order, and exit.
//!
//! Each item runs in its own task that the worker awaits, so an error or a
//! panic while handling one item ends that item only.

use crate::HarvestError;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Errors surfaced by the pool itself
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool queue is closed")]
    Closed,

    #[error("worker state is still shared after shutdown")]
    StillShared,
}

/// Per-item work run by pool workers
pub trait ItemHandler<T>: Send + Sync + 'static {
    fn handle(&self, item: T) -> impl Future<Output = Result<(), HarvestError>> + Send;
}

/// A fixed-size pool of workers fed through a bounded queue
pub struct WorkerPool<T> {
    sender: mpsc::Sender<T>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Starts `worker_count` workers sharing a queue of `queue_capacity` slots
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `queue_capacity` is zero.
    pub fn new<H: ItemHandler<T>>(worker_count: usize, queue_capacity: usize, handler: H) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);

        tracing::info!(
            "Starting {} workers (queue capacity {})",
            worker_count,
            queue_capacity
        );

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&handler),
                ))
            })
            .collect();

        Self { sender, workers }
    }

    /// Queues an item, waiting while the queue is full
    ///
    /// # Errors
    ///
    /// * `PoolError::Closed` - No worker is left to receive items
    pub async fn submit(&self, item: T) -> Result<(), PoolError> {
        self.sender.send(item).await.map_err(|_| PoolError::Closed)
    }

    /// Number of workers started
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Closes the queue and waits for every worker to drain it and exit
    ///
    /// Every item submitted before this call is handled exactly once before
    /// it returns.
    pub async fn shutdown(self) {
        let Self { sender, workers } = self;
        drop(sender);

        tracing::info!("Waiting for {} workers to finish", workers.len());
        for (worker_id, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                tracing::error!("Worker {} terminated abnormally: {}", worker_id, e);
            }
        }
    }
}

async fn run_worker<T, H>(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<T>>>, handler: Arc<H>)
where
    T: Send + 'static,
    H: ItemHandler<T>,
{
    tracing::debug!("Worker {} started", worker_id);

    loop {
        // The lock is released before the item is handled.
        let next = receiver.lock().await.recv().await;
        let Some(item) = next else {
            break;
        };

        let handler = Arc::clone(&handler);
        let task = tokio::spawn(async move { handler.handle(item).await });

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => match &e {
                HarvestError::Extraction { source, .. } if !source.is_parse_failure() => {
                    tracing::debug!("Worker {}: {}", worker_id, e);
                }
                _ => tracing::warn!("Worker {}: item failed: {}", worker_id, e),
            },
            Err(e) => {
                tracing::error!("Worker {}: item handler panicked: {}", worker_id, e);
            }
        }
    }

    tracing::debug!("Worker {} exited safely", worker_id);
}
