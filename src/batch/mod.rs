//! Batched queue processing with failure requeueing.
//!
//! # Overview
//!
//! A [`BatchProcessor`] holds an unbounded FIFO queue of work items and
//! drains it in fixed-size batches, handing each batch to a caller-supplied
//! handler. The handler reports success or failure as a typed `Result`; on
//! failure the whole batch goes back onto the queue and the loop continues,
//! so no item is ever silently discarded. Between successful batches the
//! processor sleeps a configurable pacing delay, a deliberate throttle
//! independent of any request-level rate limiting. The sleep also runs after
//! the final batch, before the empty-queue check ends the loop.
//!
//! # Cancellation
//!
//! [`process_batches`](BatchProcessor::process_batches) takes a
//! `CancellationToken`. If it fires while a batch is in flight, the batch's
//! items are pushed back onto the queue *before* the cancellation
//! propagates as [`BatchError::Cancelled`], so in-flight work is never
//! dropped.
//!
//! # Example
//!
//! ```
//! use fetchkit::batch::BatchProcessor;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let processor = BatchProcessor::new(10, Duration::from_secs(3));
//! processor.add_items(vec!["a", "b", "c"]).await;
//!
//! let cancel = CancellationToken::new();
//! processor
//!     .process_batches(&cancel, |batch| async move {
//!         println!("processing {} items", batch.len());
//!         Ok::<(), std::io::Error>(())
//!     })
//!     .await
//!     .unwrap();
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::report::ProgressTracker;

/// Default number of items drained per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pacing delay between successful batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(3);

/// Errors from batch processing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// Processing was cancelled; any in-flight batch was requeued first.
    #[error("batch processing cancelled; in-flight items were requeued")]
    Cancelled,
}

/// Drains a FIFO work queue in fixed-size batches.
///
/// The queue is the single point of mutation for pending work: producers
/// enqueue through [`add_items`](Self::add_items), and only the draining
/// loop removes items. Concurrent enqueue/dequeue is serialized by the
/// queue's mutex.
#[derive(Debug)]
pub struct BatchProcessor<T> {
    batch_size: usize,
    delay: Duration,
    queue: Mutex<VecDeque<T>>,
    progress: StdMutex<Option<ProgressTracker>>,
    show_progress: bool,
}

impl<T: Clone> BatchProcessor<T> {
    /// Creates a processor draining up to `batch_size` items per round, with
    /// the given pacing delay between successful batches.
    #[must_use]
    pub fn new(batch_size: usize, delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay,
            queue: Mutex::new(VecDeque::new()),
            progress: StdMutex::new(None),
            show_progress: false,
        }
    }

    /// Makes the progress bar draw to stderr instead of staying hidden.
    #[must_use]
    pub fn with_progress_bar(mut self, visible: bool) -> Self {
        self.show_progress = visible;
        self
    }

    /// Returns the configured batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the configured pacing delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Enqueues items in order and (re)initializes the progress tracker,
    /// sized to the queue's current length with the batch size as cadence.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn add_items(&self, items: Vec<T>) {
        let total = {
            let mut queue = self.queue.lock().await;
            queue.extend(items);
            queue.len()
        };
        debug!(queued = total, "items added");

        let total = total as u64;
        let cadence = self.batch_size as u64;
        let tracker = if self.show_progress {
            ProgressTracker::new(total, cadence)
        } else {
            ProgressTracker::hidden(total, cadence)
        };
        *self.lock_progress() = Some(tracker);
    }

    /// Drains the queue in batches, invoking `handler` once per batch.
    ///
    /// Runs until the queue is empty. A failed batch is requeued (order not
    /// preserved) and the loop continues; progress advances only for
    /// successful batches.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Cancelled`] when `cancel` fires. A batch in
    /// flight at that moment is pushed back onto the queue first.
    #[instrument(skip_all)]
    pub async fn process_batches<F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        mut handler: F,
    ) -> Result<(), BatchError>
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        loop {
            let batch = self.take_batch().await;
            if batch.is_empty() {
                debug!("queue drained");
                return Ok(());
            }

            let outcome = tokio::select! {
                () = cancel.cancelled() => {
                    warn!(batch_len = batch.len(), "cancelled mid-batch; requeueing");
                    self.requeue(batch).await;
                    return Err(BatchError::Cancelled);
                }
                result = handler(batch.clone()) => result,
            };

            match outcome {
                Ok(()) => {
                    if let Some(progress) = &*self.lock_progress() {
                        progress.update(batch.len() as u64, None);
                    }
                    debug!(batch_len = batch.len(), "batch completed");

                    tokio::select! {
                        () = cancel.cancelled() => return Err(BatchError::Cancelled),
                        () = tokio::time::sleep(self.delay) => {}
                    }
                }
                Err(e) => {
                    warn!(batch_len = batch.len(), error = %e, "batch handler failed; requeueing");
                    self.requeue(batch).await;
                }
            }
        }
    }

    /// Number of items currently pending.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Snapshot of the pending items, in queue order.
    pub async fn pending(&self) -> Vec<T> {
        self.queue.lock().await.iter().cloned().collect()
    }

    /// Number of items reported completed since the last `add_items`.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.lock_progress()
            .as_ref()
            .map_or(0, ProgressTracker::position)
    }

    async fn take_batch(&self) -> Vec<T> {
        let mut queue = self.queue.lock().await;
        let take = self.batch_size.min(queue.len());
        queue.drain(..take).collect()
    }

    async fn requeue(&self, items: Vec<T>) {
        let mut queue = self.queue.lock().await;
        queue.extend(items);
    }

    fn lock_progress(&self) -> MutexGuard<'_, Option<ProgressTracker>> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
