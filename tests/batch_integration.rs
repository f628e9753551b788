//! Integration tests for the batch processor.
//!
//! Scenario tests for the producer/consumer queue: recoverability after
//! cancellation, mid-run enqueueing, and the mixed success/failure path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fetchkit::batch::{BatchError, BatchProcessor};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_cancelled_run_keeps_every_item_recoverable() {
    let processor = Arc::new(BatchProcessor::new(10, Duration::ZERO));
    processor
        .add_items(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        .await;

    let cancel = CancellationToken::new();
    let run = {
        let processor = Arc::clone(&processor);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            processor
                .process_batches(&cancel, |_batch| async {
                    // Simulate a handler that always fails and never
                    // completes any work.
                    tokio::task::yield_now().await;
                    Err::<(), _>("handler failure")
                })
                .await
        })
    };

    // Let the processor churn through a few failed rounds, then cancel.
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    assert_eq!(run.await.unwrap(), Err(BatchError::Cancelled));

    let mut remaining = processor.pending().await;
    remaining.sort();
    assert_eq!(remaining, vec!["a", "b", "c"]);
    assert_eq!(processor.completed(), 0);
}

#[tokio::test]
async fn test_items_enqueued_mid_run_are_drained() {
    let processor = Arc::new(BatchProcessor::new(2, Duration::ZERO));
    processor.add_items(vec![1, 2]).await;

    let handled = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();

    let run = {
        let processor_for_handler = Arc::clone(&processor);
        let processor = Arc::clone(&processor);
        let handled = Arc::clone(&handled);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            processor
                .process_batches(&cancel, move |batch| {
                    let processor = Arc::clone(&processor_for_handler);
                    let handled = Arc::clone(&handled);
                    async move {
                        // The first batch discovers more work.
                        if handled.fetch_add(batch.len(), Ordering::SeqCst) == 0 {
                            processor.add_items(vec![3, 4]).await;
                        }
                        Ok::<(), std::io::Error>(())
                    }
                })
                .await
        })
    };

    run.await.unwrap().unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), 4);
    assert!(processor.is_empty().await);
}

#[tokio::test]
async fn test_failed_batch_is_retried_until_handler_recovers() {
    let processor = BatchProcessor::new(3, Duration::ZERO);
    processor.add_items(vec!["x", "y", "z"]).await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let attempts_ref = Arc::clone(&attempts);
    processor
        .process_batches(&cancel, move |batch| {
            let attempts = Arc::clone(&attempts_ref);
            async move {
                assert_eq!(batch.len(), 3, "requeued items drain as one batch");
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("first round fails")
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(processor.is_empty().await);
    assert_eq!(processor.completed(), 3);
}

#[tokio::test]
async fn test_cancellation_during_pacing_sleep_preserves_pending_items() {
    let processor = Arc::new(BatchProcessor::new(1, Duration::from_secs(3600)));
    processor.add_items(vec![1, 2]).await;

    let cancel = CancellationToken::new();
    let run = {
        let processor = Arc::clone(&processor);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            processor
                .process_batches(&cancel, |_batch| async {
                    Ok::<(), std::io::Error>(())
                })
                .await
        })
    };

    // The first batch completes, then the processor parks in its pacing
    // sleep. Cancel there.
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    assert_eq!(run.await.unwrap(), Err(BatchError::Cancelled));
    assert_eq!(processor.pending().await, vec![2]);
    assert_eq!(processor.completed(), 1);
}
