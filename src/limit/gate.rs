//! Bounded-concurrency admission control.
//!
//! The [`ConcurrencyGate`] caps how many operations may be in flight at
//! once. Admission returns an RAII [`GatePermit`]; dropping the permit
//! releases the slot on every exit path of the guarded operation, so a slot
//! is never lost to an error or early return. No priority policy, just simple
//! mutual admission control with the semaphore's eventual fairness.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Error returned when the gate's semaphore has been closed.
///
/// This does not happen in normal operation; it indicates the gate was torn
/// down while operations were still being admitted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("concurrency gate closed unexpectedly")]
pub struct GateClosed;

/// Counting gate bounding the number of simultaneously admitted operations.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

/// An admitted slot. Dropping the permit releases the slot.
#[must_use = "dropping the permit releases the slot immediately"]
#[derive(Debug)]
pub struct GatePermit {
    in_flight: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    /// Creates a gate admitting at most `capacity` operations at once.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "creating concurrency gate");
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns how many operations currently hold a slot.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Blocks until fewer than `capacity` operations are admitted, then
    /// admits the caller.
    ///
    /// # Errors
    ///
    /// Returns [`GateClosed`] if the underlying semaphore was closed.
    pub async fn enter(&self) -> Result<GatePermit, GateClosed> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(GatePermit {
            in_flight: Arc::clone(&self.in_flight),
            _permit: permit,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_enter_admits_up_to_capacity() {
        let gate = ConcurrencyGate::new(3);

        let a = gate.enter().await.unwrap();
        let b = gate.enter().await.unwrap();
        let c = gate.enter().await.unwrap();
        assert_eq!(gate.in_flight(), 3);

        drop((a, b, c));
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_enter_blocks_at_capacity() {
        tokio::time::pause();

        let gate = Arc::new(ConcurrencyGate::new(1));
        let held = gate.enter().await.unwrap();

        let contender = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.enter().await.unwrap() })
        };

        // The contender cannot be admitted while the slot is held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(held);
        let permit = contender.await.unwrap();
        assert_eq!(gate.in_flight(), 1);
        drop(permit);
    }

    #[tokio::test]
    async fn test_slot_released_when_guarded_operation_fails() {
        let gate = ConcurrencyGate::new(1);

        let result: Result<(), &str> = async {
            let _slot = gate.enter().await.unwrap();
            Err("operation failed")
        }
        .await;
        assert!(result.is_err());

        // The slot must be reusable despite the failure.
        let permit = gate.enter().await.unwrap();
        assert_eq!(gate.in_flight(), 1);
        drop(permit);
    }

    #[tokio::test]
    async fn test_peak_in_flight_never_exceeds_capacity() {
        let capacity = 4;
        let gate = Arc::new(ConcurrencyGate::new(capacity));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let gate = Arc::clone(&gate);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _slot = gate.enter().await.unwrap();
                let current = gate.in_flight();
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let observed = peak.load(Ordering::SeqCst);
        assert!(observed >= 1);
        assert!(
            observed <= capacity,
            "peak in-flight {observed} exceeded capacity {capacity}"
        );
    }

    #[tokio::test]
    async fn test_enter_on_closed_semaphore_errors() {
        let gate = ConcurrencyGate::new(1);
        gate.semaphore.close();

        assert_eq!(gate.enter().await.unwrap_err(), GateClosed);
    }
}
