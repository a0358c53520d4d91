use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Counting semaphore bounding the number of feeds fetched at once.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    telemetry: Arc<Telemetry>,
}

/// Held by a launched worker; dropping it frees the slot.
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
    telemetry: Arc<Telemetry>,
}

impl ConcurrencyLimiter {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, telemetry: Arc<Telemetry>) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            telemetry,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot. Returns `None` once `cancel` fires, including
    /// when a slot and the cancellation become ready together.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<SlotGuard> {
        if cancel.is_cancelled() {
            return None;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok()?,
        };

        if cancel.is_cancelled() {
            return None;
        }

        self.telemetry.enter_slot();
        Some(SlotGuard {
            _permit: permit,
            telemetry: self.telemetry.clone(),
        })
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.telemetry.leave_slot();
    }
}
