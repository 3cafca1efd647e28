use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::LimitsConfig;
use crate::error::{Result, TesseraError};
use crate::models::RequestStage;

/// Bounded admission: `max_concurrent` requests run, up to `queue_depth`
/// more wait for at most `queue_timeout`, everything else is turned away
/// with `ServiceBusy`.
#[derive(Debug, Clone)]
pub struct Admission {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
    max_concurrent: usize,
    queue_depth: usize,
    queue_timeout: Duration,
}

/// Held for as long as a request runs the pipeline.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    queued_for: Duration,
}

impl AdmissionPermit {
    pub fn queued_for(&self) -> Duration {
        self.queued_for
    }
}

/// One reserved place in the wait queue, released on drop.
struct QueueSlot<'a> {
    queued: &'a AtomicUsize,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Admission {
    pub fn new(max_concurrent: usize, queue_depth: usize, queue_timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                queued: AtomicUsize::new(0),
                max_concurrent,
                queue_depth,
                queue_timeout,
            }),
        }
    }

    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self::new(
            limits.max_concurrent,
            limits.queue_depth,
            limits.queue_timeout(),
        )
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue_depth
    }

    /// Requests currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.inner.max_concurrent - self.inner.semaphore.available_permits()
    }

    /// Requests currently waiting for a permit.
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    /// Reserve a queue slot unless the queue is full. The compare-and-swap
    /// loop makes it impossible to exceed `queue_depth`.
    fn reserve_slot(&self) -> Option<QueueSlot<'_>> {
        let depth = self.inner.queue_depth;
        self.inner
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < depth).then_some(n + 1)
            })
            .ok()
            .map(|_| QueueSlot {
                queued: &self.inner.queued,
            })
    }

    /// Wait for a permit. Fails with `ServiceBusy` when the queue is full or
    /// the queue wait expires, `DeadlineExceeded` when the request deadline
    /// passes first and `Cancelled` when the caller goes away.
    pub async fn admit(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<AdmissionPermit> {
        let started = Instant::now();

        if let Ok(permit) = self.inner.semaphore.clone().try_acquire_owned() {
            return Ok(AdmissionPermit {
                _permit: permit,
                queued_for: Duration::ZERO,
            });
        }

        let Some(_slot) = self.reserve_slot() else {
            tracing::debug!(
                queued = self.queued(),
                depth = self.inner.queue_depth,
                "Admission queue full"
            );
            return Err(TesseraError::ServiceBusy);
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TesseraError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(TesseraError::DeadlineExceeded(RequestStage::Decoding.to_string()))
            }
            _ = tokio::time::sleep(self.inner.queue_timeout) => return Err(TesseraError::ServiceBusy),
            permit = self.inner.semaphore.clone().acquire_owned() => permit
                .map_err(|_| TesseraError::Internal("Admission semaphore closed".to_string()))?,
        };

        Ok(AdmissionPermit {
            _permit: permit,
            queued_for: started.elapsed(),
        })
    }
}
