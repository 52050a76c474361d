//! Fair counting semaphore with RAII tickets.
//!
//! Waiters are served in arrival order. A ticket returns its slot when
//! dropped, so an error path or a cancelled task can never leak capacity.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A named, bounded pool of slots.
///
/// Cloning is cheap and every clone shares the same slots.
#[derive(Debug, Clone)]
pub struct BoundedSemaphore {
    name: &'static str,
    max: usize,
    inner: Arc<Semaphore>,
}

/// Proof that one slot of a [`BoundedSemaphore`] is held.
#[derive(Debug)]
pub struct SemaphoreTicket {
    pool: &'static str,
    _permit: OwnedSemaphorePermit,
}

impl BoundedSemaphore {
    /// Create a pool with `max` slots. A `max` of zero is raised to one.
    #[must_use]
    pub fn new(name: &'static str, max: usize) -> Self {
        let max = max.max(1);
        Self {
            name,
            max,
            inner: Arc::new(Semaphore::new(max)),
        }
    }

    /// Wait for a free slot.
    ///
    /// Suspends until a slot is available; waiters are admitted in FIFO order.
    pub async fn acquire(&self) -> SemaphoreTicket {
        if self.inner.available_permits() == 0 {
            tracing::debug!(pool = self.name, max = self.max, "all slots busy, queueing");
        }
        let permit = match Arc::clone(&self.inner).acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is never closed while `self` holds it.
            Err(_) => unreachable!("bounded semaphore '{}' closed", self.name),
        };
        tracing::trace!(pool = self.name, in_use = self.in_use(), "slot acquired");
        SemaphoreTicket {
            pool: self.name,
            _permit: permit,
        }
    }

    /// Take a slot only if one is free right now.
    #[must_use]
    pub fn try_acquire(&self) -> Option<SemaphoreTicket> {
        Arc::clone(&self.inner)
            .try_acquire_owned()
            .ok()
            .map(|permit| SemaphoreTicket {
                pool: self.name,
                _permit: permit,
            })
    }

    /// Slots currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.max - self.inner.available_permits()
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    /// Total number of slots.
    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    /// Pool name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl SemaphoreTicket {
    /// Name of the pool this ticket belongs to.
    #[must_use]
    pub fn pool(&self) -> &'static str {
        self.pool
    }
}

impl Drop for SemaphoreTicket {
    fn drop(&mut self) {
        tracing::trace!(pool = self.pool, "slot released");
    }
}
