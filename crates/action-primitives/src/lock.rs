//! FIFO counting lock used to serialize multi-step actions

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{error, trace};

use crate::errors::LockError;

/// Counting semaphore with strict FIFO hand-off.
///
/// `release` passes the permit directly to the oldest waiter instead of
/// returning it to the pool, so nobody can barge in between a release and
/// the wake-up of the next waiter.
pub struct Lock {
    capacity: usize,
    state: Mutex<LockState>,
}

struct LockState {
    available: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl Lock {
    /// Create a lock with `capacity` permits. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(LockState {
                available: capacity,
                waiters: VecDeque::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Number of queued waiters, including ones whose futures were dropped
    /// but not yet skipped by a release.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Take a permit, queueing behind earlier callers when none is free.
    pub async fn acquire(&self) {
        let rx = {
            let mut state = self.state.lock();
            if state.available > 0 {
                state.available -= 1;
                trace!(available = state.available, "lock acquired without waiting");
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            trace!(queued = state.waiters.len(), "lock busy; queued");
            rx
        };

        let mut pending = PendingGrant {
            lock: self,
            rx: Some(rx),
        };
        pending.wait().await;
    }

    /// Acquire a permit that is released when the guard drops.
    pub async fn acquire_guard(&self) -> LockGuard<'_> {
        self.acquire().await;
        LockGuard { lock: self }
    }

    /// Return a permit, handing it to the oldest live waiter if there is one.
    pub fn release(&self) -> Result<(), LockError> {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                trace!(queued = state.waiters.len(), "lock handed to next waiter");
                return Ok(());
            }
        }
        if state.available >= self.capacity {
            return Err(LockError::OverRelease {
                capacity: self.capacity,
            });
        }
        state.available += 1;
        trace!(available = state.available, "lock released");
        Ok(())
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new(1)
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Lock")
            .field("capacity", &self.capacity)
            .field("available", &state.available)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

/// A queued `acquire` that has not observed its grant yet.
struct PendingGrant<'a> {
    lock: &'a Lock,
    rx: Option<oneshot::Receiver<()>>,
}

impl PendingGrant<'_> {
    async fn wait(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            // Senders leave the queue only through `release`, which sends
            // before dropping, so the receiver always sees the grant.
            let _ = rx.await;
        }
        self.rx = None;
    }
}

impl Drop for PendingGrant<'_> {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        rx.close();
        if rx.try_recv().is_ok() {
            // Granted after the waiter gave up; pass the permit on.
            if let Err(err) = self.lock.release() {
                error!(%err, "failed to forward abandoned lock grant");
            }
        }
    }
}

/// Scoped permit; releases on drop.
#[must_use = "the permit is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.release() {
            error!(%err, "lock guard released more permits than it held");
        }
    }
}
