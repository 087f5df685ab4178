//!
//! Counting Semaphore
//!
//! A permit counter guarded by a mutex, with a condition variable for
//! waiters. `release` adds one permit; `acquire` blocks until one is
//! available and consumes it.
//!
//! `acquire_unless` also gives up when a `CancelToken` fires. The token is
//! checked under the permit lock, and a canceller calls `wake_all` after
//! cancelling, which takes the same lock, so the wakeup cannot be missed.
//!

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::cancel::CancelToken;

#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // The counter is updated in a single statement, so it is never left
        // half-written.
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one permit and wake a waiter
    pub fn release(&self) {
        let mut permits = self.lock();
        *permits += 1;
        self.condvar.notify_one();
    }

    /// Block until a permit is available, then consume it
    pub fn acquire(&self) {
        let mut permits = self.lock();
        while *permits == 0 {
            permits = self
                .condvar
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    /// Consume a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Block until a permit is consumed (`true`) or `cancel` fires (`false`).
    ///
    /// A permit that is already available wins over cancellation.
    pub fn acquire_unless(&self, cancel: &CancelToken) -> bool {
        let mut permits = self.lock();
        loop {
            if *permits > 0 {
                *permits -= 1;
                return true;
            }
            if cancel.is_cancelled() {
                return false;
            }
            permits = self
                .condvar
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wake every waiter so it re-checks its exit conditions
    pub fn wake_all(&self) {
        let _permits = self.lock();
        self.condvar.notify_all();
    }

    pub fn available(&self) -> usize {
        *self.lock()
    }
}
