use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A small, blocking counting semaphore bounding in-flight validation tasks.
pub struct Semaphore {
    permits: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    /// `permits` must be non-zero; [`super::ExecutionEngine::new`] checks it.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    /// Acquire one permit, blocking until available.
    ///
    /// Returns the time spent waiting (zero if no wait was required).
    pub fn acquire(&self) -> Duration {
        let start = Instant::now();
        let mut waited = false;
        let mut g = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *g == 0 {
            waited = true;
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        *g -= 1;
        if waited { start.elapsed() } else { Duration::ZERO }
    }

    pub fn release(&self) {
        let mut g = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *g += 1;
        self.cv.notify_one();
    }
}
