//! Counting permit for the shared hardware encoder
//!
//! Hardware encode sessions are a machine-wide resource. Every `Compressor`
//! holding the same `EncodePermit` waits for a free slot before spawning
//! ffmpeg; the slot is returned when the guard drops, including on panic.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug)]
pub struct EncodePermit {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl EncodePermit {
    /// `capacity` of 0 is treated as 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        *self.lock()
    }

    /// Block until a slot is free
    pub fn acquire(&self) -> EncodePermitGuard<'_> {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        trace!(remaining = *available, "Encode permit acquired");
        EncodePermitGuard { permit: self }
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<EncodePermitGuard<'_>> {
        let mut available = self.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(EncodePermitGuard { permit: self })
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // counter stays consistent even if a holder panicked
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut available = self.lock();
        *available = (*available + 1).min(self.capacity);
        self.released.notify_one();
    }
}

/// Returns its slot on drop
pub struct EncodePermitGuard<'a> {
    permit: &'a EncodePermit,
}

impl Drop for EncodePermitGuard<'_> {
    fn drop(&mut self) {
        self.permit.release();
    }
}
