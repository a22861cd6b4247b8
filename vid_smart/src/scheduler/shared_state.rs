//! Batch-wide counters shared by every worker
//!
//! The active-task count and the result list change together under one
//! lock, so "no task active" always means every result is recorded.

use super::task::TaskResult;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    active: usize,
    results: Vec<TaskResult>,
}

#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A task entered the pipeline
    pub fn register(&self) {
        self.lock().active += 1;
    }

    /// Record a finalized task and retire it
    pub fn finish(&self, result: TaskResult) {
        let mut inner = self.lock();
        inner.results.push(result);
        inner.active = inner.active.saturating_sub(1);
    }

    pub fn active(&self) -> usize {
        self.lock().active
    }

    pub fn completed(&self) -> usize {
        self.lock().results.len()
    }

    pub fn take_results(&self) -> Vec<TaskResult> {
        std::mem::take(&mut self.lock().results)
    }
}
