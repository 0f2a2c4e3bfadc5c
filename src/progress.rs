//! Shared progress cell.
//!
//! The single point of synchronization between the background worker and any
//! number of pollers. The worker is the only writer; observers take
//! consistent snapshots without holding the lock across reads.

use crate::model::ProgressState;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct ProgressCell {
    inner: Arc<Mutex<ProgressState>>,
}

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        // A poisoned lock only means a worker panicked mid-update; the state
        // itself is a plain record and stays usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Put the cell into the initial running state for a new job.
    pub fn reset(&self) {
        *self.lock() = ProgressState {
            percent: 0,
            running: true,
            complete: false,
            error: None,
        };
    }

    /// Update the completion percentage. The worker only passes
    /// non-decreasing values within one job.
    pub fn set_percent(&self, percent: u8) {
        self.lock().percent = percent.min(100);
    }

    /// Freeze the cell at a successful completion.
    pub fn finish_success(&self) {
        *self.lock() = ProgressState {
            percent: 100,
            running: false,
            complete: true,
            error: None,
        };
    }

    /// Freeze the cell at a failure, keeping the last percentage reached.
    pub fn finish_failure(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.running = false;
        state.complete = false;
        state.error = Some(message.into());
    }

    /// Consistent copy of the current state, safe to call from any thread.
    pub fn snapshot(&self) -> ProgressState {
        self.lock().clone()
    }
}
