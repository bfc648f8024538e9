//! Progress and cancellation hooks
//!
//! These let the executor report to a terminal, and be interrupted by a
//! signal handler, without depending on either.

use crate::types::StepRecord;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called before a step's `check`
    fn on_step_start(&mut self, index: usize, total: usize, name: &str, description: &str);

    /// Called once the step's outcome is known
    fn on_step_complete(&mut self, record: &StepRecord);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_step_start(&mut self, _index: usize, _total: usize, _name: &str, _description: &str) {}
    fn on_step_complete(&mut self, _record: &StepRecord) {}
}

/// Shared flag asking the executor to stop before the next step
///
/// Clones share the same flag, so one clone can live in a signal handler
/// while another is handed to the executor.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
