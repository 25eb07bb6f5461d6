//! Progress callbacks shared by the harvest and publish loops.

use crate::types::BatchStatus;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each history page has been scanned.
    fn page_scanned(&self, pages: usize, messages: usize, saved: usize);
    /// Called after each append batch is settled (added or abandoned).
    fn batch_settled(&self, index: usize, total: usize, status: BatchStatus);
    /// Called when the command completes.
    fn done(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_scanned(&self, _pages: usize, _messages: usize, _saved: usize) {}
    fn batch_settled(&self, _index: usize, _total: usize, _status: BatchStatus) {}
    fn done(&self) {}
}
