//! Progress reporting for batch updates.
//!
//! The update loop reports through [`ProgressCallback`] so it doesn't care
//! whether progress ends up as a terminal bar, log lines, or nowhere.

use std::sync::Arc;

/// Receives progress from a running update.
///
/// Implementations must be `Send + Sync`; records complete concurrently.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of target records.
    fn set_total(&self, total: u64);

    /// Advances by `delta` finished records.
    fn inc(&self, delta: u64);

    /// Replaces the status message.
    fn set_message(&self, msg: String);

    /// Marks the run as done.
    fn finish(&self, msg: String);
}

/// Ignores all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// A shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
