//! Progress callbacks shared by the pipeline stages.

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn stage(&self, name: &str);
    /// Item-level progress within the current stage.
    fn item(&self, current: usize, total: usize, detail: &str);
    /// Called once the run has finished, successfully or not.
    fn finish(&self);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _detail: &str) {}
    fn finish(&self) {}
}
