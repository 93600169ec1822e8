use std::sync::atomic::{AtomicBool, Ordering};

/// Outcome of the most recent job run, shared with the health endpoint.
/// Starts unhealthy until a job has succeeded.
#[derive(Debug, Default)]
pub struct LivenessState {
    healthy: AtomicBool,
}

impl LivenessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, succeeded: bool) {
        self.healthy.store(succeeded, Ordering::Release);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}
