//! Per-job run state.

use std::time::{Duration, Instant};

use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Inner {
    runs: u64,
    last_run: Option<Instant>,
    last_duration: Option<Duration>,
    last_error: Option<String>,
    failure_count: u32,
}

/// Tracks the outcome of a scheduled job's runs.
#[derive(Debug, Default)]
pub struct JobState {
    inner: RwLock<Inner>,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful run.
    pub fn record_success(&self, took: Duration) {
        let mut inner = self.inner.write();
        inner.runs += 1;
        inner.last_run = Some(Instant::now());
        inner.last_duration = Some(took);
        inner.last_error = None;
        inner.failure_count = 0;
    }

    /// Records a failed run.
    pub fn record_failure(&self, error: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.runs += 1;
        inner.last_run = Some(Instant::now());
        inner.last_error = Some(error.into());
        inner.failure_count += 1;
    }

    /// Total runs, successful or not.
    pub fn run_count(&self) -> u64 {
        self.inner.read().runs
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.inner.read().last_run
    }

    /// Returns the duration since the last run.
    pub fn time_since_run(&self) -> Option<Duration> {
        self.inner.read().last_run.map(|t| t.elapsed())
    }

    /// Duration of the last successful run.
    pub fn last_duration(&self) -> Option<Duration> {
        self.inner.read().last_duration
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Returns the number of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        self.inner.read().failure_count
    }

    /// True once the job has run and its last run succeeded.
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.read();
        inner.runs > 0 && inner.last_error.is_none()
    }

    /// Resets all state.
    pub fn reset(&self) {
        *self.inner.write() = Inner::default();
    }
}
