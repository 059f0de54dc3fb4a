//! Fixed-rate and cron job scheduler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use croner::Cron;
use parking_lot::Mutex;
use rampart_core::{RampartError, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::JobState;

/// Outcome of one job run.
pub type JobResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

type JobFuture = Pin<Box<dyn Future<Output = JobResult> + Send>>;
type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Timing of a scheduled job.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Interval between runs.
    pub interval: Duration,
    /// Delay before the first run.
    pub initial_delay: Duration,
    /// Consecutive failures tolerated before backing off.
    pub max_failures: u32,
    /// Backoff multiplier for failures.
    pub backoff_multiplier: f64,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Cron schedule; when set, runs follow it instead of `interval`.
    pub cron: Option<Cron>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::every(Duration::from_secs(60))
    }
}

impl ScheduleConfig {
    /// Runs every `interval`, first run one interval from now.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            initial_delay: interval,
            max_failures: 3,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(300).max(interval),
            cron: None,
        }
    }

    /// Runs at every occurrence of a five-field cron expression.
    ///
    /// `interval` (one minute) stays the base for failure backoff.
    pub fn cron(expression: &str) -> Result<Self> {
        let cron = Cron::new(expression).parse().map_err(|e| {
            RampartError::invalid_settings(format!(
                "invalid cron expression '{}': {}",
                expression, e
            ))
        })?;
        Ok(Self {
            cron: Some(cron),
            ..Self::every(Duration::from_secs(60))
        })
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay before the first run.
    pub fn first_delay(&self) -> Duration {
        match self.cron {
            Some(_) => self.until_next(Utc::now()),
            None => self.initial_delay,
        }
    }

    /// Delay before the next run given the current failure streak.
    pub fn next_delay(&self, failures: u32) -> Duration {
        if failures < self.max_failures {
            return self.until_next(Utc::now());
        }
        let exponent = (failures - self.max_failures + 1) as i32;
        let scaled = self.interval.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_backoff.as_secs_f64()))
    }

    /// Time from `now` to the next cron occurrence, or `interval` for a
    /// fixed-rate schedule.
    pub fn until_next(&self, now: DateTime<Utc>) -> Duration {
        let Some(cron) = &self.cron else {
            return self.interval;
        };
        match cron.find_next_occurrence(&now, false) {
            Ok(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
            Err(e) => {
                warn!(error = %e, "No next cron occurrence, backing off");
                self.max_backoff
            },
        }
    }
}

/// Handle for controlling a running job.
///
/// Dropping the handle stops the job.
pub struct TaskHandle {
    /// Sender to signal shutdown.
    shutdown_tx: watch::Sender<bool>,
}

impl TaskHandle {
    /// Signals the job to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

struct RegisteredJob {
    job: JobFn,
    state: Arc<JobState>,
    _handle: TaskHandle,
}

/// Runs named jobs at a fixed rate.
///
/// Registering a name that already exists replaces (and stops) the old
/// job. Dropping the scheduler stops every job.
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use rampart_cache::sync::{PeriodicScheduler, ScheduleConfig};
/// # #[tokio::main]
/// # async fn main() {
/// let scheduler = PeriodicScheduler::new();
/// scheduler.register_fixed_rate(
///     "refresh-hot-products",
///     ScheduleConfig::every(Duration::from_secs(300)),
///     || async { Ok(()) },
/// );
/// # }
/// ```
#[derive(Default)]
pub struct PeriodicScheduler {
    jobs: Mutex<HashMap<String, RegisteredJob>>,
}

impl PeriodicScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `task` under `name` and starts it.
    ///
    /// Must be called within a tokio runtime.
    pub fn register_fixed_rate<F, Fut>(
        &self,
        name: impl Into<String>,
        config: ScheduleConfig,
        task: F,
    ) -> Arc<JobState>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let name = name.into();
        let job: JobFn = Arc::new(move || -> JobFuture { Box::pin(task()) });
        let state = Arc::new(JobState::new());
        let handle = Self::start(name.clone(), config, Arc::clone(&job), Arc::clone(&state));

        let previous = self.jobs.lock().insert(
            name.clone(),
            RegisteredJob {
                job,
                state: Arc::clone(&state),
                _handle: handle,
            },
        );
        if previous.is_some() {
            info!(job = %name, "Replaced scheduled job");
        } else {
            info!(job = %name, "Registered scheduled job");
        }

        state
    }

    /// Registers `task` to run on a five-field cron `expression`.
    ///
    /// An expression that does not parse is an
    /// [`InvalidSettings`](RampartError::InvalidSettings) error and
    /// nothing is registered.
    pub fn register_cron<F, Fut>(
        &self,
        name: impl Into<String>,
        expression: &str,
        task: F,
    ) -> Result<Arc<JobState>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let config = ScheduleConfig::cron(expression)?;
        Ok(self.register_fixed_rate(name, config, task))
    }

    /// Starts `task` on its own tokio task without registering it.
    pub fn spawn<F, Fut>(name: impl Into<String>, config: ScheduleConfig, task: F) -> TaskHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let job: JobFn = Arc::new(move || -> JobFuture { Box::pin(task()) });
        Self::start(name.into(), config, job, Arc::new(JobState::new()))
    }

    fn start(name: String, config: ScheduleConfig, job: JobFn, state: Arc<JobState>) -> TaskHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run(name, config, job, state, shutdown_rx));
        TaskHandle { shutdown_tx }
    }

    /// Stops and removes `name`. Returns false if no such job exists.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = self.jobs.lock().remove(name).is_some();
        if removed {
            info!(job = %name, "Cancelled scheduled job");
        }
        removed
    }

    /// Runs `name` immediately, outside its schedule.
    ///
    /// Returns `None` if no such job exists.
    pub async fn trigger(&self, name: &str) -> Option<JobResult> {
        let (job, state) = {
            let jobs = self.jobs.lock();
            let registered = jobs.get(name)?;
            (Arc::clone(&registered.job), Arc::clone(&registered.state))
        };
        info!(job = %name, "Manual run triggered");
        Some(execute(name, &job, &state).await)
    }

    /// State of `name`, if registered.
    pub fn state(&self, name: &str) -> Option<Arc<JobState>> {
        self.jobs.lock().get(name).map(|job| Arc::clone(&job.state))
    }

    /// Names of registered jobs, sorted.
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Stops every job.
    pub fn shutdown(&self) {
        let count = {
            let mut jobs = self.jobs.lock();
            let count = jobs.len();
            jobs.clear();
            count
        };
        info!(count, "Scheduler shut down");
    }
}

impl std::fmt::Debug for PeriodicScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicScheduler")
            .field("jobs", &self.job_names())
            .finish()
    }
}

async fn run(
    name: String,
    config: ScheduleConfig,
    job: JobFn,
    state: Arc<JobState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        job = %name,
        interval = ?config.interval,
        cron = config.cron.is_some(),
        "Starting scheduled job"
    );
    let mut delay = config.first_delay();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let _ = execute(&name, &job, &state).await;
                delay = config.next_delay(state.failure_count());
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!(job = %name, "Scheduled job shutting down");
                    break;
                }
            }
        }
    }
}

async fn execute(name: &str, job: &JobFn, state: &JobState) -> JobResult {
    let started = Instant::now();
    let result = job().await;
    match &result {
        Ok(()) => {
            state.record_success(started.elapsed());
            debug!(job = %name, took = ?started.elapsed(), "Job run succeeded");
        },
        Err(e) => {
            state.record_failure(e.to_string());
            warn!(job = %name, failures = state.failure_count(), error = %e, "Job run failed");
        },
    }
    result
}
