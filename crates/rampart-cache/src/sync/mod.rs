//! Background job scheduling.
//!
//! Periodic work (mirror cleanup, integrator refresh jobs) runs on tokio
//! tasks owned by a [`PeriodicScheduler`] and stops through a
//! [`TaskHandle`] instead of detached threads.

mod scheduler;
mod state;

pub use scheduler::{JobResult, PeriodicScheduler, ScheduleConfig, TaskHandle};
pub use state::JobState;
