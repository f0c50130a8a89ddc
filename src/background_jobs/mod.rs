//! Background job scheduling and execution system.
//!
//! Runs periodic and startup-triggered tasks, such as pulling recently
//! played items, on blocking worker threads.

mod context;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::JobScheduler;
