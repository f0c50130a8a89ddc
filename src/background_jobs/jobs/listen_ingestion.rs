//! Background job that pulls the recently played page into the listen store.
//!
//! Each execution is one ingestion run. The scheduler guarantees runs never
//! overlap, which is what keeps the per-run entity cache and the uniqueness
//! checks consistent.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
};
use crate::ingestion::IngestionRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct ListenIngestionJob {
    runner: Arc<IngestionRunner>,
    /// Time between two runs
    interval: Duration,
    /// Also run once as soon as the scheduler starts
    run_on_startup: bool,
}

impl ListenIngestionJob {
    pub fn new(runner: Arc<IngestionRunner>, interval: Duration, run_on_startup: bool) -> Self {
        Self {
            runner,
            interval,
            run_on_startup,
        }
    }
}

impl BackgroundJob for ListenIngestionJob {
    fn id(&self) -> &'static str {
        "listen_ingestion"
    }

    fn name(&self) -> &'static str {
        "Listen Ingestion"
    }

    fn description(&self) -> &'static str {
        "Fetches recently played tracks and stores them as listens"
    }

    fn schedule(&self) -> JobSchedule {
        if self.run_on_startup {
            JobSchedule::Combined {
                interval: Some(self.interval),
                hooks: vec![HookEvent::OnStartup],
            }
        } else {
            JobSchedule::Interval(self.interval)
        }
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let summary = self.runner.run(&ctx.triggered_by, &ctx.cancellation_token);

        if ctx.is_cancelled() {
            info!("Listen ingestion interrupted: {}", summary);
            return Err(JobError::Cancelled);
        }
        match summary.aborted {
            Some(reason) => Err(JobError::ExecutionFailed(reason)),
            None => Ok(()),
        }
    }
}
