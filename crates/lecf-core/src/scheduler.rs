//! Cooperative job scheduler
//!
//! Runs a small set of periodic jobs on the current task. Every job runs once
//! at startup, then again each time its interval has elapsed since its last
//! run finished. Jobs run one at a time and always to completion; shutdown is
//! only observed between jobs.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

/// A unit of periodic work
#[async_trait]
pub trait CycleJob: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run one cycle to completion
    ///
    /// Errors are handled inside the job; a cycle never fails the scheduler.
    async fn run(&mut self);
}

struct ScheduledJob {
    job: Box<dyn CycleJob>,
    interval: Duration,
    next_run: Instant,
}

/// Sequential scheduler for [`CycleJob`]s
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job` to run every `interval`
    pub fn add(&mut self, job: Box<dyn CycleJob>, interval: Duration) {
        info!(
            job = job.name(),
            interval_secs = interval.as_secs(),
            "Scheduled job"
        );
        self.jobs.push(ScheduledJob {
            job,
            interval,
            next_run: Instant::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run jobs until `shutdown` completes
    ///
    /// Every job runs once before `shutdown` is first checked.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        for scheduled in &mut self.jobs {
            Self::run_job(scheduled).await;
        }

        loop {
            let Some(next) = self.jobs.iter().map(|j| j.next_run).min() else {
                info!("No jobs scheduled, stopping");
                return;
            };

            tokio::select! {
                _ = sleep_until(next) => {
                    let now = Instant::now();
                    for scheduled in &mut self.jobs {
                        if scheduled.next_run <= now {
                            Self::run_job(scheduled).await;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, scheduler stopping");
                    return;
                }
            }
        }
    }

    async fn run_job(scheduled: &mut ScheduledJob) {
        debug!(job = scheduled.job.name(), "Running job");
        let started = Instant::now();
        scheduled.job.run().await;
        scheduled.next_run = Instant::now() + scheduled.interval;
        debug!(
            job = scheduled.job.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job finished"
        );
    }
}
