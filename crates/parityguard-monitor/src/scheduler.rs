//! Cron-driven job scheduling with a shared cancellation token.
//!
//! Every registered job gets its own task. A job firing runs under the
//! configured timeout; timeouts and errors go to the alerter and never stop
//! the schedule.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alerter::Alerter;
use crate::config::parse_schedule;
use crate::errors::{MonitorError, Result};

pub type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A job body. It receives the session token and should stop when it fires.
pub type JobFn = Arc<dyn Fn(CancellationToken) -> JobFuture + Send + Sync>;

/// Box an async closure as a [`JobFn`].
pub fn job_fn<F, Fut>(f: F) -> JobFn
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |token| -> JobFuture { Box::pin(f(token)) })
}

struct ScheduledJob {
    name: String,
    schedule: Schedule,
    job: JobFn,
}

/// Collects named jobs before they are started together.
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    job_timeout: Duration,
    alerter: Arc<Alerter>,
}

impl Scheduler {
    pub fn new(job_timeout: Duration, alerter: Arc<Alerter>) -> Self {
        Self {
            jobs: Vec::new(),
            job_timeout,
            alerter,
        }
    }

    /// Register `job` under `name` with a cron expression (seconds first).
    pub fn add(&mut self, name: impl Into<String>, expression: &str, job: JobFn) -> Result<()> {
        let name = name.into();
        let schedule = parse_schedule(&name, expression)?;
        self.jobs.push(ScheduledJob { name, schedule, job });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name.as_str()).collect()
    }

    /// Spawn one task per job. All of them stop when `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> SchedulerHandle {
        let tasks = self
            .jobs
            .into_iter()
            .map(|job| {
                let cancel = cancel.clone();
                let alerter = Arc::clone(&self.alerter);
                let timeout = self.job_timeout;
                tokio::spawn(run_schedule(job, cancel, timeout, alerter))
            })
            .collect();
        SchedulerHandle { cancel, tasks }
    }
}

/// Running jobs of one session.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Cancel every job and wait for the tasks to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!(event = "scheduler_task_join_failed", error = %err);
            }
        }
    }
}

async fn run_schedule(job: ScheduledJob, cancel: CancellationToken, timeout: Duration, alerter: Arc<Alerter>) {
    tracing::info!(event = "job_scheduled", job = %job.name);
    loop {
        let Some(next) = job.schedule.upcoming(Utc).next() else {
            tracing::info!(event = "job_schedule_exhausted", job = %job.name);
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        run_job(&job.name, &job.job, &cancel, timeout, &alerter).await;
    }
    tracing::info!(event = "job_stopped", job = %job.name);
}

/// Run one firing of a job under `timeout`, reporting failures.
pub async fn run_job(name: &str, job: &JobFn, cancel: &CancellationToken, timeout: Duration, alerter: &Alerter) {
    let started = std::time::Instant::now();
    tracing::info!(event = "job_started", job = %name);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!(event = "job_cancelled", job = %name);
            return;
        }
        outcome = tokio::time::timeout(timeout, (job.as_ref())(cancel.clone())) => outcome,
    };

    match outcome {
        Ok(Ok(())) => {
            tracing::info!(
                event = "job_finished",
                job = %name,
                duration_ms = started.elapsed().as_millis() as u64
            );
        }
        Ok(Err(MonitorError::Core(parityguard_core::Error::Cancelled))) => {
            tracing::info!(event = "job_cancelled", job = %name);
        }
        Ok(Err(err)) => {
            tracing::error!(event = "job_failed", job = %name, error = %err);
            alerter.error(name, &err).await;
        }
        Err(_) => {
            let err = MonitorError::JobTimeout {
                job: name.to_string(),
                secs: timeout.as_secs(),
            };
            tracing::error!(event = "job_timed_out", job = %name, error = %err);
            alerter.error(name, &err).await;
        }
    }
}
