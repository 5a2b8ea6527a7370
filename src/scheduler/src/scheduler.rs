use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::SchedulerError;
use crate::job::{JobDescriptor, JobHandler, JobOutcome};

/// Check a cron expression against the scheduler's grammar.
pub fn validate_schedule(expression: &str) -> bool {
    Schedule::from_str(expression).is_ok()
}

/// Runtime handle binding one registered job to its armed timer task.
struct ScheduledTask {
    handle: JoinHandle<()>,
}

/// Owns the job registry and the armed timers.
///
/// The descriptor registry is always a superset of the armed set: arming
/// only ever starts from a registered descriptor, and stopping removes
/// the timer without touching the registry, so jobs restart without
/// re-registration.
#[derive(Default)]
pub struct JobScheduler {
    jobs: HashMap<String, JobDescriptor>,
    tasks: HashMap<String, ScheduledTask>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job under `name`, upserting any existing descriptor.
    ///
    /// An invalid cron expression logs an error and registers nothing;
    /// registration is never an error the caller has to handle.
    pub fn register_job(&mut self, name: &str, schedule: &str, handler: JobHandler, active: bool) {
        let parsed = match Schedule::from_str(schedule) {
            Ok(parsed) => parsed,
            Err(err) => {
                error!(
                    job = %name,
                    schedule = %schedule,
                    error = %err,
                    "Invalid cron schedule, job not registered"
                );
                return;
            }
        };

        let descriptor = JobDescriptor {
            name: name.to_string(),
            schedule: parsed,
            expression: schedule.to_string(),
            handler,
            active,
        };

        if self.jobs.insert(name.to_string(), descriptor).is_some() {
            info!(job = %name, schedule = %schedule, "Updated existing job");
        } else {
            info!(job = %name, schedule = %schedule, "Registered new job");
        }
    }

    /// Arm a timer for every active registered job.
    pub fn start_all_jobs(&mut self) {
        info!("Starting scheduler");

        let active: Vec<JobDescriptor> =
            self.jobs.values().filter(|job| job.active).cloned().collect();
        for job in active {
            self.start_job(job);
        }

        info!(active_jobs = self.tasks.len(), "Scheduler started");
    }

    fn start_job(&mut self, job: JobDescriptor) {
        // one timer per name: an already-armed job is stopped first
        if let Some(task) = self.tasks.remove(&job.name) {
            task.handle.abort();
        }

        info!(job = %job.name, schedule = %job.expression, "Job scheduled");
        let name = job.name.clone();
        let handle = tokio::spawn(run_schedule(job));
        self.tasks.insert(name, ScheduledTask { handle });
    }

    /// Disarm every timer. Descriptors stay registered.
    pub fn stop_all_jobs(&mut self) {
        info!("Stopping all scheduled jobs");

        for (name, task) in self.tasks.drain() {
            task.handle.abort();
            info!(job = %name, "Job stopped");
        }
    }

    /// Run a registered job once, outside of its schedule, awaiting the
    /// handler and propagating its outcome. Works whether or not the job
    /// is currently armed.
    pub async fn run_job_manually(&self, name: &str) -> Result<JobOutcome, SchedulerError> {
        let job = self
            .jobs
            .get(name)
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_string()))?;

        info!(job = %name, "Manually running job");
        match (job.handler)().await {
            Ok(outcome) => {
                info!(job = %name, "Manual job run completed");
                Ok(outcome)
            }
            Err(source) => {
                error!(job = %name, error = %source, "Manual job run failed");
                Err(SchedulerError::Handler {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Registered descriptor for `name`, armed or not.
    pub fn descriptor(&self, name: &str) -> Option<&JobDescriptor> {
        self.jobs.get(name)
    }

    /// Whether `name` currently has an armed timer.
    pub fn is_armed(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Number of armed timers.
    pub fn armed_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.handle.abort();
        }
    }
}

/// Timer loop for one armed job: sleep until the next cron fire, invoke
/// the handler, repeat. Handler failures are logged; the cadence
/// continues regardless of individual run outcomes.
async fn run_schedule(job: JobDescriptor) {
    loop {
        let Some(next) = job.schedule.upcoming(Utc).next() else {
            warn!(job = %job.name, "Schedule has no upcoming fire, disarming");
            return;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        info!(job = %job.name, "Running scheduled job");
        match (job.handler)().await {
            Ok(_) => info!(job = %job.name, "Job completed successfully"),
            Err(err) => error!(job = %job.name, error = %err, "Job run failed"),
        }
    }
}
