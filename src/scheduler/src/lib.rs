//! Process-wide registry of named, cron-scheduled jobs.
//!
//! Jobs are registered by name with a cron cadence and an async handler,
//! then armed and disarmed as a set. A registered job can also be invoked
//! manually, bypassing its schedule entirely. Handler failures on a
//! scheduled fire are logged and never disarm the timer; on a manual run
//! they propagate to the caller.

mod error;
mod job;
mod scheduler;

pub use error::SchedulerError;
pub use job::{JobDescriptor, JobHandler, JobOutcome, handler};
pub use scheduler::{JobScheduler, validate_schedule};
