use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use cron::Schedule;

/// Value a job run yields, surfaced in logs and manual-run output.
pub type JobOutcome = serde_json::Value;

/// Boxed zero-argument async job body.
pub type JobHandler =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<JobOutcome>> + Send>> + Send + Sync>;

/// Wrap an async closure into a [`JobHandler`].
pub fn handler<F, Fut>(f: F) -> JobHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<JobOutcome>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// A registered job. Re-registering the same name replaces the whole
/// descriptor; there is no merge and no delete, only deactivation.
#[derive(Clone)]
pub struct JobDescriptor {
    pub name: String,
    /// Parsed cadence; fires are computed against UTC.
    pub schedule: Schedule,
    /// Source cron expression, kept for logging.
    pub expression: String,
    pub handler: JobHandler,
    pub active: bool,
}
