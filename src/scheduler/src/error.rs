use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Manual run of a name no descriptor is registered under.
    #[error("job {0} not found")]
    JobNotFound(String),

    /// A manually run handler failed; scheduled fires log instead.
    #[error("job {name} failed")]
    Handler {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}
