use thiserror::Error;

/// Failure taxonomy for a reconciliation run.
///
/// `StoreUnavailable` and `CatalogUnavailable` are fatal to the current
/// run; the scheduler retries on the next cadence. `MalformedReference`
/// is per-item: the reference is skipped and the run continues.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(#[source] anyhow::Error),

    #[error("no object key can be derived from locator {locator:?}")]
    MalformedReference { locator: String },
}

impl From<object_store::Error> for ReconcileError {
    fn from(err: object_store::Error) -> Self {
        ReconcileError::StoreUnavailable(err.into())
    }
}
