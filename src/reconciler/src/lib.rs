//! Orphaned-object reconciliation.
//!
//! Compares the contents of the object store against the file catalog and
//! deletes objects no catalog record points at. A run is read-then-delete
//! with no lock held in between: uploads that land mid-run are never
//! observed in the listing and therefore never targeted, and deletes are
//! idempotent, so concurrent runs are tolerated.
//!
//! - `gateway`: thin capability over the object store (paginated listing,
//!   idempotent delete, locator-to-key derivation)
//! - `engine`: the reconciliation algorithm and its statistics
//! - `error`: run-level and per-item failure taxonomy

pub mod engine;
pub mod error;
pub mod gateway;

pub use engine::{CatalogLookup, ReconcileEngine, ReconcileStats};
pub use error::ReconcileError;
pub use gateway::{ObjectStoreGateway, derive_key_from_locator};
