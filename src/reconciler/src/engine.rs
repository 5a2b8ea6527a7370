//! The reconciliation algorithm.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use common::catalog::{Catalog, FileReference};
use common::config::ReconcilerConfig;

use crate::error::ReconcileError;
use crate::gateway::{ObjectStoreGateway, derive_key_from_locator};

/// Catalog side of a reconciliation run: every current file reference,
/// locator included. No pagination contract; a large catalog batches
/// internally.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn list_live_references(&self) -> anyhow::Result<Vec<FileReference>>;
}

#[async_trait]
impl CatalogLookup for Catalog {
    async fn list_live_references(&self) -> anyhow::Result<Vec<FileReference>> {
        Ok(self.list_file_locators().await?)
    }
}

/// Statistics of one reconciliation run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ReconcileStats {
    /// Orphaned objects deleted this run (would-be deletions in dry-run).
    pub deleted: usize,
    /// Keys present in the store when the run started.
    pub total: usize,
}

/// Orchestrates listing, catalog lookup, set difference, and best-effort
/// bulk deletion.
///
/// Collaborators are injected at construction; the engine holds no global
/// state and caches nothing across runs.
pub struct ReconcileEngine {
    gateway: ObjectStoreGateway,
    catalog: Arc<dyn CatalogLookup>,
    config: ReconcilerConfig,
}

impl ReconcileEngine {
    pub fn new(
        gateway: ObjectStoreGateway,
        catalog: Arc<dyn CatalogLookup>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            gateway,
            catalog,
            config,
        }
    }

    /// Delete every object in the store that no catalog reference points
    /// at, returning `{deleted, total}`.
    ///
    /// Listing and catalog failures abort the run with no partial stats;
    /// per-key delete failures and malformed locators are logged and
    /// skipped. A run that exceeds the configured timeout aborts as
    /// `StoreUnavailable` so a stuck store cannot block the next fire.
    pub async fn reconcile_orphans(&self) -> Result<ReconcileStats, ReconcileError> {
        match self.config.run_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run()).await.map_err(|_| {
                ReconcileError::StoreUnavailable(anyhow::anyhow!(
                    "reconciliation run exceeded {limit:?}"
                ))
            })?,
            None => self.run().await,
        }
    }

    async fn run(&self) -> Result<ReconcileStats, ReconcileError> {
        tracing::info!(dry_run = self.config.dry_run, "Starting reconciliation run");

        let store_keys = self.gateway.list_all_keys().await?;
        tracing::info!(store_keys = store_keys.len(), "Listed object store");

        let references = self
            .catalog
            .list_live_references()
            .await
            .map_err(ReconcileError::CatalogUnavailable)?;
        tracing::info!(references = references.len(), "Fetched catalog references");

        let mut live_keys: HashSet<String> = HashSet::with_capacity(references.len());
        for reference in &references {
            match derive_key_from_locator(&reference.locator) {
                Ok(key) => {
                    live_keys.insert(key);
                }
                Err(_) => {
                    // dropped from the live set; the object it pointed at,
                    // if any, will be deleted as an orphan
                    tracing::warn!(
                        locator = %reference.locator,
                        "Skipping reference with malformed locator"
                    );
                }
            }
        }

        let orphans: Vec<&String> = store_keys
            .iter()
            .filter(|key| !live_keys.contains(key.as_str()))
            .collect();
        tracing::info!(
            orphans = orphans.len(),
            live = live_keys.len(),
            "Identified orphaned objects"
        );

        let mut deleted = 0;
        for key in orphans {
            if self.config.dry_run {
                tracing::info!(key = %key, "[DRY-RUN] Would delete orphaned object");
                deleted += 1;
                continue;
            }

            match self.gateway.delete_key(key).await {
                Ok(()) => {
                    tracing::info!(key = %key, "Deleted orphaned object");
                    deleted += 1;
                }
                Err(err) => {
                    // best-effort bulk delete: the failed key stays behind
                    // for the next run
                    tracing::warn!(key = %key, error = %err, "Failed to delete orphaned object");
                }
            }
        }

        let stats = ReconcileStats {
            deleted,
            total: store_keys.len(),
        };
        tracing::info!(
            deleted = stats.deleted,
            total = stats.total,
            dry_run = self.config.dry_run,
            "Reconciliation run complete"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use object_store::{ObjectStore, memory::InMemory, path::Path as ObjectPath};
    use std::time::Duration;

    struct StubCatalog {
        locators: Vec<String>,
    }

    #[async_trait]
    impl CatalogLookup for StubCatalog {
        async fn list_live_references(&self) -> anyhow::Result<Vec<FileReference>> {
            Ok(self
                .locators
                .iter()
                .map(|locator| FileReference {
                    locator: locator.clone(),
                    created_at: Utc::now(),
                })
                .collect())
        }
    }

    struct UnavailableCatalog;

    #[async_trait]
    impl CatalogLookup for UnavailableCatalog {
        async fn list_live_references(&self) -> anyhow::Result<Vec<FileReference>> {
            anyhow::bail!("connection refused")
        }
    }

    struct SlowCatalog;

    #[async_trait]
    impl CatalogLookup for SlowCatalog {
        async fn list_live_references(&self) -> anyhow::Result<Vec<FileReference>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    async fn seeded_store(keys: &[&str]) -> Arc<InMemory> {
        let store = Arc::new(InMemory::new());
        for key in keys {
            store
                .put(&ObjectPath::from(*key), b"data".to_vec().into())
                .await
                .unwrap();
        }
        store
    }

    fn engine_with(
        store: Arc<InMemory>,
        locators: &[&str],
        config: ReconcilerConfig,
    ) -> ReconcileEngine {
        let gateway = ObjectStoreGateway::new(store);
        let catalog = Arc::new(StubCatalog {
            locators: locators.iter().map(|l| l.to_string()).collect(),
        });
        ReconcileEngine::new(gateway, catalog, config)
    }

    async fn remaining_keys(store: &InMemory) -> Vec<String> {
        use tokio_stream::StreamExt;
        let mut keys = vec![];
        let mut listing = store.list(None);
        while let Some(meta) = listing.next().await {
            keys.push(meta.unwrap().location.to_string());
        }
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_deletes_exactly_the_orphans() {
        let store = seeded_store(&["a", "b", "c"]).await;
        let engine = engine_with(
            store.clone(),
            &["http://localhost:9000/files/b?X-Amz-Signature=sig"],
            ReconcilerConfig::default(),
        );

        let stats = engine.reconcile_orphans().await.unwrap();

        assert_eq!(stats, ReconcileStats { deleted: 2, total: 3 });
        assert_eq!(remaining_keys(&store).await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_second_run_deletes_nothing() {
        let store = seeded_store(&["a", "b"]).await;
        let engine = engine_with(
            store.clone(),
            &["http://localhost:9000/files/b"],
            ReconcilerConfig::default(),
        );

        let first = engine.reconcile_orphans().await.unwrap();
        assert_eq!(first, ReconcileStats { deleted: 1, total: 2 });

        let second = engine.reconcile_orphans().await.unwrap();
        assert_eq!(second, ReconcileStats { deleted: 0, total: 1 });
        assert_eq!(remaining_keys(&store).await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_malformed_locator_is_dropped_from_live_set() {
        // "shadowed" is referenced only by a locator with no trailing
        // segment; the reference is skipped, so the object is deleted
        let store = seeded_store(&["shadowed", "live"]).await;
        let engine = engine_with(
            store.clone(),
            &[
                "http://localhost:9000/files/live",
                "http://localhost:9000/files/",
            ],
            ReconcilerConfig::default(),
        );

        let stats = engine.reconcile_orphans().await.unwrap();

        assert_eq!(stats, ReconcileStats { deleted: 1, total: 2 });
        assert_eq!(remaining_keys(&store).await, vec!["live"]);
    }

    #[tokio::test]
    async fn test_empty_store_is_a_noop() {
        let store = seeded_store(&[]).await;
        let engine = engine_with(
            store.clone(),
            &["http://localhost:9000/files/b"],
            ReconcilerConfig::default(),
        );

        let stats = engine.reconcile_orphans().await.unwrap();
        assert_eq!(stats, ReconcileStats { deleted: 0, total: 0 });
    }

    #[tokio::test]
    async fn test_catalog_failure_aborts_run() {
        let store = seeded_store(&["a"]).await;
        let gateway = ObjectStoreGateway::new(store.clone());
        let engine = ReconcileEngine::new(
            gateway,
            Arc::new(UnavailableCatalog),
            ReconcilerConfig::default(),
        );

        let err = engine.reconcile_orphans().await.unwrap_err();
        assert!(matches!(err, ReconcileError::CatalogUnavailable(_)));
        // nothing was deleted
        assert_eq!(remaining_keys(&store).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_deleting() {
        let store = seeded_store(&["a", "b"]).await;
        let config = ReconcilerConfig {
            dry_run: true,
            ..ReconcilerConfig::default()
        };
        let engine = engine_with(store.clone(), &[], config);

        let stats = engine.reconcile_orphans().await.unwrap();

        assert_eq!(stats, ReconcileStats { deleted: 2, total: 2 });
        assert_eq!(remaining_keys(&store).await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_run_timeout_surfaces_as_store_unavailable() {
        let store = seeded_store(&["a"]).await;
        let gateway = ObjectStoreGateway::new(store.clone());
        let config = ReconcilerConfig {
            run_timeout: Some(Duration::from_millis(20)),
            ..ReconcilerConfig::default()
        };
        let engine = ReconcileEngine::new(gateway, Arc::new(SlowCatalog), config);

        let err = engine.reconcile_orphans().await.unwrap_err();
        assert!(matches!(err, ReconcileError::StoreUnavailable(_)));
        assert_eq!(remaining_keys(&store).await, vec!["a"]);
    }
}
