//! Thin capability over the object store.

use std::sync::Arc;

use object_store::{ObjectStore, path::Path as ObjectPath};
use tokio_stream::StreamExt;
use url::Url;

use crate::error::ReconcileError;

/// Keys requested per listing page unless overridden.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Gateway to the object store holding the uploaded blobs.
///
/// Keys are opaque strings, unique within the bucket; the gateway never
/// interprets them beyond exact equality.
pub struct ObjectStoreGateway {
    store: Arc<dyn ObjectStore>,
    page_size: usize,
}

impl ObjectStoreGateway {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        // a zero page would loop forever on a non-empty bucket
        self.page_size = page_size.max(1);
        self
    }

    /// List every key in the bucket, in store order.
    ///
    /// Pages through the listing with a continuation cursor: each page
    /// requests keys lexically after the last key of the previous page,
    /// until a short page ends the listing. The listing restarts from
    /// scratch on every call; nothing is cached across runs.
    pub async fn list_all_keys(&self) -> Result<Vec<String>, ReconcileError> {
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: Option<ObjectPath> = None;

        loop {
            let mut page = match &cursor {
                Some(after) => self.store.list_with_offset(None, after),
                None => self.store.list(None),
            };

            let mut page_len = 0;
            while page_len < self.page_size {
                match page.next().await {
                    Some(meta) => {
                        let meta = meta?;
                        keys.push(meta.location.to_string());
                        page_len += 1;
                    }
                    // short page: the listing is exhausted
                    None => return Ok(keys),
                }
            }

            cursor = keys.last().map(|key| ObjectPath::from(key.as_str()));
        }
    }

    /// Delete a single object.
    ///
    /// Deleting a key that no longer exists is a success: another run or
    /// the delete path may have raced us, and the outcome is the same.
    pub async fn delete_key(&self, key: &str) -> Result<(), ReconcileError> {
        match self.store.delete(&ObjectPath::from(key)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Derive an object key from a stored locator.
///
/// The key is the trailing path segment of the locator: a URL (query and
/// fragment ignored, as in presigned download URLs) or a bare
/// slash-separated path. A locator without an extractable trailing
/// segment is malformed.
pub fn derive_key_from_locator(locator: &str) -> Result<String, ReconcileError> {
    let malformed = || ReconcileError::MalformedReference {
        locator: locator.to_string(),
    };

    let path = match Url::parse(locator) {
        Ok(url) => url.path().to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            // bare path: strip any query/fragment by hand
            match locator.split(['?', '#']).next() {
                Some(path) => path.to_string(),
                None => return Err(malformed()),
            }
        }
        Err(_) => return Err(malformed()),
    };

    match path.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => Ok(segment.to_string()),
        _ => Err(malformed()),
    }
}
