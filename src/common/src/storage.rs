use std::sync::Arc;

use anyhow::Result;
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use url::Url;

use crate::config::StorageConfig;

/// Build the object store named by the storage configuration.
pub fn object_store_from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    object_store_from_dsn(&config.dsn)
}

/// Build an object store from a DSN.
///
/// Supported schemes:
/// - `memory://`: in-process store, test use
/// - `file:///path/to/dir`: local filesystem store
/// - `s3://[access_key:secret_key@]host[:port]/bucket`: S3 or an
///   S3-compatible endpoint such as MinIO
pub fn object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url =
        Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{dsn}': {e}"))?;

    match url.scheme() {
        "memory" => Ok(Arc::new(InMemory::new())),
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                anyhow::bail!("File DSN must specify a directory: file:///path/to/dir");
            }
            // file://.data/objects parses with ".data" as host; rejoin it
            let root = match url.host_str() {
                Some(host) => format!("{host}{path}"),
                None => path.to_string(),
            };
            std::fs::create_dir_all(&root)?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(root)?))
        }
        "s3" => {
            let store = s3_store_from_url(&url)?.build()?;
            Ok(Arc::new(store))
        }
        scheme => anyhow::bail!("Unsupported storage scheme: {scheme}. Supported: memory, file, s3"),
    }
}

/// Configure an S3 builder from a DSN of the form
/// `s3://[access_key:secret_key@]host[:port]/bucket`.
pub fn s3_store_from_url(url: &Url) -> Result<AmazonS3Builder> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let bucket = url.path().trim_start_matches('/');
    if bucket.is_empty() {
        anyhow::bail!("S3 DSN must specify a bucket: s3://host/bucket");
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region("us-east-1");

    let access_key = url.username();
    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(url.password().unwrap_or(""));
    }

    // Anything that is not AWS proper is an S3-compatible endpoint and
    // needs path-style requests (MinIO rejects virtual-hosted style)
    if !host.ends_with("amazonaws.com") {
        let scheme = if url.port() == Some(443) { "https" } else { "http" };
        let endpoint = match url.port() {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    Ok(builder)
}
