//! Object store construction
//!
//! The pipelines consume object storage through `Arc<dyn ObjectStore>`,
//! so only the construction here knows which backend is in play: S3 (or
//! an S3-compatible endpoint) for `s3://` URLs, the local filesystem for
//! `file://` URLs.

use std::sync::Arc;

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;

use crate::Result;
use crate::config::StorageConfig;

pub fn build_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    if let Some(rest) = config.url.strip_prefix("s3://") {
        let bucket = rest.split('/').next().unwrap_or("");

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&config.region);

        if !config.access_key.is_empty() {
            builder = builder.with_access_key_id(&config.access_key);
        }
        if !config.secret_key.is_empty() {
            builder = builder.with_secret_access_key(&config.secret_key);
        }
        if !config.endpoint.is_empty() {
            builder = builder.with_endpoint(&config.endpoint);
        }

        Ok(Arc::new(builder.build()?))
    } else {
        let path = config.url.strip_prefix("file://").unwrap_or(&config.url);
        Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
    }
}
