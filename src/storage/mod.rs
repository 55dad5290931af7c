//! Object storage for staged manifests and granule files
//! Uses Apache Arrow object_store crate

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
    staging_prefix: String,
    pdr_prefix: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        let defaults = StorageConfig::default();
        Self {
            store,
            bucket,
            staging_prefix: defaults.staging_prefix,
            pdr_prefix: defaults.pdr_prefix,
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "pdrbox-local".to_string())
    }

    /// Build the backend named by the configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match config.provider {
            StorageProvider::Memory => Arc::new(InMemory::new()),
            StorageProvider::Local => {
                std::fs::create_dir_all(&config.root)?;
                Arc::new(LocalFileSystem::new_with_prefix(&config.root)?)
            }
            StorageProvider::S3 => {
                let mut builder = AmazonS3Builder::new().with_bucket_name(&config.bucket);
                if let Some(ref region) = config.region {
                    builder = builder.with_region(region);
                }
                if let Some(ref endpoint) = config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                if let Some(ref key) = config.access_key {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(ref secret) = config.secret_key {
                    builder = builder.with_secret_access_key(secret);
                }
                Arc::new(builder.build()?)
            }
        };

        tracing::info!(provider = ?config.provider, bucket = %config.bucket, "Storage configured");

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
            staging_prefix: config.staging_prefix.clone(),
            pdr_prefix: config.pdr_prefix.clone(),
        })
    }

    /// Key of a staged manifest
    pub fn pdr_key(&self, pdr_name: &str) -> String {
        format!("{}/{}", self.pdr_prefix, pdr_name)
    }

    /// Key of a staged granule file
    pub fn staging_key(&self, collection_name: &str, file_name: &str) -> String {
        format!("{}/{}/{}", self.staging_prefix, collection_name, file_name)
    }

    /// Bucket-qualified location recorded in the ledger
    pub fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// Upload bytes to storage
    pub async fn upload(&self, key: &str, data: Bytes) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();

        let put_result = self.store.put(&path, data.into()).await?;

        tracing::info!(key, size, "Uploaded to storage");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag.clone(),
            size,
        })
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;

        tracing::debug!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
