//! Object storage backend (S3/MinIO/local filesystem/memory) built on the
//! `object_store` crate.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::{ByteStream, RemoteEntry, RemoteStore, RemoteStoreConfig};
use crate::error::{BinaryStoreError, Result};

/// Default key prefix for binaries.
const DEFAULT_PREFIX: &str = "data";

/// Files larger than this are uploaded in parts (8MB).
const MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Size of each chunk handed to the multipart writer.
const MULTIPART_CHUNK_SIZE: usize = 1024 * 1024;

/// Parts allowed in flight during a multipart upload.
const MULTIPART_CONCURRENCY: usize = 4;

/// Wrapper around different object storage backends.
#[derive(Debug, Clone)]
pub struct ObjectRemoteStore {
    inner: Arc<dyn ObjectStore>,
    prefix: String,
    id: String,
}

impl ObjectRemoteStore {
    /// Create a new storage backend from configuration.
    pub async fn new(config: &RemoteStoreConfig) -> Result<Self> {
        match config {
            RemoteStoreConfig::Memory => Ok(Self::memory()),

            RemoteStoreConfig::ObjectLocal { path, prefix } => {
                // Ensure directory exists
                tokio::fs::create_dir_all(path).await?;
                let store = LocalFileSystem::new_with_prefix(path)
                    .map_err(|e| BinaryStoreError::InvalidConfig(e.to_string()))?;
                Ok(Self::from_store(
                    Arc::new(store),
                    prefix.as_deref(),
                    format!("file:{}", path.display()),
                ))
            }

            RemoteStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
                prefix,
            } => {
                let builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"));

                let store: Arc<dyn ObjectStore> = Arc::new(
                    builder
                        .build()
                        .map_err(|e| BinaryStoreError::InvalidConfig(e.to_string()))?,
                );

                // Verify bucket exists by listing (empty prefix)
                // This will fail fast if the bucket doesn't exist
                {
                    let probe = ObjectPath::from("");
                    let mut stream = store.list(Some(&probe));
                    match stream.try_next().await {
                        Ok(_) => {} // Bucket exists (may or may not have items)
                        Err(object_store::Error::NotFound { .. }) => {
                            return Err(BinaryStoreError::BucketNotFound(bucket.clone()));
                        }
                        Err(e) => {
                            let msg = e.to_string();
                            if msg.contains("NoSuchBucket")
                                || msg.contains("bucket") && msg.contains("not")
                            {
                                return Err(BinaryStoreError::BucketNotFound(bucket.clone()));
                            }
                            return Err(e.into());
                        }
                    }
                }

                let prefix = normalize_prefix(prefix.as_deref());
                let id = format!("s3:{}/{}", bucket, prefix);
                Ok(Self::from_store(store, Some(&prefix), id))
            }

            RemoteStoreConfig::Local { .. } => Err(BinaryStoreError::InvalidConfig(
                "native local storage is not an object store backend".to_string(),
            )),
        }
    }

    /// Create an in-memory storage backend.
    pub fn memory() -> Self {
        Self::from_store(Arc::new(InMemory::new()), None, "memory".to_string())
    }

    /// Wrap an existing `object_store` implementation.
    pub fn from_store(inner: Arc<dyn ObjectStore>, prefix: Option<&str>, id: String) -> Self {
        Self {
            inner,
            prefix: normalize_prefix(prefix),
            id,
        }
    }

    /// Get the underlying object store.
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }

    /// Build the object path for a key.
    fn object_path(&self, key: &str) -> ObjectPath {
        ObjectPath::from(format!("{}/{}", self.prefix, key))
    }

    async fn put_multipart(&self, path: &ObjectPath, mut file: tokio::fs::File) -> Result<()> {
        let upload = self.inner.put_multipart(path).await?;
        let mut writer = WriteMultipart::new(upload);
        let mut buf = BytesMut::zeroed(MULTIPART_CHUNK_SIZE);

        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(MULTIPART_CONCURRENCY).await {
                let _ = writer.abort().await;
                return Err(e.into());
            }
            writer.write(&buf[..n]);
        }

        writer.finish().await?;
        Ok(())
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    prefix
        .map(|p| p.trim_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string())
}

#[async_trait]
impl RemoteStore for ObjectRemoteStore {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn put(&self, key: &str, source: &Path) -> Result<()> {
        let path = self.object_path(key);
        let file = tokio::fs::File::open(source).await?;
        let size = file.metadata().await?.len();

        debug!(key = %key, size = size, "uploading object");
        if size > MULTIPART_THRESHOLD {
            self.put_multipart(&path, file).await?;
        } else {
            let data = Bytes::from(tokio::fs::read(source).await?);
            self.inner.put(&path, data.into()).await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ByteStream>> {
        let path = self.object_path(key);
        match self.inner.get(&path).await {
            Ok(result) => {
                let stream = result
                    .into_stream()
                    .map_err(BinaryStoreError::from)
                    .boxed();
                Ok(Some(stream))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn head(&self, key: &str) -> Result<Option<u64>> {
        let path = self.object_path(key);
        match self.inner.head(&path).await {
            Ok(meta) => Ok(Some(meta.size as u64)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key);
        // Ignore NotFound errors - the object may already be deleted
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> BoxStream<'_, Result<RemoteEntry>> {
        let prefix = ObjectPath::from(self.prefix.as_str());
        let strip = format!("{}/", self.prefix);
        self.inner
            .list(Some(&prefix))
            .map_err(BinaryStoreError::from)
            .try_filter_map(move |meta| {
                let entry = match meta.location.as_ref().strip_prefix(strip.as_str()) {
                    Some(key) => Some(RemoteEntry {
                        key: key.to_string(),
                        size: meta.size as u64,
                    }),
                    None => {
                        warn!(location = %meta.location, "object outside of prefix, skipping");
                        None
                    }
                };
                futures::future::ready(Ok(entry))
            })
            .boxed()
    }
}
