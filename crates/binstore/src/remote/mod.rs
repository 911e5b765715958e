//! Remote storage backends.
//!
//! A [`RemoteStore`] stores raw bytes by key. The binary manager only ever
//! uses digests as keys, but a backend may hold other objects (metadata,
//! manifests) that listing must still report so the garbage collector can
//! skip them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::error::{BinaryStoreError, Result};

mod local;
mod object;

pub(crate) use local::DEFAULT_DEPTH;
pub use local::LocalRemoteStore;
pub use object::ObjectRemoteStore;

/// Chunk size used when streaming local files.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A finite stream of content chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One object reported by [`RemoteStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub key: String,
    pub size: u64,
}

/// Capability interface implemented once per storage backend.
///
/// "Not found" is never an error: `get` and `head` return `None` and
/// `delete` succeeds. Every other backend fault surfaces as a storage
/// failure and is not retried here.
#[async_trait]
pub trait RemoteStore: Send + Sync + std::fmt::Debug {
    /// Stable identifier of the underlying storage, e.g. `s3:bucket/prefix`.
    fn id(&self) -> String;

    /// Store the bytes of a local file under `key`.
    ///
    /// Storing the same key twice leaves the same observable state.
    async fn put(&self, key: &str, source: &Path) -> Result<()>;

    /// Stream the content stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<ByteStream>>;

    /// Size of the content stored under `key`, if any.
    async fn head(&self, key: &str) -> Result<Option<u64>>;

    /// Remove the content stored under `key`; absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Enumerate every object. The stream is lazy, finite and unordered;
    /// backends with paginated listings fetch pages as it is polled.
    fn list(&self) -> BoxStream<'_, Result<RemoteEntry>>;
}

/// Configuration for the remote storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Native local filesystem storage with sharded directories
    Local {
        /// Root directory of the store
        path: PathBuf,
        /// Number of two-character directory levels above each object
        #[serde(default = "default_depth")]
        depth: usize,
    },

    /// Local filesystem through the generic object store client
    ObjectLocal {
        /// Root directory of the store
        path: PathBuf,
        /// Key prefix under which binaries are stored
        #[serde(default)]
        prefix: Option<String>,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
        /// Key prefix under which binaries are stored (defaults to "data")
        #[serde(default)]
        prefix: Option<String>,
    },
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

impl RemoteStoreConfig {
    /// Build the backend described by this configuration.
    pub async fn build(&self) -> Result<Arc<dyn RemoteStore>> {
        let store: Arc<dyn RemoteStore> = match self {
            RemoteStoreConfig::Local { path, depth } => {
                Arc::new(LocalRemoteStore::new(path, *depth).await?)
            }
            _ => Arc::new(ObjectRemoteStore::new(self).await?),
        };
        tracing::info!(remote = %store.id(), "remote store ready");
        Ok(store)
    }
}

/// Stream a local file in fixed-size chunks. The file is closed when the
/// stream ends or is dropped.
pub(crate) fn file_stream(file: tokio::fs::File) -> ByteStream {
    stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::zeroed(STREAM_CHUNK_SIZE);
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, BinaryStoreError>(None);
        }
        buf.truncate(n);
        Ok(Some((buf.freeze(), file)))
    })
    .boxed()
}

/// Drain a byte stream into memory.
pub async fn collect_stream(mut stream: ByteStream) -> Result<Bytes> {
    let mut out = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out.freeze())
}
