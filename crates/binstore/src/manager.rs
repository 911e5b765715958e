//! BinaryManager - the entry point tying the cache, the remote store and
//! the garbage collector together.

use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::binary::Binary;
use crate::cache::{CacheConfig, LocalFileCache};
use crate::config::BinaryStoreConfig;
use crate::digest::{Digest, DigestAlgorithm};
use crate::error::Result;
use crate::gc::GarbageCollector;
use crate::remote::{ObjectRemoteStore, RemoteStore};

/// Stores content by digest and hands out lazy [`Binary`] handles.
///
/// Cloning is cheap; clones share the cache and the garbage collector.
///
/// # Example
///
/// ```rust,no_run
/// use binstore::BinaryManager;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), binstore::BinaryStoreError> {
/// let manager = BinaryManager::new_local(Path::new("/tmp/binaries")).await?;
///
/// let binary = manager.store_bytes("hello").await?;
/// assert_eq!(binary.digest().as_str(), "5d41402abc4b2a76b9719d911017c592");
///
/// let same = manager.get_binary("5d41402abc4b2a76b9719d911017c592")?;
/// assert_eq!(same.read_to_bytes().await?.as_ref(), b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BinaryManager {
    remote: Arc<dyn RemoteStore>,
    cache: LocalFileCache,
    algorithm: DigestAlgorithm,
    gc: GarbageCollector,
}

impl BinaryManager {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        cache: LocalFileCache,
        algorithm: DigestAlgorithm,
    ) -> Self {
        let gc = GarbageCollector::new(remote.clone(), algorithm);
        Self {
            remote,
            cache,
            algorithm,
            gc,
        }
    }

    /// Build the backend and open the cache described by `config`.
    pub async fn from_config(config: &BinaryStoreConfig) -> Result<Self> {
        let remote = config.remote.build().await?;
        let cache = LocalFileCache::open(&config.cache).await?;
        info!(
            remote = %remote.id(),
            cache = %config.cache.path.display(),
            digest = %config.digest,
            "binary manager ready"
        );
        Ok(Self::new(remote, cache, config.digest))
    }

    /// Store with a native local backend and cache, both under `base`.
    pub async fn new_local(base: &Path) -> Result<Self> {
        Self::from_config(&BinaryStoreConfig::local(base)).await
    }

    /// Store with in-memory remote storage; only the cache touches disk.
    pub async fn new_ephemeral(cache_dir: &Path) -> Result<Self> {
        let cache = LocalFileCache::open(&CacheConfig::new(cache_dir)).await?;
        Ok(Self::new(
            Arc::new(ObjectRemoteStore::memory()),
            cache,
            DigestAlgorithm::default(),
        ))
    }

    /// Consume `reader` and store its bytes under their digest.
    ///
    /// Content already present remotely is not uploaded again. On success the
    /// bytes are durable in the remote store and the local cache holds a copy.
    pub async fn store<R>(&self, reader: &mut R) -> Result<Binary>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let staged = self.cache.stage(reader, self.algorithm).await?;
        let digest = staged.digest().clone();
        let size = staged.size();

        match self.remote.head(digest.as_str()).await? {
            Some(_) => {
                debug!(digest = %digest, "binary already stored remotely");
            }
            None => {
                self.remote.put(digest.as_str(), staged.path()).await?;
                info!(digest = %digest, size = size, "binary stored");
            }
        }

        self.cache.insert(staged)?;
        Ok(Binary::with_length(
            digest,
            size,
            self.cache.clone(),
            self.remote.clone(),
        ))
    }

    /// Store an in-memory buffer.
    pub async fn store_bytes(&self, data: impl AsRef<[u8]>) -> Result<Binary> {
        let mut reader = data.as_ref();
        self.store(&mut reader).await
    }

    /// Handle to the binary named by `digest`. No I/O happens here; missing
    /// content is only reported when the binary is read.
    pub fn get_binary(&self, digest: &str) -> Result<Binary> {
        let digest = self.algorithm.parse(digest)?;
        Ok(self.binary(digest))
    }

    /// Handle to an already parsed digest.
    pub fn binary(&self, digest: Digest) -> Binary {
        Binary::new(digest, self.cache.clone(), self.remote.clone())
    }

    pub fn garbage_collector(&self) -> &GarbageCollector {
        &self.gc
    }

    pub fn cache(&self) -> &LocalFileCache {
        &self.cache
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Drop every locally cached file. Stored content stays in the remote store.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Whether `digest` is a well-formed name for this store.
    pub fn validate(&self, digest: &str) -> bool {
        self.algorithm.validate(digest)
    }
}
