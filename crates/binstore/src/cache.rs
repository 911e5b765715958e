//! On-disk LRU cache of binaries, keyed by digest.
//!
//! Files are written under `<dir>/tmp`, hashed while they are written and
//! renamed into `<dir>/data/<digest>` only once complete, so a reader never
//! sees a partial file. Concurrent misses for the same digest are coalesced
//! into a single remote fetch.
//!
//! Entries handed out through a [`CacheHandle`] are pinned: eviction skips
//! them until every handle is dropped. [`LocalFileCache::clear`] does not
//! respect pins; readers that already opened the file keep their descriptor.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::digest::{Digest, DigestAlgorithm};
use crate::error::{BinaryStoreError, Result};
use crate::remote::{ByteStream, RemoteStore};

const DATA_DIR: &str = "data";
const TMP_DIR: &str = "tmp";

/// Read buffer used when staging content from a reader.
const STAGE_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for the local file cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cached files
    pub path: PathBuf,
    /// Maximum cache size in bytes (default: 100MB)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

fn default_max_bytes() -> u64 {
    100 * 1024 * 1024 // 100MB
}

impl CacheConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: default_max_bytes(),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub pinned: usize,
    pub max_bytes: u64,
}

/// A complete file in the temp directory, with its digest and length.
pub(crate) struct StagedFile {
    path: TempPath,
    digest: Digest,
    size: u64,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

struct CacheEntry {
    path: PathBuf,
    size: u64,
    readers: usize,
    generation: u64,
}

struct CacheState {
    entries: LruCache<Digest, CacheEntry>,
    total_bytes: u64,
}

struct CacheInner {
    data_dir: PathBuf,
    tmp_dir: PathBuf,
    max_bytes: u64,
    state: Mutex<CacheState>,
    fetches: Mutex<HashMap<Digest, Arc<tokio::sync::Mutex<()>>>>,
    generation: AtomicU64,
}

/// Disk cache fronting a [`RemoteStore`].
#[derive(Clone)]
pub struct LocalFileCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for LocalFileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileCache")
            .field("dir", &self.inner.data_dir)
            .field("max_bytes", &self.inner.max_bytes)
            .finish()
    }
}

/// Scoped access to one cached file. The entry stays pinned until dropped.
pub struct CacheHandle {
    digest: Digest,
    path: PathBuf,
    size: u64,
    generation: u64,
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("digest", &self.digest)
            .field("path", &self.path)
            .field("size", &self.size)
            .finish()
    }
}

impl CacheHandle {
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Open the cached file for reading.
    ///
    /// If the file vanished (the cache was cleared under us) the stale entry
    /// is dropped from the index and the `NotFound` error returned, so the
    /// next lookup fetches again.
    pub async fn open(&self) -> std::io::Result<tokio::fs::File> {
        match tokio::fs::File::open(&self.path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.inner.invalidate(&self.digest, self.generation);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        self.inner.release(&self.digest, self.generation);
    }
}

impl CacheInner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    fn file_path(&self, digest: &Digest) -> PathBuf {
        self.data_dir.join(digest.as_str())
    }

    fn handle(self: &Arc<Self>, digest: &Digest, entry: &CacheEntry) -> CacheHandle {
        CacheHandle {
            digest: digest.clone(),
            path: entry.path.clone(),
            size: entry.size,
            generation: entry.generation,
            inner: Arc::clone(self),
        }
    }

    /// Pin an existing entry, marking it most recently used.
    fn acquire(self: &Arc<Self>, digest: &Digest) -> Option<CacheHandle> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(digest)?;
        entry.readers += 1;
        Some(self.handle(digest, entry))
    }

    /// Move a staged file into place and index it, optionally pinning it.
    ///
    /// The rename happens under the state lock so that it cannot interleave
    /// with `clear` or eviction of the same path.
    fn insert(self: &Arc<Self>, staged: StagedFile, pin: bool) -> Result<Option<CacheHandle>> {
        let StagedFile { path, digest, size } = staged;
        let readers = usize::from(pin);

        let mut state = self.state.lock();
        let handle = if let Some(entry) = state.entries.get_mut(&digest) {
            // Same digest, same bytes: keep the indexed file.
            entry.readers += readers;
            pin.then(|| self.handle(&digest, entry))
        } else {
            let dest = self.file_path(&digest);
            path.persist(&dest).map_err(|e| e.error)?;
            let entry = CacheEntry {
                path: dest,
                size,
                readers,
                generation: self.next_generation(),
            };
            let handle = pin.then(|| self.handle(&digest, &entry));
            state.entries.put(digest, entry);
            state.total_bytes += size;
            handle
        };
        self.evict(&mut state);
        Ok(handle)
    }

    fn release(&self, digest: &Digest, generation: u64) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.peek_mut(digest) {
            if entry.generation == generation {
                entry.readers = entry.readers.saturating_sub(1);
            }
        }
        self.evict(&mut state);
    }

    fn invalidate(&self, digest: &Digest, generation: u64) {
        let mut state = self.state.lock();
        let matches = state
            .entries
            .peek(digest)
            .is_some_and(|entry| entry.generation == generation);
        if matches {
            if let Some(entry) = state.entries.pop(digest) {
                state.total_bytes = state.total_bytes.saturating_sub(entry.size);
                warn!(digest = %digest, "cached file disappeared, dropping entry");
            }
        }
    }

    /// Remove least recently used, unpinned entries until the cache fits its
    /// budget or only pinned entries remain.
    fn evict(&self, state: &mut CacheState) {
        while state.total_bytes > self.max_bytes {
            let victim = state
                .entries
                .iter()
                .rev()
                .find(|(_, entry)| entry.readers == 0)
                .map(|(digest, _)| digest.clone());
            let Some(digest) = victim else {
                break;
            };
            if let Some(entry) = state.entries.pop(&digest) {
                state.total_bytes = state.total_bytes.saturating_sub(entry.size);
                remove_file_quietly(&entry.path);
                debug!(digest = %digest, size = entry.size, "evicted cached file");
            }
        }
    }

    fn fetch_lock(&self, digest: &Digest) -> Arc<tokio::sync::Mutex<()>> {
        let mut fetches = self.fetches.lock();
        Arc::clone(fetches.entry(digest.clone()).or_default())
    }

    fn release_fetch_lock(&self, digest: &Digest, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut fetches = self.fetches.lock();
        // One reference in the map, one held by the caller: nobody is waiting.
        if Arc::strong_count(lock) <= 2 {
            fetches.remove(digest);
        }
    }
}

/// A caller's claim on the per-digest fetch lock. Released on drop, so a
/// cancelled fetch leaves no entry behind.
struct FetchRegistration<'a> {
    inner: &'a CacheInner,
    digest: &'a Digest,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for FetchRegistration<'_> {
    fn drop(&mut self) {
        self.inner.release_fetch_lock(self.digest, &self.lock);
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove cached file");
        }
    }
}

impl LocalFileCache {
    /// Open the cache directory, indexing files left by a previous process
    /// and discarding unfinished temp files.
    pub async fn open(config: &CacheConfig) -> Result<Self> {
        let data_dir = config.path.join(DATA_DIR);
        let tmp_dir = config.path.join(TMP_DIR);
        tokio::fs::create_dir_all(&data_dir).await?;
        if tokio::fs::metadata(&tmp_dir).await.is_ok() {
            tokio::fs::remove_dir_all(&tmp_dir).await?;
        }
        tokio::fs::create_dir_all(&tmp_dir).await?;

        let mut found = Vec::new();
        let mut dir = tokio::fs::read_dir(&data_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(digest) = Digest::parse(&name) else {
                warn!(file = %name, "ignoring unexpected file in cache directory");
                continue;
            };
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().ok();
            found.push((modified, digest, entry.path(), meta.len()));
        }
        // Oldest first, so the most recently written file ends up most recently used.
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let inner = Arc::new(CacheInner {
            data_dir,
            tmp_dir,
            max_bytes: config.max_bytes,
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            fetches: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        });

        {
            let mut state = inner.state.lock();
            for (_, digest, path, size) in found {
                let entry = CacheEntry {
                    path,
                    size,
                    readers: 0,
                    generation: inner.next_generation(),
                };
                state.entries.put(digest, entry);
                state.total_bytes += size;
            }
            inner.evict(&mut state);
            if !state.entries.is_empty() {
                info!(
                    entries = state.entries.len(),
                    bytes = state.total_bytes,
                    "indexed existing cache files"
                );
            }
        }

        Ok(Self { inner })
    }

    /// Whether a file for `digest` is currently cached.
    pub fn contains(&self, digest: &Digest) -> bool {
        self.inner.state.lock().entries.contains(digest)
    }

    /// Pin a cached file without touching the remote store.
    pub fn get(&self, digest: &Digest) -> Option<CacheHandle> {
        self.inner.acquire(digest)
    }

    /// Return a handle to a local file holding exactly the bytes of `digest`,
    /// fetching it from `remote` on a miss.
    ///
    /// Concurrent misses for the same digest wait for a single fetch.
    pub async fn get_or_fetch(
        &self,
        digest: &Digest,
        remote: &dyn RemoteStore,
    ) -> Result<CacheHandle> {
        if let Some(handle) = self.inner.acquire(digest) {
            debug!(digest = %digest, "cache hit");
            return Ok(handle);
        }

        let registration = FetchRegistration {
            inner: &self.inner,
            digest,
            lock: self.inner.fetch_lock(digest),
        };
        let _held = registration.lock.lock().await;

        // Another caller may have completed the fetch while we waited.
        match self.inner.acquire(digest) {
            Some(handle) => Ok(handle),
            None => self.fetch(digest, remote).await,
        }
    }

    async fn fetch(&self, digest: &Digest, remote: &dyn RemoteStore) -> Result<CacheHandle> {
        debug!(digest = %digest, remote = %remote.id(), "cache miss, fetching");
        let stream = remote
            .get(digest.as_str())
            .await?
            .ok_or_else(|| BinaryStoreError::MissingContent(digest.clone()))?;

        let staged = self.stage_stream(stream, digest.algorithm()).await?;
        if staged.digest() != digest {
            warn!(
                expected = %digest,
                actual = %staged.digest(),
                "fetched content does not match its digest"
            );
            return Err(BinaryStoreError::Corrupted {
                expected: digest.clone(),
                actual: staged.digest().clone(),
            });
        }

        let size = staged.size();
        let handle = self
            .inner
            .insert(staged, true)?
            .ok_or_else(|| BinaryStoreError::MissingContent(digest.clone()))?;
        info!(digest = %digest, size = size, "fetched into cache");
        Ok(handle)
    }

    /// Copy a reader into a temp file, hashing it on the way.
    pub(crate) async fn stage<R>(
        &self,
        reader: &mut R,
        algorithm: DigestAlgorithm,
    ) -> Result<StagedFile>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let (path, mut file) = self.temp_file()?;
        let mut digester = algorithm.digester();
        let mut buf = vec![0u8; STAGE_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digester.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
        }
        file.flush().await?;
        drop(file);

        let size = digester.len();
        Ok(StagedFile {
            path,
            digest: digester.finish(),
            size,
        })
    }

    async fn stage_stream(
        &self,
        mut stream: ByteStream,
        algorithm: DigestAlgorithm,
    ) -> Result<StagedFile> {
        let (path, mut file) = self.temp_file()?;
        let mut digester = algorithm.digester();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            digester.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let size = digester.len();
        Ok(StagedFile {
            path,
            digest: digester.finish(),
            size,
        })
    }

    fn temp_file(&self) -> Result<(TempPath, tokio::fs::File)> {
        let temp = tempfile::Builder::new()
            .prefix(".stage-")
            .tempfile_in(&self.inner.tmp_dir)?;
        let file = tokio::fs::File::from_std(temp.as_file().try_clone()?);
        Ok((temp.into_temp_path(), file))
    }

    /// Index a staged file without pinning it.
    pub(crate) fn insert(&self, staged: StagedFile) -> Result<()> {
        self.inner.insert(staged, false)?;
        Ok(())
    }

    /// Remove every cached file.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let mut removed = 0usize;
        while let Some((_, entry)) = state.entries.pop_lru() {
            remove_file_quietly(&entry.path);
            removed += 1;
        }
        state.total_bytes = 0;
        info!(removed = removed, "cleared cache");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            entries: state.entries.len(),
            total_bytes: state.total_bytes,
            pinned: state.entries.iter().filter(|(_, e)| e.readers > 0).count(),
            max_bytes: self.inner.max_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ObjectRemoteStore;

    async fn setup(max_bytes: u64) -> (LocalFileCache, ObjectRemoteStore, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(temp_dir.path().join("cache")).with_max_bytes(max_bytes);
        let cache = LocalFileCache::open(&config).await.unwrap();
        (cache, ObjectRemoteStore::memory(), temp_dir)
    }

    async fn put_remote(remote: &ObjectRemoteStore, dir: &Path, data: &[u8]) -> Digest {
        let digest = DigestAlgorithm::Md5.compute(data);
        let source = dir.join(digest.as_str());
        tokio::fs::write(&source, data).await.unwrap();
        remote.put(digest.as_str(), &source).await.unwrap();
        digest
    }

    #[tokio::test]
    async fn test_fetch_then_hit() {
        let (cache, remote, temp_dir) = setup(1024).await;
        let digest = put_remote(&remote, temp_dir.path(), b"hello cache").await;

        assert!(!cache.contains(&digest));
        let handle = cache.get_or_fetch(&digest, &remote).await.unwrap();
        assert_eq!(handle.size(), 11);
        assert_eq!(tokio::fs::read(handle.path()).await.unwrap(), b"hello cache");
        drop(handle);

        // Served from disk even once the remote copy is gone
        remote.delete(digest.as_str()).await.unwrap();
        let handle = cache.get_or_fetch(&digest, &remote).await.unwrap();
        assert_eq!(handle.size(), 11);
    }

    #[tokio::test]
    async fn test_missing_content() {
        let (cache, remote, _temp_dir) = setup(1024).await;
        let digest = DigestAlgorithm::Md5.compute(b"never stored");

        let err = cache.get_or_fetch(&digest, &remote).await.unwrap_err();
        assert!(matches!(err, BinaryStoreError::MissingContent(d) if d == digest));
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_corrupted_remote_content_is_rejected() {
        let (cache, remote, temp_dir) = setup(1024).await;
        let digest = DigestAlgorithm::Md5.compute(b"expected");
        let source = temp_dir.path().join("wrong");
        tokio::fs::write(&source, b"something else").await.unwrap();
        remote.put(digest.as_str(), &source).await.unwrap();

        let err = cache.get_or_fetch(&digest, &remote).await.unwrap_err();
        assert!(matches!(err, BinaryStoreError::Corrupted { .. }));
        assert!(!cache.contains(&digest));

        // Nothing left behind in the temp directory
        let mut tmp = tokio::fs::read_dir(temp_dir.path().join("cache").join("tmp"))
            .await
            .unwrap();
        assert!(tmp.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lru_eviction_skips_pinned_entries() {
        let (cache, remote, temp_dir) = setup(10).await;
        let a = put_remote(&remote, temp_dir.path(), b"aaaa").await;
        let b = put_remote(&remote, temp_dir.path(), b"bbbb").await;
        let c = put_remote(&remote, temp_dir.path(), b"cccc").await;

        let pinned_a = cache.get_or_fetch(&a, &remote).await.unwrap();
        drop(cache.get_or_fetch(&b, &remote).await.unwrap());
        // 12 bytes > 10: b is the least recently used unpinned entry
        let handle_c = cache.get_or_fetch(&c, &remote).await.unwrap();

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert!(pinned_a.path().exists());

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_bytes, 8);
        assert_eq!(stats.pinned, 2);
        drop(handle_c);
        drop(pinned_a);
        assert_eq!(cache.stats().pinned, 0);
    }

    #[tokio::test]
    async fn test_pinned_entries_may_exceed_budget_until_released() {
        let (cache, remote, temp_dir) = setup(4).await;
        let a = put_remote(&remote, temp_dir.path(), b"aaaa").await;
        let b = put_remote(&remote, temp_dir.path(), b"bbbb").await;

        let handle_a = cache.get_or_fetch(&a, &remote).await.unwrap();
        let handle_b = cache.get_or_fetch(&b, &remote).await.unwrap();
        assert_eq!(cache.stats().total_bytes, 8);

        drop(handle_a);
        // Releasing a brings the cache back within budget
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
        drop(handle_b);
        assert_eq!(cache.stats().total_bytes, 4);
    }

    #[tokio::test]
    async fn test_clear_keeps_open_readers_working() {
        let (cache, remote, temp_dir) = setup(1024).await;
        let digest = put_remote(&remote, temp_dir.path(), b"still readable").await;

        let handle = cache.get_or_fetch(&digest, &remote).await.unwrap();
        let mut file = handle.open().await.unwrap();
        cache.clear();
        assert!(!cache.contains(&digest));
        assert_eq!(cache.stats().total_bytes, 0);

        let mut content = Vec::new();
        file.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"still readable");

        // A stale handle reports the file as gone
        let err = handle.open().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        drop(handle);

        // The next lookup fetches again
        let handle = cache.get_or_fetch(&digest, &remote).await.unwrap();
        assert!(handle.path().exists());
    }

    #[tokio::test]
    async fn test_reopen_indexes_existing_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(temp_dir.path().join("cache"));
        let remote = ObjectRemoteStore::memory();
        let digest = put_remote(&remote, temp_dir.path(), b"persisted").await;

        {
            let cache = LocalFileCache::open(&config).await.unwrap();
            drop(cache.get_or_fetch(&digest, &remote).await.unwrap());
        }
        tokio::fs::write(config.path.join("tmp").join(".stage-junk"), b"partial")
            .await
            .unwrap();
        tokio::fs::write(config.path.join("data").join("README"), b"not a digest")
            .await
            .unwrap();

        let cache = LocalFileCache::open(&config).await.unwrap();
        assert!(cache.contains(&digest));
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.stats().total_bytes, 9);
        assert!(!config.path.join("tmp").join(".stage-junk").exists());
    }

    #[tokio::test]
    async fn test_stage_hashes_while_writing() {
        let (cache, _remote, _temp_dir) = setup(1024).await;
        let mut reader: &[u8] = b"staged bytes";
        let staged = cache
            .stage(&mut reader, DigestAlgorithm::Sha256)
            .await
            .unwrap();
        assert_eq!(staged.size(), 12);
        assert_eq!(
            staged.digest(),
            &DigestAlgorithm::Sha256.compute(b"staged bytes")
        );
        assert_eq!(tokio::fs::read(staged.path()).await.unwrap(), b"staged bytes");

        let digest = staged.digest().clone();
        cache.insert(staged).unwrap();
        assert!(cache.contains(&digest));
        assert_eq!(cache.stats().pinned, 0);
    }

    /// A remote whose reads never produce a byte.
    #[derive(Debug)]
    struct StalledRemote;

    #[async_trait::async_trait]
    impl RemoteStore for StalledRemote {
        fn id(&self) -> String {
            "stalled".to_string()
        }

        async fn put(&self, _key: &str, _source: &Path) -> Result<()> {
            Ok(())
        }

        async fn get(&self, _key: &str) -> Result<Option<ByteStream>> {
            Ok(Some(futures::stream::pending().boxed()))
        }

        async fn head(&self, _key: &str) -> Result<Option<u64>> {
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        fn list(&self) -> futures::stream::BoxStream<'_, Result<crate::remote::RemoteEntry>> {
            futures::stream::empty().boxed()
        }
    }

    #[tokio::test]
    async fn test_cancelled_fetch_releases_its_lock() {
        let (cache, remote, temp_dir) = setup(1024).await;
        let digest = put_remote(&remote, temp_dir.path(), b"eventually").await;

        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            cache.get_or_fetch(&digest, &StalledRemote),
        )
        .await;
        assert!(stalled.is_err());
        assert!(cache.inner.fetches.lock().is_empty());
        assert!(!cache.contains(&digest));

        let handle = cache.get_or_fetch(&digest, &remote).await.unwrap();
        assert_eq!(handle.size(), 10);
        assert!(cache.inner.fetches.lock().is_empty());
    }
}
