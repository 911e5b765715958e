//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use binstore::remote::{ByteStream, RemoteEntry};
use binstore::{
    BinaryManager, BinaryStoreError, CacheConfig, DigestAlgorithm, LocalFileCache,
    ObjectRemoteStore, RemoteStore, Result,
};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("binstore=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Remote store wrapper that counts calls and can inject faults.
#[derive(Debug)]
pub struct CountingRemoteStore {
    inner: Arc<dyn RemoteStore>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub heads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_deletes: AtomicBool,
    pub fail_gets: AtomicBool,
    pub fail_list: AtomicBool,
    pub get_delay: Option<Duration>,
    pub delete_delay: Option<Duration>,
}

impl CountingRemoteStore {
    pub fn new(inner: Arc<dyn RemoteStore>) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            heads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            get_delay: None,
            delete_delay: None,
        }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(ObjectRemoteStore::memory()))
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

fn injected() -> BinaryStoreError {
    BinaryStoreError::StorageFailure(object_store::Error::Generic {
        store: "test",
        source: "injected failure".into(),
    })
}

#[async_trait]
impl RemoteStore for CountingRemoteStore {
    fn id(&self) -> String {
        format!("counting:{}", self.inner.id())
    }

    async fn put(&self, key: &str, source: &Path) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, source).await
    }

    async fn get(&self, key: &str) -> Result<Option<ByteStream>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.get(key).await
    }

    async fn head(&self, key: &str) -> Result<Option<u64>> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    fn list(&self) -> BoxStream<'_, Result<RemoteEntry>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return stream::once(async { Err(injected()) }).boxed();
        }
        self.inner.list()
    }
}

/// A manager over `remote` with a fresh cache directory.
pub async fn setup_with(remote: Arc<dyn RemoteStore>, max_bytes: u64) -> (BinaryManager, TempDir) {
    init_tracing();
    let temp_dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(temp_dir.path().join("cache")).with_max_bytes(max_bytes);
    let cache = LocalFileCache::open(&config).await.unwrap();
    let manager = BinaryManager::new(remote, cache, DigestAlgorithm::Md5);
    (manager, temp_dir)
}

/// A manager over a counting in-memory store.
pub async fn setup() -> (BinaryManager, Arc<CountingRemoteStore>, TempDir) {
    let remote = Arc::new(CountingRemoteStore::memory());
    let (manager, temp_dir) = setup_with(remote.clone(), 100 * 1024 * 1024).await;
    (manager, remote, temp_dir)
}
