//! Native local filesystem backend.
//!
//! Objects live under `<root>/data`, sharded by the leading characters of
//! their key: with depth 2, key `abcdef…` is stored at `data/ab/cd/abcdef…`.
//! Writes go through `<root>/tmp` and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use super::{file_stream, ByteStream, RemoteEntry, RemoteStore};
use crate::error::{BinaryStoreError, Result};

pub(crate) const DEFAULT_DEPTH: usize = 2;

const DATA_DIR: &str = "data";
const TMP_DIR: &str = "tmp";

/// Remote store kept in a directory tree on a local or mounted filesystem.
#[derive(Debug, Clone)]
pub struct LocalRemoteStore {
    root: PathBuf,
    depth: usize,
}

impl LocalRemoteStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn new(root: &Path, depth: usize) -> Result<Self> {
        tokio::fs::create_dir_all(root.join(DATA_DIR)).await?;
        tokio::fs::create_dir_all(root.join(TMP_DIR)).await?;
        Ok(Self {
            root: root.to_path_buf(),
            depth,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    ///
    /// Keys too short to shard, or containing path separators, are stored
    /// flat so that they can never escape the data directory.
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(BinaryStoreError::InvalidDigest(key.to_string()));
        }
        let mut path = self.root.join(DATA_DIR);
        if key.is_ascii() && key.len() >= self.depth * 2 {
            for level in 0..self.depth {
                path.push(&key[level * 2..level * 2 + 2]);
            }
        }
        path.push(key);
        Ok(path)
    }
}

/// Depth-first walk state for [`LocalRemoteStore::list`].
struct Walk {
    pending: Vec<PathBuf>,
    current: Option<tokio::fs::ReadDir>,
}

async fn next_entry(
    store: &LocalRemoteStore,
    walk: &mut Walk,
) -> std::io::Result<Option<RemoteEntry>> {
    loop {
        if let Some(dir) = walk.current.as_mut() {
            match dir.next_entry().await? {
                Some(entry) => {
                    let file_type = entry.file_type().await?;
                    if file_type.is_dir() {
                        walk.pending.push(entry.path());
                        continue;
                    }
                    let size = match entry.metadata().await {
                        Ok(meta) => meta.len(),
                        // Deleted between readdir and stat
                        Err(e) if e.kind() == ErrorKind::NotFound => continue,
                        Err(e) => return Err(e),
                    };
                    let key = entry.file_name().to_string_lossy().into_owned();
                    // Only files at their own shard path are reachable through get/delete.
                    let path = entry.path();
                    if store.object_path(&key).ok().as_deref() != Some(path.as_path()) {
                        warn!(path = %path.display(), "skipping file outside its shard");
                        continue;
                    }
                    return Ok(Some(RemoteEntry { key, size }));
                }
                None => walk.current = None,
            }
        }

        match walk.pending.pop() {
            Some(path) => match tokio::fs::read_dir(&path).await {
                Ok(dir) => walk.current = Some(dir),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            },
            None => return Ok(None),
        }
    }
}

#[async_trait]
impl RemoteStore for LocalRemoteStore {
    fn id(&self) -> String {
        format!("file:{}", self.root.display())
    }

    async fn put(&self, key: &str, source: &Path) -> Result<()> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_dir = self.root.join(TMP_DIR);
        let temp = tempfile::Builder::new()
            .prefix(".put-")
            .tempfile_in(&tmp_dir)?;
        let temp_path = temp.into_temp_path();
        tokio::fs::copy(source, &temp_path).await?;
        temp_path.persist(&dest).map_err(|e| e.error)?;

        debug!(key = %key, path = %dest.display(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<ByteStream>> {
        let path = self.object_path(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Some(file_stream(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn head(&self, key: &str) -> Result<Option<u64>> {
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> BoxStream<'_, Result<RemoteEntry>> {
        let walk = Walk {
            pending: vec![self.root.join(DATA_DIR)],
            current: None,
        };
        stream::try_unfold(walk, move |mut walk| async move {
            let entry = next_entry(self, &mut walk).await?;
            Ok::<_, BinaryStoreError>(entry.map(|entry| (entry, walk)))
        })
        .boxed()
    }
}
