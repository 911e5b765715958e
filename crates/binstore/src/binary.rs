//! Lazy handles to stored content.

use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::OnceCell;

use crate::cache::{CacheHandle, LocalFileCache};
use crate::digest::Digest;
use crate::error::{BinaryStoreError, Result};
use crate::remote::RemoteStore;

/// Attempts at opening a cached file before giving up; a second attempt is
/// needed when the cache is cleared between lookup and open.
const OPEN_ATTEMPTS: usize = 2;

/// A handle to the content stored under one digest.
///
/// Creating a `Binary` does no I/O. The content is resolved through the
/// local cache, then the remote store, the first time it is needed.
#[derive(Debug)]
pub struct Binary {
    digest: Digest,
    length: OnceCell<u64>,
    cache: LocalFileCache,
    remote: Arc<dyn RemoteStore>,
}

impl Binary {
    pub(crate) fn new(digest: Digest, cache: LocalFileCache, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            digest,
            length: OnceCell::new(),
            cache,
            remote,
        }
    }

    pub(crate) fn with_length(
        digest: Digest,
        length: u64,
        cache: LocalFileCache,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            digest,
            length: OnceCell::new_with(Some(length)),
            cache,
            remote,
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Content length, resolved once by materializing the content locally.
    pub async fn length(&self) -> Result<u64> {
        let length = self
            .length
            .get_or_try_init(|| async {
                let handle = self.acquire().await?;
                Ok::<_, BinaryStoreError>(handle.size())
            })
            .await?;
        Ok(*length)
    }

    /// Open an independent read cursor over the content.
    ///
    /// Fails with [`BinaryStoreError::MissingContent`] when the digest is in
    /// neither the cache nor the remote store.
    pub async fn open_stream(&self) -> Result<BinaryStream> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let handle = self.acquire().await?;
            match handle.open().await {
                Ok(file) => {
                    let _ = self.length.set(handle.size());
                    return Ok(BinaryStream {
                        file,
                        _handle: handle,
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound && attempt < OPEN_ATTEMPTS => {
                    tracing::debug!(digest = %self.digest, "cached file vanished, refetching");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read the whole content into memory.
    pub async fn read_to_bytes(&self) -> Result<Bytes> {
        let mut stream = self.open_stream().await?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn acquire(&self) -> Result<CacheHandle> {
        self.cache
            .get_or_fetch(&self.digest, self.remote.as_ref())
            .await
    }
}

/// Read cursor over a binary's cached file.
///
/// Keeps the cache entry pinned and the file open until dropped.
#[derive(Debug)]
pub struct BinaryStream {
    file: tokio::fs::File,
    _handle: CacheHandle,
}

impl AsyncRead for BinaryStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}
