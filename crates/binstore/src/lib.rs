//! Content-addressed binary storage
//!
//! This crate stores opaque byte content under the hex digest of its bytes
//! in a pluggable remote store (S3/MinIO, local filesystem, memory), keeps
//! recently used content in a bounded local disk cache, and reclaims
//! unreferenced content with a mark-and-sweep garbage collector.
//!
//! # Features
//!
//! - MD5 (default) or SHA-256 digests, validated on every fetch
//! - Identical content is stored and uploaded once
//! - LRU disk cache that never evicts files with open readers
//! - Concurrent misses for one digest are coalesced into a single fetch
//! - Garbage collection with dry runs and per-run statistics
//!
//! # Example
//!
//! ```rust,no_run
//! use binstore::{BinaryManager, BinaryStoreConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), binstore::BinaryStoreError> {
//! let config = BinaryStoreConfig::local(Path::new("/tmp/binaries"));
//! let manager = BinaryManager::from_config(&config).await?;
//!
//! let kept = manager.store_bytes("kept").await?;
//! manager.store_bytes("garbage").await?;
//!
//! let gc = manager.garbage_collector();
//! gc.start()?;
//! gc.mark(kept.digest())?;
//! let status = gc.stop(true).await?;
//! assert_eq!(status.num_deleted, 1);
//! # Ok(())
//! # }
//! ```

mod binary;
mod cache;
mod config;
mod digest;
mod error;
mod gc;
mod manager;
pub mod remote;

pub use binary::{Binary, BinaryStream};
pub use cache::{CacheConfig, CacheHandle, CacheStats, LocalFileCache};
pub use config::{BinaryStoreConfig, CONFIG_FILE_NAME};
pub use digest::{Digest, DigestAlgorithm, Digester};
pub use error::{BinaryStoreError, GcStateError, Result};
pub use gc::{GarbageCollector, GcStatus};
pub use manager::BinaryManager;
pub use remote::{LocalRemoteStore, ObjectRemoteStore, RemoteStore, RemoteStoreConfig};
