//! Error types for the binary store.

use crate::digest::Digest;

/// Errors that can occur when working with the binary store.
#[derive(Debug, thiserror::Error)]
pub enum BinaryStoreError {
    /// Backend fault raised by an object storage backend
    #[error("storage failure: {0}")]
    StorageFailure(#[from] object_store::Error),

    /// Local disk fault (filesystem backend or cache directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The digest is absent from both the local cache and the remote store
    #[error("missing content for digest {0}")]
    MissingContent(Digest),

    /// A caller-supplied string is not a valid digest
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// Fetched bytes do not hash to the digest they were stored under
    #[error("corrupted content: expected digest {expected}, got {actual}")]
    Corrupted { expected: Digest, actual: Digest },

    /// Garbage collector used outside of its state machine
    #[error(transparent)]
    GcState(#[from] GcStateError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before opening the store.")]
    BucketNotFound(String),
}

impl BinaryStoreError {
    /// Whether this error is a transport/backend fault rather than a logic or
    /// integrity problem. Callers use this to decide on retries.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            BinaryStoreError::StorageFailure(_) | BinaryStoreError::Io(_)
        )
    }
}

/// Misuse of the garbage collector state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GcStateError {
    #[error("a garbage collection is already in progress")]
    AlreadyInProgress,

    #[error("no garbage collection is in progress")]
    NotInProgress,

    #[error("garbage collection is sweeping; marks are closed")]
    Sweeping,
}

/// Result type alias for binary store operations.
pub type Result<T> = std::result::Result<T, BinaryStoreError>;
