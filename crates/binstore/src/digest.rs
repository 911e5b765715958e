//! Content digests: the identity and storage key of every binary.
//!
//! A digest is the lowercase hex encoding of a hash over the exact bytes of a
//! binary. The same string is what [`DigestAlgorithm::compute`] emits, what
//! [`DigestAlgorithm::validate`] accepts and what backends use as object key.

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::BinaryStoreError;

/// Read buffer used when hashing streams.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hash function used to derive digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// MD5, the S3 ETag algorithm for single-part uploads
    #[default]
    Md5,
    /// SHA-256
    Sha256,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 2] = [DigestAlgorithm::Md5, DigestAlgorithm::Sha256];

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    /// Length of the hex encoding.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha256 => 64,
        }
    }

    /// Structural check: fixed length, lowercase hex only.
    pub fn validate(&self, s: &str) -> bool {
        s.len() == self.hex_len() && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Parse a string as a digest of this algorithm.
    pub fn parse(&self, s: &str) -> Result<Digest, BinaryStoreError> {
        if self.validate(s) {
            Ok(Digest {
                hex: s.to_string(),
                algorithm: *self,
            })
        } else {
            Err(BinaryStoreError::InvalidDigest(s.to_string()))
        }
    }

    /// Start an incremental hash.
    pub fn digester(&self) -> Digester {
        let state = match self {
            DigestAlgorithm::Md5 => HashState::Md5(Md5::new()),
            DigestAlgorithm::Sha256 => HashState::Sha256(Sha256::new()),
        };
        Digester { state, len: 0 }
    }

    /// Digest of an in-memory byte slice.
    pub fn compute(&self, data: &[u8]) -> Digest {
        let mut digester = self.digester();
        digester.update(data);
        digester.finish()
    }

    /// Digest of everything a reader yields, along with the number of bytes read.
    ///
    /// Fails only if reading the source fails.
    pub async fn compute_reader<R>(&self, reader: &mut R) -> std::io::Result<(Digest, u64)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut digester = self.digester();
        let mut buf = vec![0u8; HASH_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digester.update(&buf[..n]);
        }
        let len = digester.len();
        Ok((digester.finish(), len))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = BinaryStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            other => Err(BinaryStoreError::InvalidConfig(format!(
                "unknown digest algorithm: {}",
                other
            ))),
        }
    }
}

enum HashState {
    Md5(Md5),
    Sha256(Sha256),
}

/// Incremental hasher producing a [`Digest`].
pub struct Digester {
    state: HashState,
    len: u64,
}

impl Digester {
    pub fn update(&mut self, data: &[u8]) {
        self.len += data.len() as u64;
        match &mut self.state {
            HashState::Md5(h) => h.update(data),
            HashState::Sha256(h) => h.update(data),
        }
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finish(self) -> Digest {
        let (hex, algorithm) = match self.state {
            HashState::Md5(h) => (hex::encode(h.finalize()), DigestAlgorithm::Md5),
            HashState::Sha256(h) => (hex::encode(h.finalize()), DigestAlgorithm::Sha256),
        };
        Digest { hex, algorithm }
    }
}

/// Content-hash identity of a binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    hex: String,
    algorithm: DigestAlgorithm,
}

impl Digest {
    /// Parse a digest of any supported algorithm, inferring the algorithm from
    /// the encoded length.
    pub fn parse(s: &str) -> Result<Self, BinaryStoreError> {
        DigestAlgorithm::ALL
            .iter()
            .find(|algorithm| algorithm.validate(s))
            .map(|algorithm| Digest {
                hex: s.to_string(),
                algorithm: *algorithm,
            })
            .ok_or_else(|| BinaryStoreError::InvalidDigest(s.to_string()))
    }

    /// Whether `s` is a digest of any supported algorithm.
    pub fn validate(s: &str) -> bool {
        DigestAlgorithm::ALL.iter().any(|algorithm| algorithm.validate(s))
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl FromStr for Digest {
    type Err = BinaryStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}
