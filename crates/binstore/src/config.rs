//! On-disk configuration of a binary store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::digest::DigestAlgorithm;
use crate::error::{BinaryStoreError, Result};
use crate::remote::RemoteStoreConfig;

pub const CONFIG_FILE_NAME: &str = "binstore.toml";
pub const CACHE_DIR_NAME: &str = "cache";
pub const REMOTE_DIR_NAME: &str = "remote";

/// Everything needed to build a [`crate::BinaryManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryStoreConfig {
    /// Digest algorithm used to name binaries
    #[serde(default)]
    pub digest: DigestAlgorithm,
    pub cache: CacheConfig,
    #[serde(default)]
    pub remote: RemoteStoreConfig,
}

impl BinaryStoreConfig {
    /// Configuration keeping both the cache and a native local store under `base`.
    pub fn local(base: &Path) -> Self {
        Self {
            digest: DigestAlgorithm::default(),
            cache: CacheConfig::new(base.join(CACHE_DIR_NAME)),
            remote: RemoteStoreConfig::Local {
                path: base.join(REMOTE_DIR_NAME),
                depth: crate::remote::DEFAULT_DEPTH,
            },
        }
    }

    /// Default location of the config file under `base`.
    pub fn path_in(base: &Path) -> PathBuf {
        base.join(CONFIG_FILE_NAME)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            BinaryStoreError::InvalidConfig(format!("{}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| BinaryStoreError::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}
