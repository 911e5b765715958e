use std::path::PathBuf;

use binstore::{BinaryStoreConfig, BinaryStoreError, DigestAlgorithm};
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Directory for the cache and the local remote store (defaults to the config directory)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Digest algorithm naming stored binaries
    #[arg(long, default_value = "md5")]
    pub digest: DigestAlgorithm,

    /// Local cache budget in bytes
    #[arg(long)]
    pub max_bytes: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("already initialized: {0} exists")]
    AlreadyInitialized(PathBuf),
    #[error("init failed: {0}")]
    Store(#[from] BinaryStoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        if ctx.config_path.exists() {
            return Err(InitError::AlreadyInitialized(ctx.config_path.clone()));
        }

        let base = self
            .path
            .clone()
            .unwrap_or_else(|| ctx.base_dir().to_path_buf());
        let mut config = BinaryStoreConfig::local(&base);
        config.digest = self.digest;
        if let Some(max_bytes) = self.max_bytes {
            config.cache.max_bytes = max_bytes;
        }
        config.save(&ctx.config_path)?;

        Ok(format!(
            "Initialized binary store\n\
             - Config: {}\n\
             - Cache: {} ({} bytes)\n\
             - Digest: {}",
            ctx.config_path.display(),
            config.cache.path.display(),
            config.cache.max_bytes,
            config.digest,
        ))
    }
}
