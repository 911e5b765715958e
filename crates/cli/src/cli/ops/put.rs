use std::path::PathBuf;

use binstore::BinaryStoreError;
use clap::Args;

use crate::cli::op::LoadError;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// File to store
    pub file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store failed: {0}")]
    Store(#[from] BinaryStoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Put {
    type Error = PutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let manager = ctx.manager().await?;
        let mut file = tokio::fs::File::open(&self.file)
            .await
            .map_err(|source| PutError::Read {
                path: self.file.clone(),
                source,
            })?;

        let binary = manager.store(&mut file).await?;
        Ok(binary.digest().to_string())
    }
}
