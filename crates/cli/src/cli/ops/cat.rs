use std::path::PathBuf;

use binstore::BinaryStoreError;
use clap::Args;

use crate::cli::op::LoadError;

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Digest of the binary to read
    pub digest: String,

    /// Write the content to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Store(#[from] BinaryStoreError),
    #[error("write failed: {0}")]
    Write(std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cat {
    type Error = CatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let manager = ctx.manager().await?;
        let binary = manager.get_binary(&self.digest)?;
        let mut stream = binary.open_stream().await?;

        match &self.output {
            Some(path) => {
                let mut file = tokio::fs::File::create(path)
                    .await
                    .map_err(CatError::Write)?;
                let written = tokio::io::copy(&mut stream, &mut file)
                    .await
                    .map_err(CatError::Write)?;
                Ok(format!("Wrote {} bytes to {}", written, path.display()))
            }
            None => {
                let mut stdout = tokio::io::stdout();
                tokio::io::copy(&mut stream, &mut stdout)
                    .await
                    .map_err(CatError::Write)?;
                tokio::io::AsyncWriteExt::flush(&mut stdout)
                    .await
                    .map_err(CatError::Write)?;
                // Content already went to stdout
                Ok(String::new())
            }
        }
    }
}
