use binstore::BinaryStoreError;
use clap::Args;
use futures::TryStreamExt;

use crate::cli::op::LoadError;

#[derive(Args, Debug, Clone)]
pub struct Ls;

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("listing failed: {0}")]
    Store(#[from] BinaryStoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let manager = ctx.manager().await?;
        let mut entries: Vec<_> = manager.remote().list().try_collect().await?;
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        if entries.is_empty() {
            return Ok("No binaries found".to_string());
        }

        let lines: Vec<String> = entries
            .iter()
            .map(|entry| {
                if manager.validate(&entry.key) {
                    format!("{}\t{}", entry.key, entry.size)
                } else {
                    format!("{}\t{}\t(not a binary)", entry.key, entry.size)
                }
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
