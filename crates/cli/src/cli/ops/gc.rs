use std::path::PathBuf;

use binstore::{BinaryStoreError, Digest, DigestAlgorithm};
use clap::Args;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::cli::op::LoadError;

#[derive(Args, Debug, Clone)]
pub struct Gc {
    /// File listing live digests, one per line (`-` for stdin). Without it
    /// nothing is marked and every binary is a candidate.
    #[arg(long)]
    pub marks: Option<PathBuf>,

    /// Actually delete unmarked binaries (default is a dry run)
    #[arg(long)]
    pub delete: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to read marks: {0}")]
    Marks(std::io::Error),
    #[error("line {line}: {source}")]
    BadMark {
        line: usize,
        source: BinaryStoreError,
    },
    #[error("gc failed: {0}")]
    Store(#[from] BinaryStoreError),
    #[error("failed to encode status: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse one digest per line. Blank lines and `#` comments are skipped.
async fn read_marks<R>(reader: R, algorithm: DigestAlgorithm) -> Result<Vec<Digest>, GcError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut digests = Vec::new();
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await.map_err(GcError::Marks)? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let digest = algorithm.parse(line).map_err(|source| GcError::BadMark {
            line: line_no,
            source,
        })?;
        digests.push(digest);
    }
    Ok(digests)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Gc {
    type Error = GcError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let manager = ctx.manager().await?;

        let live = match &self.marks {
            None => Vec::new(),
            Some(path) if path.as_os_str() == "-" => {
                read_marks(tokio::io::stdin(), manager.algorithm()).await?
            }
            Some(path) => {
                let file = tokio::fs::File::open(path).await.map_err(GcError::Marks)?;
                read_marks(file, manager.algorithm()).await?
            }
        };

        tracing::info!(
            gc = %manager.garbage_collector().id(),
            live = live.len(),
            delete = self.delete,
            "running garbage collection"
        );
        let status = manager
            .garbage_collector()
            .collect(live, self.delete)
            .await?;
        Ok(serde_json::to_string_pretty(&status)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::op::{Op, OpContext};
    use crate::cli::ops::Init;

    #[tokio::test]
    async fn test_read_marks_skips_blanks_and_comments() {
        let input: &[u8] = b"# live set\n900150983cd24fb0d6963f7d28e17f72\n\n  d41d8cd98f00b204e9800998ecf8427e  \n";
        let digests = read_marks(input, DigestAlgorithm::Md5).await.unwrap();
        assert_eq!(digests.len(), 2);
        assert_eq!(digests[1].as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn test_read_marks_reports_bad_line() {
        let input: &[u8] = b"900150983cd24fb0d6963f7d28e17f72\nnot-a-digest\n";
        match read_marks(input, DigestAlgorithm::Md5).await {
            Err(GcError::BadMark { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gc_dry_run_then_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(temp_dir.path().join("binstore.toml"))).unwrap();
        Init {
            path: None,
            digest: DigestAlgorithm::Md5,
            max_bytes: None,
        }
        .execute(&ctx)
        .await
        .unwrap();

        let manager = ctx.manager().await.unwrap();
        let live = manager.store_bytes(b"live").await.unwrap();
        manager.store_bytes(b"dead").await.unwrap();

        let marks = temp_dir.path().join("marks.txt");
        tokio::fs::write(&marks, format!("{}\n", live.digest()))
            .await
            .unwrap();

        let dry = Gc {
            marks: Some(marks.clone()),
            delete: false,
        }
        .execute(&ctx)
        .await
        .unwrap();
        let status: serde_json::Value = serde_json::from_str(&dry).unwrap();
        assert_eq!(status["num_kept"], 1);
        assert_eq!(status["num_deleted"], 1);
        assert_eq!(status["in_progress"], false);

        Gc {
            marks: Some(marks),
            delete: true,
        }
        .execute(&ctx)
        .await
        .unwrap();

        let manager = ctx.manager().await.unwrap();
        let entries: Vec<_> = futures::TryStreamExt::try_collect(manager.remote().list())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, live.digest().as_str());
    }
}
