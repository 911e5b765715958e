//! Mark-and-sweep garbage collection of remote binaries.
//!
//! A run is driven from outside: [`GarbageCollector::start`], then one
//! [`GarbageCollector::mark`] per live digest (from any number of threads),
//! then [`GarbageCollector::stop`], which lists the remote store and counts,
//! and optionally deletes, every digest key that was not marked.
//!
//! Binaries stored after the caller finished marking are only safe if some
//! persisted record references them and was marked; anything else may be
//! collected.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::digest::{Digest, DigestAlgorithm};
use crate::error::{GcStateError, Result};
use crate::remote::RemoteStore;

/// Counters of a garbage collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcStatus {
    pub in_progress: bool,
    /// Marked binaries found in the store
    pub num_kept: u64,
    pub size_kept: u64,
    /// Unmarked binaries, deleted unless the run was a dry run
    pub num_deleted: u64,
    pub size_deleted: u64,
    /// Wall time of the run in milliseconds, set when it stops
    pub gc_duration: u64,
}

impl fmt::Display for GcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kept {} binaries ({} bytes), collected {} binaries ({} bytes) in {}ms",
            self.num_kept, self.size_kept, self.num_deleted, self.size_deleted, self.gc_duration
        )
    }
}

enum GcPhase {
    Idle,
    Marking {
        marks: HashSet<String>,
        started: Instant,
    },
    Sweeping,
}

struct GcShared {
    phase: Mutex<GcPhase>,
    status: RwLock<GcStatus>,
}

/// Returns the collector to idle when a sweep ends, including when the
/// `stop` future is dropped half way.
struct SweepGuard<'a> {
    shared: &'a GcShared,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.shared.status.write().in_progress = false;
        *self.shared.phase.lock() = GcPhase::Idle;
    }
}

/// Garbage collector bound to one remote store. Clones share the same run.
#[derive(Clone)]
pub struct GarbageCollector {
    remote: Arc<dyn RemoteStore>,
    algorithm: DigestAlgorithm,
    shared: Arc<GcShared>,
}

impl fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("id", &self.id())
            .field("in_progress", &self.is_in_progress())
            .finish()
    }
}

impl GarbageCollector {
    pub fn new(remote: Arc<dyn RemoteStore>, algorithm: DigestAlgorithm) -> Self {
        Self {
            remote,
            algorithm,
            shared: Arc::new(GcShared {
                phase: Mutex::new(GcPhase::Idle),
                status: RwLock::new(GcStatus::default()),
            }),
        }
    }

    /// Identifier of the collected storage.
    pub fn id(&self) -> String {
        self.remote.id()
    }

    /// Begin a run with an empty mark set and zeroed counters.
    pub fn start(&self) -> Result<()> {
        let mut phase = self.shared.phase.lock();
        if !matches!(*phase, GcPhase::Idle) {
            return Err(GcStateError::AlreadyInProgress.into());
        }
        *phase = GcPhase::Marking {
            marks: HashSet::new(),
            started: Instant::now(),
        };
        *self.shared.status.write() = GcStatus {
            in_progress: true,
            ..GcStatus::default()
        };
        info!(gc = %self.id(), "binary GC started");
        Ok(())
    }

    /// Record `digest` as live for the current run.
    pub fn mark(&self, digest: &Digest) -> Result<()> {
        match &mut *self.shared.phase.lock() {
            GcPhase::Marking { marks, .. } => {
                marks.insert(digest.as_str().to_string());
                Ok(())
            }
            GcPhase::Idle => Err(GcStateError::NotInProgress.into()),
            GcPhase::Sweeping => Err(GcStateError::Sweeping.into()),
        }
    }

    /// Number of distinct digests marked so far in the current run.
    pub fn marked(&self) -> usize {
        match &*self.shared.phase.lock() {
            GcPhase::Marking { marks, .. } => marks.len(),
            _ => 0,
        }
    }

    /// Sweep the remote store and end the run.
    ///
    /// Keys that are not digests of this store's algorithm are ignored. With
    /// `delete == false` nothing is removed but the counters are identical
    /// to those of a real run. A storage failure aborts the run; the status
    /// keeps the counts gathered so far.
    pub async fn stop(&self, delete: bool) -> Result<GcStatus> {
        let (marks, started) = {
            let mut phase = self.shared.phase.lock();
            match std::mem::replace(&mut *phase, GcPhase::Sweeping) {
                GcPhase::Marking { marks, started } => (marks, started),
                GcPhase::Idle => {
                    *phase = GcPhase::Idle;
                    return Err(GcStateError::NotInProgress.into());
                }
                GcPhase::Sweeping => return Err(GcStateError::Sweeping.into()),
            }
        };
        let _guard = SweepGuard {
            shared: &self.shared,
        };

        info!(gc = %self.id(), marked = marks.len(), delete = delete, "binary GC sweeping");
        let mut status = GcStatus {
            in_progress: true,
            ..GcStatus::default()
        };
        let result = self.sweep(&marks, delete, &mut status).await;

        status.in_progress = false;
        status.gc_duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        *self.shared.status.write() = status.clone();

        match result {
            Ok(()) => {
                info!(gc = %self.id(), %status, "binary GC completed");
                Ok(status)
            }
            Err(e) => {
                warn!(gc = %self.id(), error = %e, %status, "binary GC aborted");
                Err(e)
            }
        }
    }

    async fn sweep(
        &self,
        marks: &HashSet<String>,
        delete: bool,
        status: &mut GcStatus,
    ) -> Result<()> {
        let mut unmarked = Vec::new();
        {
            let mut entries = self.remote.list();
            while let Some(entry) = entries.try_next().await? {
                if !self.algorithm.validate(&entry.key) {
                    // Not a binary: metadata or foreign objects are left alone.
                    debug!(key = %entry.key, "skipping non-digest key");
                    continue;
                }
                if marks.contains(&entry.key) {
                    status.num_kept += 1;
                    status.size_kept += entry.size;
                } else {
                    status.num_deleted += 1;
                    status.size_deleted += entry.size;
                    unmarked.push(entry.key);
                }
            }
        }

        if delete {
            for key in &unmarked {
                self.remote.delete(key).await?;
                debug!(key = %key, "deleted unreferenced binary");
            }
        }
        Ok(())
    }

    /// Run a complete collection over an already known live set.
    ///
    /// If another handle ends the run while the live set is being marked,
    /// the state error is returned and the collector is left as that handle
    /// put it.
    pub async fn collect<I>(&self, live: I, delete: bool) -> Result<GcStatus>
    where
        I: IntoIterator<Item = Digest>,
    {
        self.start()?;
        for digest in live {
            self.mark(&digest)?;
        }
        self.stop(delete).await
    }

    pub fn is_in_progress(&self) -> bool {
        !matches!(*self.shared.phase.lock(), GcPhase::Idle)
    }

    /// Latest published status; counters are complete once `in_progress` is false.
    pub fn status(&self) -> GcStatus {
        self.shared.status.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BinaryStoreError;
    use crate::remote::ObjectRemoteStore;

    async fn store_with(data: &[&[u8]]) -> (Arc<dyn RemoteStore>, Vec<Digest>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let remote = ObjectRemoteStore::memory();
        let mut digests = Vec::new();
        for bytes in data {
            let digest = DigestAlgorithm::Md5.compute(bytes);
            let source = temp_dir.path().join(digest.as_str());
            tokio::fs::write(&source, bytes).await.unwrap();
            remote.put(digest.as_str(), &source).await.unwrap();
            digests.push(digest);
        }
        (Arc::new(remote), digests, temp_dir)
    }

    #[tokio::test]
    async fn test_state_machine() {
        let (remote, digests, _temp_dir) = store_with(&[b"abc"]).await;
        let gc = GarbageCollector::new(remote, DigestAlgorithm::Md5);

        assert!(!gc.is_in_progress());
        let err = gc.mark(&digests[0]).unwrap_err();
        assert!(matches!(
            err,
            BinaryStoreError::GcState(GcStateError::NotInProgress)
        ));
        assert!(gc.stop(true).await.is_err());

        gc.start().unwrap();
        assert!(gc.is_in_progress());
        assert!(gc.status().in_progress);
        assert!(matches!(
            gc.start().unwrap_err(),
            BinaryStoreError::GcState(GcStateError::AlreadyInProgress)
        ));

        gc.mark(&digests[0]).unwrap();
        gc.mark(&digests[0]).unwrap();
        assert_eq!(gc.marked(), 1);

        let status = gc.stop(true).await.unwrap();
        assert!(!gc.is_in_progress());
        assert!(!status.in_progress);
        assert_eq!(status.num_kept, 1);
        assert_eq!(status.num_deleted, 0);
        assert_eq!(gc.status(), status);
    }

    #[tokio::test]
    async fn test_mark_while_idle_does_not_leak_into_next_run() {
        let (remote, digests, _temp_dir) = store_with(&[b"abc", b"defg"]).await;
        let gc = GarbageCollector::new(remote, DigestAlgorithm::Md5);

        assert!(gc.mark(&digests[0]).is_err());
        gc.start().unwrap();
        assert_eq!(gc.marked(), 0);
        let status = gc.stop(false).await.unwrap();
        assert_eq!(status.num_kept, 0);
        assert_eq!(status.num_deleted, 2);
        assert_eq!(status.size_deleted, 7);
    }

    #[tokio::test]
    async fn test_non_digest_keys_are_ignored() {
        let (remote, digests, temp_dir) = store_with(&[b"abc"]).await;
        let source = temp_dir.path().join("meta");
        tokio::fs::write(&source, b"{\"version\":1}").await.unwrap();
        remote.put("manifest.json", &source).await.unwrap();
        // A sha256 digest is not a binary of an md5 store either
        let foreign = DigestAlgorithm::Sha256.compute(b"abc");
        remote.put(foreign.as_str(), &source).await.unwrap();

        let gc = GarbageCollector::new(remote.clone(), DigestAlgorithm::Md5);
        let status = gc.collect(Vec::new(), true).await.unwrap();
        assert_eq!(status.num_deleted, 1);
        assert_eq!(status.num_kept, 0);

        assert!(remote.head(digests[0].as_str()).await.unwrap().is_none());
        assert!(remote.head("manifest.json").await.unwrap().is_some());
        assert!(remote.head(foreign.as_str()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_collect_runs_a_full_cycle() {
        let (remote, digests, _temp_dir) = store_with(&[b"abc", b"defg", b"hi"]).await;
        let gc = GarbageCollector::new(remote.clone(), DigestAlgorithm::Md5);

        let status = gc
            .collect(vec![digests[0].clone(), digests[2].clone()], true)
            .await
            .unwrap();
        assert_eq!(status.num_kept, 2);
        assert_eq!(status.size_kept, 5);
        assert_eq!(status.num_deleted, 1);
        assert_eq!(status.size_deleted, 4);
        assert!(!gc.is_in_progress());

        // Nothing left to collect
        let status = gc.collect(digests.clone(), true).await.unwrap();
        assert_eq!(status.num_kept, 2);
        assert_eq!(status.num_deleted, 0);
    }

    #[tokio::test]
    async fn test_clones_share_the_run() {
        let (remote, digests, _temp_dir) = store_with(&[b"abc"]).await;
        let gc = GarbageCollector::new(remote, DigestAlgorithm::Md5);
        let other = gc.clone();

        gc.start().unwrap();
        assert!(other.is_in_progress());
        assert!(other.start().is_err());
        other.mark(&digests[0]).unwrap();
        let status = gc.stop(true).await.unwrap();
        assert_eq!(status.num_kept, 1);
        assert!(!other.is_in_progress());
    }
}
