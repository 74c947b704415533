//! Face matcher: bounded per-identity fan-out over all enrolled galleries.
//!
//! One task per identity scans that identity's gallery sequentially and stops
//! at its first positive verdict. Tasks run on a pool bounded by available
//! cores, so wall-clock latency tracks the largest single gallery rather than
//! the sum of all galleries. Results are aggregated in task-submission order
//! (identity enumeration order), never completion order, so the winning
//! identity is deterministic for a fixed gallery snapshot even when several
//! galleries would match the probe.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::gallery::{GalleryError, GalleryStore};
use crate::oracle::SimilarityOracle;
use crate::source::ResolvedImage;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error("matcher task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("no comparison could be performed: all {0} verifier calls failed")]
    OracleUnavailable(usize),
}

/// Transient result of one match call. Never persisted.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    pub identity_id: Option<Uuid>,
    pub source_image: Option<PathBuf>,
}

impl MatchResult {
    fn no_match() -> Self {
        Self {
            matched: false,
            identity_id: None,
            source_image: None,
        }
    }
}

/// A [`MatchResult`] plus comparison counters, so callers can tell a clean
/// "no match" from a scan degraded by verifier failures.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub result: MatchResult,
    pub comparisons_run: usize,
    pub comparisons_failed: usize,
}

pub struct FaceMatcher {
    gallery: GalleryStore,
    oracle: Arc<dyn SimilarityOracle>,
    workers: usize,
}

struct WorkerReport {
    identity_id: Uuid,
    hit: Option<PathBuf>,
    comparisons_run: usize,
    comparisons_failed: usize,
}

/// Spawned gallery scans, awaited strictly in spawn order. Dropping the set
/// aborts every task still running, so neither a fixed winner nor an
/// abandoned `match_probe` call leaves scans in flight.
struct ScanTasks {
    handles: Vec<JoinHandle<WorkerReport>>,
    next: usize,
}

impl ScanTasks {
    fn with_capacity(n: usize) -> Self {
        Self {
            handles: Vec::with_capacity(n),
            next: 0,
        }
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = WorkerReport> + Send + 'static,
    {
        self.handles.push(tokio::spawn(task));
    }

    async fn join_next(&mut self) -> Option<Result<WorkerReport, JoinError>> {
        let handle = self.handles.get_mut(self.next)?;
        self.next += 1;
        Some(handle.await)
    }
}

impl Drop for ScanTasks {
    fn drop(&mut self) {
        // Abort on an already-finished handle is a no-op.
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl FaceMatcher {
    /// Pool size defaults to available cores, not identity count, so fan-out
    /// stays bounded as the identity set grows.
    pub fn new(gallery: GalleryStore, oracle: Arc<dyn SimilarityOracle>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::with_workers(gallery, oracle, workers)
    }

    pub fn with_workers(
        gallery: GalleryStore,
        oracle: Arc<dyn SimilarityOracle>,
        workers: usize,
    ) -> Self {
        Self {
            gallery,
            oracle,
            workers: workers.max(1),
        }
    }

    /// Search every enrolled gallery for the probe.
    ///
    /// Returns the first positive result in identity-enumeration order, or a
    /// `matched: false` report if no gallery matches. Pure read: no
    /// persistence, no gallery mutation.
    ///
    /// Errors only on storage faults, task panics, or when every single
    /// comparison across every identity failed — partial verifier failures
    /// are logged, counted, and treated as non-matches for their pair.
    pub async fn match_probe(&self, probe: &ResolvedImage) -> Result<MatchReport, MatchError> {
        let candidates = self.gallery.enumerate()?;
        tracing::debug!(identities = candidates.len(), "match fan-out starting");

        let pool = Arc::new(Semaphore::new(self.workers));
        let mut tasks = ScanTasks::with_capacity(candidates.len());
        for (identity_id, images) in candidates {
            let pool = pool.clone();
            let oracle = self.oracle.clone();
            let probe_path = probe.path().to_path_buf();
            tasks.spawn(async move {
                // Never closed while handles are alive.
                let _permit = pool.acquire_owned().await.expect("matcher pool closed");
                scan_gallery(oracle, probe_path, identity_id, images).await
            });
        }

        let mut winner: Option<(Uuid, PathBuf)> = None;
        let mut comparisons_run = 0;
        let mut comparisons_failed = 0;

        while let Some(report) = tasks.join_next().await {
            let report = report?;
            comparisons_run += report.comparisons_run;
            comparisons_failed += report.comparisons_failed;
            if let Some(source) = report.hit {
                winner = Some((report.identity_id, source));
                break;
            }
        }
        // Identities later in enumeration order cannot displace the winner;
        // dropping the set cancels their in-flight scans.
        drop(tasks);

        match winner {
            Some((identity_id, source_image)) => {
                tracing::info!(identity = %identity_id, source = %source_image.display(), "probe matched");
                Ok(MatchReport {
                    result: MatchResult {
                        matched: true,
                        identity_id: Some(identity_id),
                        source_image: Some(source_image),
                    },
                    comparisons_run,
                    comparisons_failed,
                })
            }
            None if comparisons_run > 0 && comparisons_failed == comparisons_run => {
                Err(MatchError::OracleUnavailable(comparisons_failed))
            }
            None => {
                tracing::debug!(
                    comparisons_run,
                    comparisons_failed,
                    "probe not recognized"
                );
                Ok(MatchReport {
                    result: MatchResult::no_match(),
                    comparisons_run,
                    comparisons_failed,
                })
            }
        }
    }
}

/// Scan one identity's gallery in listing order; stop at the first positive
/// verdict. Failed comparisons are counted and skipped.
async fn scan_gallery(
    oracle: Arc<dyn SimilarityOracle>,
    probe: PathBuf,
    identity_id: Uuid,
    images: Vec<PathBuf>,
) -> WorkerReport {
    let mut comparisons_run = 0;
    let mut comparisons_failed = 0;

    for image in images {
        comparisons_run += 1;
        match oracle.verify(&probe, &image).await {
            Ok(verdict) if verdict.verified => {
                return WorkerReport {
                    identity_id,
                    hit: Some(image),
                    comparisons_run,
                    comparisons_failed,
                };
            }
            Ok(_) => {}
            Err(err) => {
                comparisons_failed += 1;
                tracing::warn!(
                    identity = %identity_id,
                    reference = %image.display(),
                    error = %err,
                    "comparison unavailable during match, skipping pair"
                );
            }
        }
    }

    WorkerReport {
        identity_id,
        hit: None,
        comparisons_run,
        comparisons_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ImageSource;
    use crate::testutil::{AlwaysFailingOracle, ByteEqOracle, FailOnOracle, write_png};

    fn resolved(path: PathBuf) -> ResolvedImage {
        ImageSource::Path(path).resolve().expect("test image")
    }

    #[tokio::test]
    async fn probe_with_no_galleries_does_not_match() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let matcher = FaceMatcher::with_workers(gallery, Arc::new(ByteEqOracle), 2);

        let probe = write_png(dir.path(), "probe.png", 1);
        let report = matcher.match_probe(&resolved(probe)).await.unwrap();
        assert!(!report.result.matched);
        assert!(report.result.identity_id.is_none());
        assert_eq!(report.comparisons_run, 0);
    }

    #[tokio::test]
    async fn enrolled_face_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let id = Uuid::new_v4();
        let face = write_png(dir.path(), "face.png", 120);
        let stored = gallery.save(id, &face).unwrap();

        // A decoy identity that never matches.
        let decoy = write_png(dir.path(), "decoy.png", 5);
        gallery.save(Uuid::new_v4(), &decoy).unwrap();

        let matcher = FaceMatcher::with_workers(gallery, Arc::new(ByteEqOracle), 2);
        let report = matcher.match_probe(&resolved(face)).await.unwrap();
        assert!(report.result.matched);
        assert_eq!(report.result.identity_id, Some(id));
        assert_eq!(report.result.source_image, Some(stored));
    }

    #[tokio::test]
    async fn unknown_probe_reports_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let face = write_png(dir.path(), "face.png", 120);
        gallery.save(Uuid::new_v4(), &face).unwrap();

        let matcher = FaceMatcher::with_workers(gallery, Arc::new(ByteEqOracle), 2);
        let probe = write_png(dir.path(), "stranger.png", 33);
        let report = matcher.match_probe(&resolved(probe)).await.unwrap();
        assert!(!report.result.matched);
        assert_eq!(report.comparisons_run, 1);
        assert_eq!(report.comparisons_failed, 0);
    }

    #[tokio::test]
    async fn winner_is_first_in_enumeration_order() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let face = write_png(dir.path(), "face.png", 77);

        // Two identities enrolled with the same face; the winner must be the
        // one whose directory sorts first, on every run.
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        gallery.save(a, &face).unwrap();
        gallery.save(b, &face).unwrap();
        let expected = if gallery.identity_dir(a) < gallery.identity_dir(b) { a } else { b };

        let matcher = FaceMatcher::with_workers(gallery, Arc::new(ByteEqOracle), 2);
        for _ in 0..5 {
            let report = matcher.match_probe(&resolved(face.clone())).await.unwrap();
            assert_eq!(report.result.identity_id, Some(expected));
        }
    }

    #[tokio::test]
    async fn failed_comparison_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let id = Uuid::new_v4();

        // First image in listing order poisons the verifier, second matches.
        let decoy = write_png(dir.path(), "decoy.png", 3);
        let face = write_png(dir.path(), "face.png", 77);
        let poisoned = gallery.save(id, &decoy).unwrap();
        gallery.save(id, &face).unwrap();

        let oracle = FailOnOracle::new(vec![poisoned]);
        let matcher = FaceMatcher::with_workers(gallery, Arc::new(oracle), 2);
        let report = matcher.match_probe(&resolved(face)).await.unwrap();
        assert!(report.result.matched);
        assert_eq!(report.result.identity_id, Some(id));
        assert_eq!(report.comparisons_failed, 1);
    }

    #[tokio::test]
    async fn total_verifier_outage_is_escalated() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let face = write_png(dir.path(), "face.png", 77);
        gallery.save(Uuid::new_v4(), &face).unwrap();
        gallery.save(Uuid::new_v4(), &face).unwrap();

        let matcher = FaceMatcher::with_workers(gallery, Arc::new(AlwaysFailingOracle), 2);
        let err = matcher.match_probe(&resolved(face)).await.unwrap_err();
        assert!(matches!(err, MatchError::OracleUnavailable(2)));
    }

    #[tokio::test]
    async fn abandoned_match_cancels_running_scans() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        use crate::oracle::{OracleError, Verdict};

        struct StallingOracle {
            started: Arc<AtomicUsize>,
            finished: Arc<AtomicUsize>,
        }

        #[async_trait::async_trait]
        impl SimilarityOracle for StallingOracle {
            async fn verify(
                &self,
                _probe: &std::path::Path,
                _reference: &std::path::Path,
            ) -> Result<Verdict, OracleError> {
                self.started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                self.finished.fetch_add(1, Ordering::SeqCst);
                Ok(Verdict {
                    verified: false,
                    distance: 1.0,
                })
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let face = write_png(dir.path(), "face.png", 50);
        gallery.save(Uuid::new_v4(), &face).unwrap();
        gallery.save(Uuid::new_v4(), &face).unwrap();

        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let oracle = StallingOracle {
            started: started.clone(),
            finished: finished.clone(),
        };
        let matcher = FaceMatcher::with_workers(gallery, Arc::new(oracle), 2);

        let probe = resolved(face);
        let wait =
            tokio::time::timeout(Duration::from_millis(100), matcher.match_probe(&probe)).await;
        assert!(wait.is_err(), "stalling verifier should outlive the wait");

        // The dropped call's scans are aborted at their sleep point; none of
        // them may run to completion afterwards.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(started.load(Ordering::SeqCst) > 0);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pool_smaller_than_identity_count_still_scans_everyone() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let face = write_png(dir.path(), "face.png", 140);

        let mut ids: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        ids.sort_by_key(|id| gallery.identity_dir(*id));
        for (i, id) in ids.iter().enumerate() {
            let decoy = write_png(dir.path(), &format!("decoy{i}.png"), i as u8);
            gallery.save(*id, &decoy).unwrap();
        }
        // Only the last identity in enumeration order holds the probe's face.
        let target = *ids.last().unwrap();
        gallery.save(target, &face).unwrap();

        let matcher = FaceMatcher::with_workers(gallery, Arc::new(ByteEqOracle), 1);
        let report = matcher.match_probe(&resolved(face)).await.unwrap();
        assert!(report.result.matched);
        assert_eq!(report.result.identity_id, Some(target));
    }
}
