//! Enrollment guard: no identity may hold two reference images of one face.
//!
//! Before a new reference image joins an identity's gallery it is compared
//! sequentially against every image already there, in listing order. Any
//! positive verdict rejects the enrollment without touching storage. A failed
//! comparison is logged and counted as a non-match for that pair, so one
//! flaky verifier call cannot block enrollment indefinitely.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::gallery::{GalleryError, GalleryStore};
use crate::oracle::SimilarityOracle;
use crate::source::ResolvedImage;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error(transparent)]
    Gallery(#[from] GalleryError),
}

/// Outcome of an enrollment attempt. Rejection is a business outcome, not a
/// fault; storage and input failures surface as [`EnrollError`] instead.
#[derive(Debug)]
pub enum EnrollOutcome {
    /// The image was persisted in the identity's gallery.
    Accepted { path: PathBuf },
    /// An existing reference image already shows this face.
    DuplicateFace { matched: PathBuf, distance: f32 },
}

pub struct EnrollmentGuard {
    gallery: GalleryStore,
    oracle: Arc<dyn SimilarityOracle>,
}

impl EnrollmentGuard {
    pub fn new(gallery: GalleryStore, oracle: Arc<dyn SimilarityOracle>) -> Self {
        Self { gallery, oracle }
    }

    /// Admit `image` into the identity's gallery unless the face is already
    /// enrolled there. Writes exactly one file on acceptance, none on
    /// rejection.
    pub async fn enroll(
        &self,
        identity_id: Uuid,
        image: &ResolvedImage,
    ) -> Result<EnrollOutcome, EnrollError> {
        self.gallery.ensure_identity_dir(identity_id)?;

        for existing in self.gallery.list(identity_id)? {
            match self.oracle.verify(image.path(), &existing).await {
                Ok(verdict) if verdict.verified => {
                    tracing::info!(
                        identity = %identity_id,
                        matched = %existing.display(),
                        distance = verdict.distance,
                        "enrollment rejected: duplicate face"
                    );
                    return Ok(EnrollOutcome::DuplicateFace {
                        matched: existing,
                        distance: verdict.distance,
                    });
                }
                Ok(_) => {}
                // Fail-open: a comparison that cannot be performed counts as
                // a non-match for that pair and the scan continues.
                Err(err) => {
                    tracing::warn!(
                        identity = %identity_id,
                        reference = %existing.display(),
                        error = %err,
                        "comparison unavailable during enrollment, skipping pair"
                    );
                }
            }
        }

        let path = self.gallery.save(identity_id, image.path())?;
        tracing::info!(identity = %identity_id, path = %path.display(), "reference image enrolled");
        Ok(EnrollOutcome::Accepted { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ImageSource;
    use crate::testutil::{AlwaysFailingOracle, ByteEqOracle, write_png};

    fn resolved(path: PathBuf) -> ResolvedImage {
        ImageSource::Path(path).resolve().expect("test image")
    }

    fn gallery_file_count(gallery: &GalleryStore, id: Uuid) -> usize {
        gallery.list(id).unwrap().len()
    }

    #[tokio::test]
    async fn second_enrollment_of_same_face_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let guard = EnrollmentGuard::new(gallery.clone(), Arc::new(ByteEqOracle));
        let id = Uuid::new_v4();

        let face = write_png(dir.path(), "face.png", 80);
        let outcome = guard.enroll(id, &resolved(face.clone())).await.unwrap();
        assert!(matches!(outcome, EnrollOutcome::Accepted { .. }));

        // Same pixels from a different input file.
        let same_face = write_png(dir.path(), "face-again.png", 80);
        let outcome = guard.enroll(id, &resolved(same_face)).await.unwrap();
        assert!(matches!(outcome, EnrollOutcome::DuplicateFace { .. }));

        // Rejection writes nothing.
        assert_eq!(gallery_file_count(&gallery, id), 1);
    }

    #[tokio::test]
    async fn same_face_for_two_identities_is_independent() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let guard = EnrollmentGuard::new(gallery.clone(), Arc::new(ByteEqOracle));

        let face = write_png(dir.path(), "face.png", 90);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        for id in [first, second] {
            let outcome = guard.enroll(id, &resolved(face.clone())).await.unwrap();
            assert!(matches!(outcome, EnrollOutcome::Accepted { .. }));
        }
        assert_eq!(gallery_file_count(&gallery, first), 1);
        assert_eq!(gallery_file_count(&gallery, second), 1);
    }

    #[tokio::test]
    async fn distinct_faces_grow_the_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let guard = EnrollmentGuard::new(gallery.clone(), Arc::new(ByteEqOracle));
        let id = Uuid::new_v4();

        let a = write_png(dir.path(), "a.png", 10);
        let b = write_png(dir.path(), "b.png", 200);
        guard.enroll(id, &resolved(a)).await.unwrap();
        let outcome = guard.enroll(id, &resolved(b)).await.unwrap();
        assert!(matches!(outcome, EnrollOutcome::Accepted { .. }));
        assert_eq!(gallery_file_count(&gallery, id), 2);
    }

    #[tokio::test]
    async fn oracle_failure_does_not_block_enrollment() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = GalleryStore::new(dir.path().join("faces"));
        let id = Uuid::new_v4();

        // Seed one reference image directly.
        let seed = write_png(dir.path(), "seed.png", 50);
        gallery.save(id, &seed).unwrap();

        let guard = EnrollmentGuard::new(gallery.clone(), Arc::new(AlwaysFailingOracle));
        let face = write_png(dir.path(), "face.png", 50);
        let outcome = guard.enroll(id, &resolved(face)).await.unwrap();

        // Fail-open: the unperformable comparison reads as non-match.
        assert!(matches!(outcome, EnrollOutcome::Accepted { .. }));
        assert_eq!(gallery_file_count(&gallery, id), 2);
    }
}
