//! The attendance service: enrollment, signal handling, reporting.
//!
//! Every operation takes the store handle it was built with — there is no
//! ambient session. Business outcomes (duplicate face, already recorded,
//! not recognized) are values; only malformed input and storage/infra
//! faults travel as errors.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;
use uuid::Uuid;

use rollcall_core::{
    CommandOracle, EnrollError, EnrollOutcome, EnrollmentGuard, FaceMatcher, GalleryStore,
    ImageError, ImageSource, MatchError, SimilarityOracle,
};
use rollcall_store::{
    AttendanceEvent, AttendanceHistory, EventKind, GalleryImage, Identity, IdentityUpdate,
    NewIdentity, RecordOutcome, SqliteStore,
};

use crate::config::Config;
use crate::password::hash_password;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid image: {0}")]
    Image(#[from] ImageError),
    #[error(transparent)]
    Store(#[from] rollcall_store::Error),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity fields as supplied by a front end, for registration or for the
/// explicit update operation. The password arrives in the clear and is
/// hashed here, never stored.
#[derive(Debug, Clone)]
pub struct IdentityFields {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

/// A freshly registered identity with its first gallery image.
#[derive(Debug)]
pub struct Registration {
    pub identity: Identity,
    pub gallery_path: PathBuf,
}

/// Outcome of one arrival/departure signal.
#[derive(Debug)]
pub enum SignalOutcome {
    Recorded {
        identity_id: Uuid,
        event: AttendanceEvent,
    },
    AlreadyRecorded {
        identity_id: Uuid,
        event: AttendanceEvent,
    },
    /// No enrolled gallery matched the probe; the ledger was not touched.
    NotRecognized,
}

pub struct AttendanceService {
    store: SqliteStore,
    guard: EnrollmentGuard,
    matcher: FaceMatcher,
}

impl AttendanceService {
    pub fn new(store: SqliteStore, gallery: GalleryStore, oracle: Arc<dyn SimilarityOracle>) -> Self {
        Self {
            store,
            guard: EnrollmentGuard::new(gallery.clone(), oracle.clone()),
            matcher: FaceMatcher::new(gallery, oracle),
        }
    }

    pub fn with_workers(
        store: SqliteStore,
        gallery: GalleryStore,
        oracle: Arc<dyn SimilarityOracle>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            guard: EnrollmentGuard::new(gallery.clone(), oracle.clone()),
            matcher: FaceMatcher::with_workers(gallery, oracle, workers),
        }
    }

    /// Build the full stack from daemon configuration: data directories,
    /// SQLite store, external verifier oracle.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceError> {
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.gallery_dir)?;

        let store = SqliteStore::open(&config.db_path).await?;
        let gallery = GalleryStore::new(&config.gallery_dir);
        let oracle: Arc<dyn SimilarityOracle> = Arc::new(
            CommandOracle::new(&config.verifier_cmd, config.verifier_args.clone())
                .with_timeout(config.verify_timeout()),
        );

        Ok(match config.matcher_workers {
            Some(workers) => Self::with_workers(store, gallery, oracle, workers),
            None => Self::new(store, gallery, oracle),
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    // ── Enrollment ────────────────────────────────────────────────────────

    /// Create an identity and enroll its first reference image.
    ///
    /// The id is minted here, before any write, so the gallery directory and
    /// the identity row agree on it. The image lands in the gallery before
    /// the identity row is inserted: a failed gallery write must not consume
    /// the unique email, and a failed row insert rolls the image back.
    pub async fn register(
        &self,
        fields: IdentityFields,
        image: ImageSource,
    ) -> Result<Registration, ServiceError> {
        let resolved = image.resolve()?;
        let id = Uuid::new_v4();

        let (gallery_path, freshly_written) = match self.guard.enroll(id, &resolved).await? {
            EnrollOutcome::Accepted { path } => (path, true),
            // A freshly minted id cannot collide with an enrolled face unless
            // a stale gallery directory survived an earlier partial
            // registration; adopt the image it already holds.
            EnrollOutcome::DuplicateFace { matched, .. } => (matched, false),
        };

        let identity = match self
            .store
            .add_identity(NewIdentity {
                id,
                name: fields.name,
                phone: fields.phone,
                email: fields.email,
                password_hash: hash_password(&fields.password),
                role: fields.role,
            })
            .await
        {
            Ok(identity) => identity,
            Err(err) => {
                if freshly_written {
                    discard_gallery_file(&gallery_path);
                }
                return Err(err.into());
            }
        };
        self.store
            .add_gallery_image(id, gallery_path.to_string_lossy().into_owned())
            .await?;

        tracing::info!(identity = %id, "registration complete");
        Ok(Registration {
            identity,
            gallery_path,
        })
    }

    /// Grow an existing identity's gallery through the deduplication guard.
    /// The gallery record row is written only for accepted images.
    pub async fn enroll_image(
        &self,
        identity_id: Uuid,
        image: ImageSource,
    ) -> Result<EnrollOutcome, ServiceError> {
        if !self.store.identity_exists(identity_id).await? {
            return Err(rollcall_store::Error::IdentityNotFound(identity_id).into());
        }

        let resolved = image.resolve()?;
        let outcome = self.guard.enroll(identity_id, &resolved).await?;
        if let EnrollOutcome::Accepted { path } = &outcome {
            self.store
                .add_gallery_image(identity_id, path.to_string_lossy().into_owned())
                .await?;
        }
        Ok(outcome)
    }

    /// Explicit identity mutation; optionally enrolls a new reference image
    /// through the deduplication guard.
    pub async fn update_identity(
        &self,
        identity_id: Uuid,
        fields: IdentityFields,
        image: Option<ImageSource>,
    ) -> Result<(Identity, Option<EnrollOutcome>), ServiceError> {
        let identity = self
            .store
            .update_identity(
                identity_id,
                IdentityUpdate {
                    name: fields.name,
                    phone: fields.phone,
                    email: fields.email,
                    password_hash: hash_password(&fields.password),
                    role: fields.role,
                },
            )
            .await?;
        let enrollment = match image {
            Some(image) => Some(self.enroll_image(identity_id, image).await?),
            None => None,
        };
        Ok((identity, enrollment))
    }

    // ── Signals ───────────────────────────────────────────────────────────

    /// Match a probe against all enrolled galleries and, on a positive
    /// match, record the event. An unrecognized probe never reaches the
    /// ledger.
    pub async fn match_and_record(
        &self,
        image: ImageSource,
        kind: EventKind,
        now: DateTime<Local>,
    ) -> Result<SignalOutcome, ServiceError> {
        let resolved = image.resolve()?;
        let report = self.matcher.match_probe(&resolved).await?;

        let Some(identity_id) = report.result.identity_id else {
            tracing::info!(kind = %kind, "signal from unrecognized face");
            return Ok(SignalOutcome::NotRecognized);
        };

        if report.comparisons_failed > 0 {
            tracing::warn!(
                failed = report.comparisons_failed,
                run = report.comparisons_run,
                "match completed with degraded comparisons"
            );
        }

        match self.store.record_event(identity_id, kind, now).await? {
            RecordOutcome::Recorded(event) => Ok(SignalOutcome::Recorded { identity_id, event }),
            RecordOutcome::AlreadyRecorded(event) => {
                Ok(SignalOutcome::AlreadyRecorded { identity_id, event })
            }
        }
    }

    // ── Reporting ─────────────────────────────────────────────────────────

    pub async fn history(&self, identity_id: Uuid) -> Result<AttendanceHistory, ServiceError> {
        Ok(self.store.history(identity_id).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<(Identity, Option<GalleryImage>)>, ServiceError> {
        Ok(self.store.list_identities().await?)
    }

    pub async fn windowed(
        &self,
        identity_id: Uuid,
        kind: EventKind,
        days: u32,
    ) -> Result<Vec<AttendanceEvent>, ServiceError> {
        Ok(self
            .store
            .windowed(identity_id, kind, days, Local::now())
            .await?)
    }
}

/// Remove an image written during a registration whose identity row was
/// never inserted, so the gallery holds no faces for absent identities.
/// The identity directory goes with it if the image was its only entry.
fn discard_gallery_file(path: &std::path::Path) {
    if let Err(err) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "failed to remove image after aborted registration"
        );
        return;
    }
    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir(dir);
    }
}
