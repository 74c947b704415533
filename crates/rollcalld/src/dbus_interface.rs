//! D-Bus interface for the attendance daemon.
//!
//! Bus name: org.rollcall.Attendance1
//! Object path: /org/rollcall/Attendance1
//!
//! Thin glue: arguments in, JSON replies out, everything else delegated to
//! [`AttendanceService`]. Business outcomes are part of the reply payload;
//! only invalid input and infrastructure faults become D-Bus errors.

use std::sync::Arc;

use chrono::Local;
use uuid::Uuid;
use zbus::interface;

use rollcall_core::{EnrollOutcome, ImageSource};
use rollcall_store::{EventKind, GalleryImage, Identity};

use crate::service::{AttendanceService, IdentityFields, ServiceError, SignalOutcome};

pub struct AttendanceInterface {
    service: Arc<AttendanceService>,
}

impl AttendanceInterface {
    pub fn new(service: Arc<AttendanceService>) -> Self {
        Self { service }
    }
}

fn fdo_err(err: ServiceError) -> zbus::fdo::Error {
    match err {
        ServiceError::Image(e) => zbus::fdo::Error::InvalidArgs(e.to_string()),
        ServiceError::Store(rollcall_store::Error::IdentityNotFound(id)) => {
            zbus::fdo::Error::Failed(format!("identity not found: {id}"))
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn parse_identity_id(raw: &str) -> zbus::fdo::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("identity id {raw}: {e}")))
}

fn parse_kind(raw: &str) -> zbus::fdo::Result<EventKind> {
    raw.parse().map_err(zbus::fdo::Error::InvalidArgs)
}

/// Public view of an identity record; the password hash stays inside.
fn identity_json(identity: &Identity, gallery: Option<&GalleryImage>) -> serde_json::Value {
    serde_json::json!({
        "id": identity.id,
        "name": identity.name,
        "phone": identity.phone,
        "email": identity.email,
        "role": identity.role,
        "created_at": identity.created_at,
        "gallery_path": gallery.map(|g| g.path.clone()),
    })
}

fn signal_json(outcome: &SignalOutcome) -> serde_json::Value {
    match outcome {
        SignalOutcome::Recorded { identity_id, event } => serde_json::json!({
            "recognized": true,
            "identity_id": identity_id,
            "recorded": true,
            "event": event,
        }),
        SignalOutcome::AlreadyRecorded { identity_id, event } => serde_json::json!({
            "recognized": true,
            "identity_id": identity_id,
            "recorded": false,
            "reason": "already recorded today",
            "event": event,
        }),
        SignalOutcome::NotRecognized => serde_json::json!({
            "recognized": false,
        }),
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceInterface {
    /// Register a new identity with its first reference image.
    async fn register(
        &self,
        name: &str,
        phone: &str,
        email: &str,
        password: &str,
        role: &str,
        image: Vec<u8>,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(name, email, "register requested");
        let registration = self
            .service
            .register(
                IdentityFields {
                    name: name.into(),
                    phone: phone.into(),
                    email: email.into(),
                    password: password.into(),
                    role: role.into(),
                },
                ImageSource::Bytes(image),
            )
            .await
            .map_err(fdo_err)?;
        Ok(serde_json::json!({
            "identity": identity_json(&registration.identity, None),
            "gallery_path": registration.gallery_path,
        })
        .to_string())
    }

    /// Replace an identity's fields. A non-empty image additionally enrolls
    /// a new reference image through the deduplication guard.
    async fn update(
        &self,
        identity_id: &str,
        name: &str,
        phone: &str,
        email: &str,
        password: &str,
        role: &str,
        image: Vec<u8>,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(identity_id, "update requested");
        let id = parse_identity_id(identity_id)?;
        let image = if image.is_empty() {
            None
        } else {
            Some(ImageSource::Bytes(image))
        };
        let (identity, enrollment) = self
            .service
            .update_identity(
                id,
                IdentityFields {
                    name: name.into(),
                    phone: phone.into(),
                    email: email.into(),
                    password: password.into(),
                    role: role.into(),
                },
                image,
            )
            .await
            .map_err(fdo_err)?;
        let enrollment = enrollment.map(|outcome| match outcome {
            EnrollOutcome::Accepted { path } => serde_json::json!({
                "accepted": true,
                "gallery_path": path,
            }),
            EnrollOutcome::DuplicateFace { matched, distance } => serde_json::json!({
                "accepted": false,
                "reason": "duplicate face for identity",
                "matched": matched,
                "distance": distance,
            }),
        });
        Ok(serde_json::json!({
            "identity": identity_json(&identity, None),
            "enrollment": enrollment,
        })
        .to_string())
    }

    /// Add a reference image to an existing identity's gallery.
    async fn enroll(&self, identity_id: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(identity_id, "enroll requested");
        let id = parse_identity_id(identity_id)?;
        let outcome = self
            .service
            .enroll_image(id, ImageSource::Bytes(image))
            .await
            .map_err(fdo_err)?;
        let reply = match outcome {
            EnrollOutcome::Accepted { path } => serde_json::json!({
                "accepted": true,
                "gallery_path": path,
            }),
            EnrollOutcome::DuplicateFace { matched, distance } => serde_json::json!({
                "accepted": false,
                "reason": "duplicate face for identity",
                "matched": matched,
                "distance": distance,
            }),
        };
        Ok(reply.to_string())
    }

    /// Record an arrival from a probe image.
    async fn arrive(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!("arrival signal");
        let outcome = self
            .service
            .match_and_record(ImageSource::Bytes(image), EventKind::Arrival, Local::now())
            .await
            .map_err(fdo_err)?;
        Ok(signal_json(&outcome).to_string())
    }

    /// Record a departure from a probe image.
    async fn depart(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!("departure signal");
        let outcome = self
            .service
            .match_and_record(ImageSource::Bytes(image), EventKind::Departure, Local::now())
            .await
            .map_err(fdo_err)?;
        Ok(signal_json(&outcome).to_string())
    }

    /// Full arrival/departure history for one identity.
    async fn history(&self, identity_id: &str) -> zbus::fdo::Result<String> {
        let id = parse_identity_id(identity_id)?;
        let history = self.service.history(id).await.map_err(fdo_err)?;
        serde_json::to_string(&history).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// All identities with their most recent gallery path.
    async fn list_all(&self) -> zbus::fdo::Result<String> {
        let listed = self.service.list_all().await.map_err(fdo_err)?;
        let replies: Vec<_> = listed
            .iter()
            .map(|(identity, gallery)| identity_json(identity, gallery.as_ref()))
            .collect();
        Ok(serde_json::Value::Array(replies).to_string())
    }

    /// Events of one kind within the trailing N-day window.
    async fn window(&self, identity_id: &str, kind: &str, days: u32) -> zbus::fdo::Result<String> {
        let id = parse_identity_id(identity_id)?;
        let kind = parse_kind(kind)?;
        let events = self.service.windowed(id, kind, days).await.map_err(fdo_err)?;
        serde_json::to_string(&events).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        })
        .to_string())
    }
}
