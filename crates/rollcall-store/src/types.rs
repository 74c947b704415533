//! Record types stored by [`crate::SqliteStore`].

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An enrolled person. `id` is immutable; everything else changes only
/// through an explicit update. Identities are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Local>,
}

/// Fields for creating an identity. The id is minted by the caller so the
/// gallery directory can exist before the row does.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// Mutable identity fields for the explicit update operation.
#[derive(Debug, Clone)]
pub struct IdentityUpdate {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// One row per reference image accepted into an identity's gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryImage {
    pub id: i64,
    pub identity_id: Uuid,
    pub path: String,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Arrival,
    Departure,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Arrival => "arrival",
            EventKind::Departure => "departure",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arrival" => Ok(EventKind::Arrival),
            "departure" => Ok(EventKind::Departure),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// An attendance ledger entry. Never mutated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: i64,
    pub identity_id: Uuid,
    pub kind: EventKind,
    pub recorded_at: DateTime<Local>,
}

/// Result of the ledger's conditional insert. "Already recorded" is an
/// expected business outcome, not a failure.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Recorded(AttendanceEvent),
    AlreadyRecorded(AttendanceEvent),
}

impl RecordOutcome {
    pub fn recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded(_))
    }

    pub fn event(&self) -> &AttendanceEvent {
        match self {
            RecordOutcome::Recorded(e) | RecordOutcome::AlreadyRecorded(e) => e,
        }
    }
}

/// Full per-identity event history, split by kind.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceHistory {
    pub arrivals: Vec<AttendanceEvent>,
    pub departures: Vec<AttendanceEvent>,
}
