//! SQLite record store for the attendance system.
//!
//! Holds identity records, one row per accepted gallery image, and the
//! append-only attendance ledger. Wraps [`tokio_rusqlite`] so all database
//! access runs off the async runtime's worker threads.
//!
//! The one invariant this crate owns: at most one attendance event per
//! `(identity, kind, calendar day)`, enforced by a schema-level unique
//! constraint and a single conditional insert — never by a separate
//! check-then-insert sequence.

mod encode;
mod schema;
mod store;

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use store::SqliteStore;
pub use types::{
    AttendanceEvent, AttendanceHistory, EventKind, GalleryImage, Identity, IdentityUpdate,
    NewIdentity, RecordOutcome,
};
