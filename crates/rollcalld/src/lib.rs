//! rollcalld — service layer and daemon for the attendance system.
//!
//! Wires the face-verification core to the record store: registration and
//! gallery growth run through the enrollment guard, arrival/departure signals
//! run through the matcher and then the ledger, and the reporting queries
//! read the store directly. The binary fronts this with a D-Bus interface;
//! `rollcall-cli` links the same service for local operation.

pub mod config;
pub mod dbus_interface;
pub mod password;
pub mod service;

pub use config::Config;
pub use service::{AttendanceService, IdentityFields, Registration, ServiceError, SignalOutcome};
