//! Error type for `rollcall-store`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("identity not found: {0}")]
    IdentityNotFound(Uuid),

    #[error("email already registered: {0}")]
    EmailExists(String),

    #[error("uuid parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("timestamp parse error: {0}")]
    Timestamp(String),

    #[error("unknown event kind in store: {0}")]
    EventKind(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
