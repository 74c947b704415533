//! SQL schema, executed once at connection startup.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
///
/// `attendance_events` carries the system's one write-path invariant: the
/// unique index over `(identity_id, kind, day)` makes "at most one arrival
/// and one departure per identity per calendar day" a property of the
/// storage layer, enforced inside the insert itself.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS identities (
    identity_id   TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    phone         TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gallery_images (
    image_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id TEXT NOT NULL REFERENCES identities(identity_id),
    path        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Append-only. No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS attendance_events (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id TEXT NOT NULL REFERENCES identities(identity_id),
    kind        TEXT NOT NULL,    -- 'arrival' | 'departure'
    recorded_at TEXT NOT NULL,    -- RFC 3339 UTC
    day         TEXT NOT NULL,    -- local calendar date at write time
    UNIQUE (identity_id, kind, day)
);

CREATE INDEX IF NOT EXISTS gallery_identity_idx  ON gallery_images(identity_id);
CREATE INDEX IF NOT EXISTS events_identity_idx   ON attendance_events(identity_id);
CREATE INDEX IF NOT EXISTS events_recorded_idx   ON attendance_events(recorded_at);

PRAGMA user_version = 1;
";
