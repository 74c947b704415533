//! [`SqliteStore`] — identities, gallery records, and the attendance ledger.

use std::path::Path;
use std::str::FromStr as _;

use chrono::{DateTime, Local};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::encode::{day_key, encode_dt, encode_uuid, parse_dt, parse_uuid};
use crate::schema::SCHEMA;
use crate::types::{
    AttendanceEvent, AttendanceHistory, EventKind, GalleryImage, Identity, IdentityUpdate,
    NewIdentity, RecordOutcome,
};
use crate::{Error, Result};

/// Attendance record store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted and all
/// calls are serviced by one dedicated thread.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

/// Identity row before uuid/timestamp decoding.
struct RawIdentity {
    id: String,
    name: String,
    phone: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: String,
}

impl RawIdentity {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            email: row.get(3)?,
            password_hash: row.get(4)?,
            role: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Identity> {
        Ok(Identity {
            id: parse_uuid(&self.id)?,
            name: self.name,
            phone: self.phone,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            created_at: parse_dt(&self.created_at)?,
        })
    }
}

/// Result of a guarded write performed inside one connection call.
enum WriteCheck {
    Done,
    EmailTaken,
    NotFound,
}

const IDENTITY_COLUMNS: &str =
    "identity_id, name, phone, email, password_hash, role, created_at";

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store — useful for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // ── Identities ────────────────────────────────────────────────────────

    pub async fn add_identity(&self, new: NewIdentity) -> Result<Identity> {
        let created_at = Local::now();
        let row = (
            encode_uuid(new.id),
            new.name.clone(),
            new.phone.clone(),
            new.email.clone(),
            new.password_hash.clone(),
            new.role.clone(),
            encode_dt(created_at),
        );

        let check = self
            .conn
            .call(move |conn| {
                let taken: bool = conn
                    .query_row(
                        "SELECT 1 FROM identities WHERE email = ?1",
                        rusqlite::params![row.3],
                        |_| Ok(true),
                    )
                    .optional()?
                    .unwrap_or(false);
                if taken {
                    return Ok(WriteCheck::EmailTaken);
                }
                conn.execute(
                    "INSERT INTO identities (identity_id, name, phone, email, password_hash, role, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![row.0, row.1, row.2, row.3, row.4, row.5, row.6],
                )?;
                Ok(WriteCheck::Done)
            })
            .await?;

        match check {
            WriteCheck::EmailTaken => Err(Error::EmailExists(new.email)),
            _ => {
                tracing::info!(identity = %new.id, "identity created");
                Ok(Identity {
                    id: new.id,
                    name: new.name,
                    phone: new.phone,
                    email: new.email,
                    password_hash: new.password_hash,
                    role: new.role,
                    created_at,
                })
            }
        }
    }

    pub async fn get_identity(&self, id: Uuid) -> Result<Option<Identity>> {
        let id_str = encode_uuid(id);
        let raw = self
            .conn
            .call(move |conn| {
                let raw = conn
                    .query_row(
                        &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE identity_id = ?1"),
                        rusqlite::params![id_str],
                        RawIdentity::from_row,
                    )
                    .optional()?;
                Ok(raw)
            })
            .await?;
        raw.map(RawIdentity::decode).transpose()
    }

    pub async fn identity_exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.get_identity(id).await?.is_some())
    }

    /// Explicit mutation of the non-id fields. The uniqueness of `email`
    /// still holds against all other identities.
    pub async fn update_identity(&self, id: Uuid, update: IdentityUpdate) -> Result<Identity> {
        let id_str = encode_uuid(id);
        let fields = update.clone();
        let check = self
            .conn
            .call(move |conn| {
                let taken: bool = conn
                    .query_row(
                        "SELECT 1 FROM identities WHERE email = ?1 AND identity_id != ?2",
                        rusqlite::params![fields.email, id_str],
                        |_| Ok(true),
                    )
                    .optional()?
                    .unwrap_or(false);
                if taken {
                    return Ok(WriteCheck::EmailTaken);
                }
                let changed = conn.execute(
                    "UPDATE identities
                     SET name = ?1, phone = ?2, email = ?3, password_hash = ?4, role = ?5
                     WHERE identity_id = ?6",
                    rusqlite::params![
                        fields.name,
                        fields.phone,
                        fields.email,
                        fields.password_hash,
                        fields.role,
                        id_str
                    ],
                )?;
                if changed == 0 {
                    Ok(WriteCheck::NotFound)
                } else {
                    Ok(WriteCheck::Done)
                }
            })
            .await?;

        match check {
            WriteCheck::EmailTaken => Err(Error::EmailExists(update.email)),
            WriteCheck::NotFound => Err(Error::IdentityNotFound(id)),
            WriteCheck::Done => {
                tracing::info!(identity = %id, "identity updated");
                self.get_identity(id)
                    .await?
                    .ok_or(Error::IdentityNotFound(id))
            }
        }
    }

    /// All identities joined with their most recent gallery image record,
    /// ordered by name.
    pub async fn list_identities(&self) -> Result<Vec<(Identity, Option<GalleryImage>)>> {
        type RawJoined = (RawIdentity, Option<(i64, String, String)>);
        let rows: Vec<RawJoined> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT i.identity_id, i.name, i.phone, i.email, i.password_hash,
                            i.role, i.created_at, g.image_id, g.path, g.created_at
                     FROM identities i
                     LEFT JOIN gallery_images g ON g.image_id = (
                         SELECT image_id FROM gallery_images
                         WHERE identity_id = i.identity_id
                         ORDER BY image_id DESC LIMIT 1)
                     ORDER BY i.name, i.identity_id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        let identity = RawIdentity::from_row(row)?;
                        let image_id: Option<i64> = row.get(7)?;
                        let image = match image_id {
                            Some(id) => Some((id, row.get(8)?, row.get(9)?)),
                            None => None,
                        };
                        Ok((identity, image))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut joined = Vec::with_capacity(rows.len());
        for (raw, image) in rows {
            let identity = raw.decode()?;
            let image = image
                .map(|(id, path, created_at)| {
                    Ok::<_, Error>(GalleryImage {
                        id,
                        identity_id: identity.id,
                        path,
                        created_at: parse_dt(&created_at)?,
                    })
                })
                .transpose()?;
            joined.push((identity, image));
        }
        Ok(joined)
    }

    // ── Gallery records ───────────────────────────────────────────────────

    pub async fn add_gallery_image(&self, identity_id: Uuid, path: String) -> Result<GalleryImage> {
        let created_at = Local::now();
        let id_str = encode_uuid(identity_id);
        let row = (id_str, path.clone(), encode_dt(created_at));

        let image_id = self
            .conn
            .call(move |conn| {
                let exists: bool = conn
                    .query_row(
                        "SELECT 1 FROM identities WHERE identity_id = ?1",
                        rusqlite::params![row.0],
                        |_| Ok(true),
                    )
                    .optional()?
                    .unwrap_or(false);
                if !exists {
                    return Ok(None);
                }
                conn.execute(
                    "INSERT INTO gallery_images (identity_id, path, created_at)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![row.0, row.1, row.2],
                )?;
                Ok(Some(conn.last_insert_rowid()))
            })
            .await?;

        let id = image_id.ok_or(Error::IdentityNotFound(identity_id))?;
        Ok(GalleryImage {
            id,
            identity_id,
            path,
            created_at,
        })
    }

    pub async fn latest_gallery_image(&self, identity_id: Uuid) -> Result<Option<GalleryImage>> {
        let id_str = encode_uuid(identity_id);
        let raw = self
            .conn
            .call(move |conn| {
                let raw = conn
                    .query_row(
                        "SELECT image_id, path, created_at FROM gallery_images
                         WHERE identity_id = ?1 ORDER BY image_id DESC LIMIT 1",
                        rusqlite::params![id_str],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(raw)
            })
            .await?;

        raw.map(|(id, path, created_at)| {
            Ok(GalleryImage {
                id,
                identity_id,
                path,
                created_at: parse_dt(&created_at)?,
            })
        })
        .transpose()
    }

    // ── Attendance ledger ─────────────────────────────────────────────────

    /// Record one attendance event, at most once per identity, kind and
    /// local calendar day.
    ///
    /// The whole check-and-insert is a single conditional `INSERT ... ON
    /// CONFLICT DO NOTHING` against the unique `(identity_id, kind, day)`
    /// index, so the invariant holds under concurrent callers and even
    /// across processes sharing the database file.
    pub async fn record_event(
        &self,
        identity_id: Uuid,
        kind: EventKind,
        now: DateTime<Local>,
    ) -> Result<RecordOutcome> {
        let id_str = encode_uuid(identity_id);
        let kind_str = kind.as_str();
        let at_str = encode_dt(now);
        let day = day_key(now);

        // (inserted, event_id, recorded_at) or None when the identity is unknown.
        let row: Option<(bool, i64, String)> = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists: bool = tx
                    .query_row(
                        "SELECT 1 FROM identities WHERE identity_id = ?1",
                        rusqlite::params![id_str],
                        |_| Ok(true),
                    )
                    .optional()?
                    .unwrap_or(false);
                if !exists {
                    return Ok(None);
                }

                let inserted = tx.execute(
                    "INSERT INTO attendance_events (identity_id, kind, recorded_at, day)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (identity_id, kind, day) DO NOTHING",
                    rusqlite::params![id_str, kind_str, at_str, day],
                )?;

                let row = if inserted == 1 {
                    (true, tx.last_insert_rowid(), at_str.clone())
                } else {
                    tx.query_row(
                        "SELECT event_id, recorded_at FROM attendance_events
                         WHERE identity_id = ?1 AND kind = ?2 AND day = ?3",
                        rusqlite::params![id_str, kind_str, day],
                        |r| Ok((false, r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
                    )?
                };
                tx.commit()?;
                Ok(Some(row))
            })
            .await?;

        let (inserted, event_id, recorded_at) =
            row.ok_or(Error::IdentityNotFound(identity_id))?;
        let event = AttendanceEvent {
            id: event_id,
            identity_id,
            kind,
            recorded_at: parse_dt(&recorded_at)?,
        };

        if inserted {
            tracing::info!(identity = %identity_id, kind = %kind, at = %event.recorded_at, "attendance recorded");
            Ok(RecordOutcome::Recorded(event))
        } else {
            tracing::debug!(identity = %identity_id, kind = %kind, "already recorded today");
            Ok(RecordOutcome::AlreadyRecorded(event))
        }
    }

    /// Full event history for one identity, split by kind, oldest first.
    pub async fn history(&self, identity_id: Uuid) -> Result<AttendanceHistory> {
        if !self.identity_exists(identity_id).await? {
            return Err(Error::IdentityNotFound(identity_id));
        }

        let id_str = encode_uuid(identity_id);
        let rows: Vec<(i64, String, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT event_id, kind, recorded_at FROM attendance_events
                     WHERE identity_id = ?1 ORDER BY recorded_at",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![id_str], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut history = AttendanceHistory {
            arrivals: Vec::new(),
            departures: Vec::new(),
        };
        for (id, kind, recorded_at) in rows {
            let kind = EventKind::from_str(&kind).map_err(Error::EventKind)?;
            let event = AttendanceEvent {
                id,
                identity_id,
                kind,
                recorded_at: parse_dt(&recorded_at)?,
            };
            match kind {
                EventKind::Arrival => history.arrivals.push(event),
                EventKind::Departure => history.departures.push(event),
            }
        }
        Ok(history)
    }

    /// Events of one kind within the trailing `days`-day window ending at
    /// `now`, oldest first.
    pub async fn windowed(
        &self,
        identity_id: Uuid,
        kind: EventKind,
        days: u32,
        now: DateTime<Local>,
    ) -> Result<Vec<AttendanceEvent>> {
        if !self.identity_exists(identity_id).await? {
            return Err(Error::IdentityNotFound(identity_id));
        }

        let id_str = encode_uuid(identity_id);
        let kind_str = kind.as_str();
        let threshold = encode_dt(now - chrono::Duration::days(i64::from(days)));

        let rows: Vec<(i64, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT event_id, recorded_at FROM attendance_events
                     WHERE identity_id = ?1 AND kind = ?2 AND recorded_at > ?3
                     ORDER BY recorded_at",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![id_str, kind_str, threshold], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, recorded_at)| {
                Ok(AttendanceEvent {
                    id,
                    identity_id,
                    kind,
                    recorded_at: parse_dt(&recorded_at)?,
                })
            })
            .collect()
    }
}
