use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use tracing::instrument;

use quill_core::clock::now_millis;
use quill_core::roster::normalize_id;
use quill_core::{SessionKey, SessionRecord};

use crate::backend::{SessionMutation, SessionStore};
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// SQLite-backed session store. Per-key atomicity comes from running each
/// update inside a transaction on the single shared connection.
pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn read_record(conn: &Connection, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
    let mut stmt = conn.prepare("SELECT record, revision FROM sessions WHERE session_key = ?1")?;
    let mut rows = stmt.query([key.as_str()])?;
    let record = match rows.next()? {
        Some(row) => Some(row_to_record(row)?),
        None => None,
    };
    Ok(record)
}

fn write_record(conn: &Connection, record: &SessionRecord) -> Result<(), StoreError> {
    let json = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO sessions
            (session_key, student_key, group_name, stage, record, revision, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(session_key) DO UPDATE SET
            student_key = excluded.student_key,
            group_name = excluded.group_name,
            stage = excluded.stage,
            record = excluded.record,
            revision = excluded.revision,
            updated_at = excluded.updated_at",
        rusqlite::params![
            record.session_key.as_str(),
            record.owner_key(),
            record.group.to_string(),
            record.stage.number(),
            json,
            record.revision as i64,
            record.created_at,
            record.updated_at,
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<SessionRecord, StoreError> {
    let raw: String = row_helpers::get(row, 0, "sessions", "record")?;
    let mut record: SessionRecord = row_helpers::parse_json(&raw, "sessions", "record")?;
    // The column is authoritative; the JSON copy may lag behind a raw UPDATE.
    record.revision = row_helpers::get::<i64>(row, 1, "sessions", "revision")? as u64;
    Ok(record)
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self), fields(session_key = %key))]
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        self.db.with_conn(|conn| read_record(conn, key))
    }

    #[instrument(skip(self, record), fields(session_key = %record.session_key))]
    async fn save(&self, mut record: SessionRecord) -> Result<SessionRecord, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let previous: Option<i64> = tx
                .query_row(
                    "SELECT revision FROM sessions WHERE session_key = ?1",
                    [record.session_key.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            record.revision = previous.map_or(1, |r| r as u64 + 1);
            write_record(&tx, &record)?;
            tx.commit()?;
            Ok(record)
        })
    }

    #[instrument(skip(self, mutation), fields(session_key = %key, mutation = mutation.describe()))]
    async fn update(
        &self,
        key: &SessionKey,
        expected_revision: Option<u64>,
        mutation: &dyn SessionMutation,
    ) -> Result<SessionRecord, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let current = read_record(&tx, key)?
                .ok_or_else(|| StoreError::NotFound(format!("session {key}")))?;

            if let Some(expected) = expected_revision {
                if current.revision != expected {
                    return Err(StoreError::Conflict {
                        key: key.to_string(),
                        expected,
                        actual: current.revision,
                    });
                }
            }

            let revision = current.revision + 1;
            let updated_at = now_millis().max(current.updated_at);
            let mut next = mutation.apply(current);
            next.session_key = key.clone();
            next.revision = revision;
            next.updated_at = updated_at;

            write_record(&tx, &next)?;
            tx.commit()?;
            Ok(next)
        })
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<SessionKey>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT session_key FROM sessions ORDER BY created_at, session_key")?;
            let mut rows = stmt.query([])?;
            let mut keys = Vec::new();
            while let Some(row) = rows.next()? {
                keys.push(SessionKey::from_raw(row_helpers::get::<String>(
                    row,
                    0,
                    "sessions",
                    "session_key",
                )?));
            }
            Ok(keys)
        })
    }

    #[instrument(skip(self), fields(session_key = %key))]
    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE session_key = ?1", [key.as_str()])?;
            if n == 0 {
                return Err(StoreError::NotFound(format!("session {key}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self))]
    async fn count(&self) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
            Ok(n as usize)
        })
    }

    #[instrument(skip(self))]
    async fn find_by_student(&self, student_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let wanted = normalize_id(student_id);
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT record, revision FROM sessions WHERE student_key = ?1")?;
            let mut rows = stmt.query([wanted.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_record(row)?);
            }
            Ok(results)
        })
    }

    fn describe(&self) -> &'static str {
        "sqlite"
    }
}
