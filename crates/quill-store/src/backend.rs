//! Narrow contracts the exercise engine depends on.
//!
//! The engine never talks to SQLite or the filesystem directly; it only sees
//! these traits, so backends can be swapped (SQLite, in-memory, remote object
//! store) without touching pairing or reconciliation logic.

use async_trait::async_trait;
use quill_core::roster::normalize_id;
use quill_core::{Channel, ChatMessage, ChatStreamId, Roster, SessionKey, SessionRecord};

use crate::error::StoreError;

/// A transformation of one session record: old record in, new record out.
///
/// Stores apply the mutation to the freshly read record while holding the
/// per-key guarantee, then stamp `updated_at` and bump `revision` themselves.
pub trait SessionMutation: Send + Sync {
    fn apply(&self, record: SessionRecord) -> SessionRecord;

    /// Short label for logs.
    fn describe(&self) -> &'static str;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert or replace a whole record. Returns the stored copy.
    async fn save(&self, record: SessionRecord) -> Result<SessionRecord, StoreError>;

    /// Atomic read-modify-write of one key.
    ///
    /// With `expected_revision` set, fails with [`StoreError::Conflict`] when
    /// the stored revision differs, so lost updates are detectable.
    async fn update(
        &self,
        key: &SessionKey,
        expected_revision: Option<u64>,
        mutation: &dyn SessionMutation,
    ) -> Result<SessionRecord, StoreError>;

    async fn list(&self) -> Result<Vec<SessionKey>, StoreError>;

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list().await?.len())
    }

    /// All records owned by `student_id` (case-insensitive).
    async fn find_by_student(&self, student_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let wanted = normalize_id(student_id);
        let mut found = Vec::new();
        for key in self.list().await? {
            if let Some(record) = self.get(&key).await? {
                if record.owner_key() == wanted {
                    found.push(record);
                }
            }
        }
        Ok(found)
    }

    /// Backend label reported by diagnostics.
    fn describe(&self) -> &'static str;
}

#[async_trait]
pub trait ChatLog: Send + Sync {
    async fn append(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
        message: &ChatMessage,
    ) -> Result<(), StoreError>;

    /// Messages with `ts > since`. `since == 0` returns everything.
    async fn read_since(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
        since: i64,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    async fn read_all(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        self.read_since(stream, channel, 0).await
    }
}

#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn load(&self) -> Result<Roster, StoreError>;

    async fn replace(&self, roster: Roster) -> Result<(), StoreError>;
}
