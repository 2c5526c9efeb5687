use async_trait::async_trait;
use dashmap::DashMap;

use quill_core::clock::now_millis;
use quill_core::{Channel, ChatMessage, ChatStreamId, SessionKey, SessionRecord};

use crate::backend::{ChatLog, SessionMutation, SessionStore};
use crate::error::StoreError;

/// Process-local session store. Each key's entry lock gives the per-key
/// atomicity that `update` requires.
#[derive(Default)]
pub struct InMemorySessionStore {
    records: DashMap<SessionKey, SessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn save(&self, mut record: SessionRecord) -> Result<SessionRecord, StoreError> {
        let mut entry = self
            .records
            .entry(record.session_key.clone())
            .or_insert_with(|| SessionRecord {
                revision: 0,
                ..record.clone()
            });
        record.revision = entry.revision + 1;
        *entry = record.clone();
        Ok(record)
    }

    async fn update(
        &self,
        key: &SessionKey,
        expected_revision: Option<u64>,
        mutation: &dyn SessionMutation,
    ) -> Result<SessionRecord, StoreError> {
        let mut entry = self
            .records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("session {key}")))?;

        if let Some(expected) = expected_revision {
            if entry.revision != expected {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual: entry.revision,
                });
            }
        }

        let revision = entry.revision + 1;
        let updated_at = now_millis().max(entry.updated_at);
        let mut next = mutation.apply(entry.value().clone());
        next.session_key = key.clone();
        next.revision = revision;
        next.updated_at = updated_at;
        *entry = next.clone();
        Ok(next)
    }

    async fn list(&self) -> Result<Vec<SessionKey>, StoreError> {
        let mut keys: Vec<(i64, SessionKey)> = self
            .records
            .iter()
            .map(|r| (r.created_at, r.key().clone()))
            .collect();
        keys.sort();
        Ok(keys.into_iter().map(|(_, k)| k).collect())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.records
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("session {key}")))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }

    fn describe(&self) -> &'static str {
        "memory"
    }
}

/// Process-local chat log keyed by (stream, channel).
#[derive(Default)]
pub struct InMemoryChatLog {
    streams: DashMap<(ChatStreamId, Channel), Vec<ChatMessage>>,
}

impl InMemoryChatLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatLog for InMemoryChatLog {
    async fn append(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
        message: &ChatMessage,
    ) -> Result<(), StoreError> {
        self.streams
            .entry((stream.clone(), channel))
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn read_since(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
        since: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages: Vec<ChatMessage> = self
            .streams
            .get(&(stream.clone(), channel))
            .map(|log| {
                log.iter()
                    .filter(|m| since == 0 || m.ts > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        messages.sort_by_key(|m| m.ts);
        Ok(messages)
    }
}
