use async_trait::async_trait;
use tracing::instrument;

use quill_core::{Channel, ChatMessage, ChatStreamId};

use crate::backend::ChatLog;
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Append-only chat log stored alongside sessions.
pub struct SqliteChatLog {
    db: Database,
}

impl SqliteChatLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<ChatMessage, StoreError> {
    let role: String = row_helpers::get(row, 1, "chat_messages", "role")?;
    let metadata: String = row_helpers::get(row, 5, "chat_messages", "metadata")?;
    Ok(ChatMessage {
        ts: row_helpers::get(row, 0, "chat_messages", "ts")?,
        role: row_helpers::parse_enum(&role, "chat_messages", "role")?,
        sender_id: row_helpers::get(row, 2, "chat_messages", "sender_id")?,
        sender_name: row_helpers::get(row, 3, "chat_messages", "sender_name")?,
        text: row_helpers::get(row, 4, "chat_messages", "text")?,
        metadata: row_helpers::parse_json(&metadata, "chat_messages", "metadata")?,
    })
}

#[async_trait]
impl ChatLog for SqliteChatLog {
    #[instrument(skip(self, message), fields(stream = %stream, channel = %channel))]
    async fn append(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
        message: &ChatMessage,
    ) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&message.metadata)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages
                    (stream_id, channel, ts, role, sender_id, sender_name, text, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    stream.as_str(),
                    channel.as_str(),
                    message.ts,
                    message.role.as_str(),
                    message.sender_id,
                    message.sender_name,
                    message.text,
                    metadata,
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(stream = %stream, channel = %channel))]
    async fn read_since(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
        since: i64,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        self.db.with_conn(|conn| {
            // Insertion order breaks ties between equal timestamps.
            let (sql, floor) = if since == 0 {
                (
                    "SELECT ts, role, sender_id, sender_name, text, metadata FROM chat_messages
                     WHERE stream_id = ?1 AND channel = ?2 ORDER BY ts, id",
                    None,
                )
            } else {
                (
                    "SELECT ts, role, sender_id, sender_name, text, metadata FROM chat_messages
                     WHERE stream_id = ?1 AND channel = ?2 AND ts > ?3 ORDER BY ts, id",
                    Some(since),
                )
            };
            let mut stmt = conn.prepare(sql)?;
            let mut rows = match floor {
                Some(ts) => stmt.query(rusqlite::params![stream.as_str(), channel.as_str(), ts])?,
                None => stmt.query(rusqlite::params![stream.as_str(), channel.as_str()])?,
            };
            let mut messages = Vec::new();
            while let Some(row) = rows.next()? {
                messages.push(row_to_message(row)?);
            }
            Ok(messages)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::MessageRole;

    fn msg(ts: i64, sender: &str, text: &str) -> ChatMessage {
        ChatMessage {
            ts,
            role: MessageRole::User,
            sender_id: sender.into(),
            sender_name: sender.to_uppercase(),
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn append_and_read_all_in_ts_order() {
        let log = SqliteChatLog::new(Database::in_memory().unwrap());
        let stream = ChatStreamId::new();
        log.append(&stream, Channel::Peer, &msg(20, "a", "second")).await.unwrap();
        log.append(&stream, Channel::Peer, &msg(10, "b", "first")).await.unwrap();

        let all = log.read_all(&stream, Channel::Peer).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "first");
        assert_eq!(all[1].text, "second");
    }

    #[tokio::test]
    async fn read_since_is_strictly_after() {
        let log = SqliteChatLog::new(Database::in_memory().unwrap());
        let stream = ChatStreamId::new();
        for ts in [10, 20, 30] {
            log.append(&stream, Channel::Ai, &msg(ts, "a", "x")).await.unwrap();
        }
        let newer = log.read_since(&stream, Channel::Ai, 20).await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].ts, 30);
    }

    #[tokio::test]
    async fn channels_and_streams_are_isolated() {
        let log = SqliteChatLog::new(Database::in_memory().unwrap());
        let s1 = ChatStreamId::new();
        let s2 = ChatStreamId::new();
        log.append(&s1, Channel::Ai, &msg(1, "a", "ai")).await.unwrap();
        log.append(&s1, Channel::Peer, &msg(1, "a", "peer")).await.unwrap();

        assert_eq!(log.read_all(&s1, Channel::Ai).await.unwrap().len(), 1);
        assert_eq!(log.read_all(&s1, Channel::Peer).await.unwrap()[0].text, "peer");
        assert!(log.read_all(&s2, Channel::Peer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn metadata_survives_storage() {
        let log = SqliteChatLog::new(Database::in_memory().unwrap());
        let stream = ChatStreamId::new();
        let mut m = msg(5, "a", "hello");
        m.metadata.insert("group".into(), serde_json::json!("B"));
        log.append(&stream, Channel::Peer, &m).await.unwrap();

        let read = log.read_all(&stream, Channel::Peer).await.unwrap();
        assert_eq!(read[0], m);
    }
}
