use std::sync::Arc;

use quill_core::{now_millis, Channel, ChatMessage, ChatStreamId, Group, MessageRole};
use quill_store::ChatLog;
use serde_json::{Map, Value};
use tracing::debug;

use crate::commands::require_text;
use crate::error::{ExerciseError, Result};

/// A message about to be appended.
#[derive(Clone, Debug)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub role: MessageRole,
    pub text: String,
    pub group: Option<Group>,
    pub metadata: Map<String, Value>,
}

impl NewMessage {
    pub fn from_user(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            role: MessageRole::User,
            text: text.into(),
            group: None,
            metadata: Map::new(),
        }
    }
}

pub struct ChatService {
    log: Arc<dyn ChatLog>,
}

fn require_stream(stream: &ChatStreamId) -> Result<()> {
    if stream.is_blank() {
        return Err(ExerciseError::Validation("chat stream id is required".into()));
    }
    Ok(())
}

impl ChatService {
    pub fn new(log: Arc<dyn ChatLog>) -> Self {
        Self { log }
    }

    pub async fn post(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
        message: NewMessage,
    ) -> Result<ChatMessage> {
        require_stream(stream)?;
        let text = require_text("message", &message.text)?;

        let mut metadata = message.metadata;
        if let Some(group) = message.group {
            metadata.insert("group".into(), Value::String(group.to_string()));
        }
        let entry = ChatMessage {
            ts: now_millis(),
            role: message.role,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            text,
            metadata,
        };
        self.log.append(stream, channel, &entry).await?;
        debug!(
            stream = %stream,
            channel = %channel,
            role = entry.role.as_str(),
            "chat message appended"
        );
        Ok(entry)
    }

    /// Messages strictly newer than `since`; `since == 0` returns everything.
    pub async fn messages_since(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
        since: i64,
    ) -> Result<Vec<ChatMessage>> {
        require_stream(stream)?;
        Ok(self.log.read_since(stream, channel, since.max(0)).await?)
    }

    pub async fn history(
        &self,
        stream: &ChatStreamId,
        channel: Channel,
    ) -> Result<Vec<ChatMessage>> {
        require_stream(stream)?;
        Ok(self.log.read_all(stream, channel).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_store::InMemoryChatLog;

    fn service() -> ChatService {
        ChatService::new(Arc::new(InMemoryChatLog::new()))
    }

    #[tokio::test]
    async fn post_trims_and_tags_group() {
        let chat = service();
        let stream = ChatStreamId::new();
        let mut msg = NewMessage::from_user("A1", "Alice", "  hello  ");
        msg.group = Some(Group::B);

        let stored = chat.post(&stream, Channel::Peer, msg).await.unwrap();
        assert_eq!(stored.text, "hello");
        assert_eq!(stored.metadata["group"], "B");

        let history = chat.history(&stream, Channel::Peer).await.unwrap();
        assert_eq!(history, vec![stored]);
        assert!(chat.history(&stream, Channel::Ai).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_text_or_stream_rejected() {
        let chat = service();
        let err = chat
            .post(&ChatStreamId::new(), Channel::Ai, NewMessage::from_user("A1", "Alice", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ExerciseError::Validation(_)));

        let err = chat
            .history(&ChatStreamId::from_raw(""), Channel::Ai)
            .await
            .unwrap_err();
        assert!(matches!(err, ExerciseError::Validation(_)));
    }

    #[tokio::test]
    async fn since_filters_strictly() {
        let chat = service();
        let stream = ChatStreamId::new();
        let first = chat
            .post(&stream, Channel::Ai, NewMessage::from_user("A1", "Alice", "one"))
            .await
            .unwrap();
        let all = chat.messages_since(&stream, Channel::Ai, 0).await.unwrap();
        assert_eq!(all.len(), 1);
        let newer = chat.messages_since(&stream, Channel::Ai, first.ts).await.unwrap();
        assert!(newer.is_empty());
    }
}
