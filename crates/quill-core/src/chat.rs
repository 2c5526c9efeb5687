use std::fmt;

use serde::{Deserialize, Serialize};

/// Chat channel a message belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Ai,
    Peer,
}

impl Channel {
    /// Resolve a channel name, including the legacy aliases.
    /// Unknown names fall back to the AI channel.
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "peer" | "peer-chat" => Self::Peer,
            _ => Self::Ai,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Peer => "peer",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// One entry in an append-only chat log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub ts: i64,
    pub role: MessageRole,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ChatMessage {
    /// Identity used to deduplicate messages across streams.
    pub fn identity(&self) -> (i64, String, String) {
        (self.ts, self.sender_id.clone(), self.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_aliases_resolve() {
        assert_eq!(Channel::resolve("peer"), Channel::Peer);
        assert_eq!(Channel::resolve("peer-chat"), Channel::Peer);
        assert_eq!(Channel::resolve("ai-feedback"), Channel::Ai);
        assert_eq!(Channel::resolve("ai"), Channel::Ai);
        assert_eq!(Channel::resolve("whatever"), Channel::Ai);
        assert_eq!(Channel::resolve(" PEER "), Channel::Peer);
    }

    #[test]
    fn message_wire_shape() {
        let msg = ChatMessage {
            ts: 42,
            role: MessageRole::User,
            sender_id: "A1".into(),
            sender_name: "Alice".into(),
            text: "hi".into(),
            metadata: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], "A1");
        assert_eq!(json["role"], "user");
        assert_eq!(msg.identity(), (42, "A1".to_string(), "hi".to_string()));
    }

    #[test]
    fn role_parses() {
        assert_eq!("assistant".parse::<MessageRole>().unwrap(), MessageRole::Assistant);
        assert!("robot".parse::<MessageRole>().is_err());
    }
}
