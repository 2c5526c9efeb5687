pub mod backend;
pub mod chat_log;
pub mod database;
pub mod error;
pub mod memory;
pub mod roster_file;
pub mod row_helpers;
pub mod schema;
pub mod sessions;

pub use backend::{ChatLog, RosterSource, SessionMutation, SessionStore};
pub use chat_log::SqliteChatLog;
pub use database::Database;
pub use error::StoreError;
pub use memory::{InMemoryChatLog, InMemorySessionStore};
pub use roster_file::{JsonRosterFile, StaticRoster};
pub use sessions::SqliteSessionStore;
