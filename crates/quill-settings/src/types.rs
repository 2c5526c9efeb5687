//! Settings types. Field names are camelCase on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuillSettings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub roster: RosterSettings,
    pub pairing: PairingSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// CORS origins. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Base directory; `~` expands to `$HOME`.
    pub data_dir: String,
    pub database_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.quill".to_string(),
            database_file: "quill.db".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RosterSettings {
    /// Roster JSON path; relative paths resolve against the data dir.
    pub path: String,
    pub cache_ttl_secs: u64,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            path: "roster.json".to_string(),
            cache_ttl_secs: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PairingSettings {
    /// Attempts per pairing pass before giving up on a contended pair.
    pub max_attempts: u32,
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    /// Persist warn+ events to a SQLite log database.
    pub persist_warnings: bool,
    pub log_database_file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            persist_warnings: true,
            log_database_file: "quill-logs.db".to_string(),
        }
    }
}

impl QuillSettings {
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.storage.data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.database_file)
    }

    pub fn roster_path(&self) -> PathBuf {
        let path = expand_home(&self.roster.path);
        if path.is_absolute() {
            path
        } else {
            self.data_dir().join(path)
        }
    }

    pub fn log_database_path(&self) -> PathBuf {
        self.data_dir().join(&self.logging.log_database_file)
    }

    /// Reject values that would make the server misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.pairing.max_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "pairing.maxAttempts must be at least 1".into(),
            ));
        }
        if self.server.allowed_origins.is_empty() {
            return Err(SettingsError::InvalidValue(
                "server.allowedOrigins must not be empty".into(),
            ));
        }
        if self.storage.database_file.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "storage.databaseFile must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        home_dir().join(rest)
    } else if raw == "~" {
        home_dir()
    } else {
        Path::new(raw).to_path_buf()
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
