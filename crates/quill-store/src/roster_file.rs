use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use quill_core::Roster;

use crate::backend::RosterSource;
use crate::error::StoreError;

/// Roster persisted as a JSON document (`{"students": [...], "pairings": [...]}`).
/// A missing file reads as an empty roster.
pub struct JsonRosterFile {
    path: PathBuf,
}

impl JsonRosterFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RosterSource for JsonRosterFile {
    async fn load(&self) -> Result<Roster, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "roster file missing, treating as empty");
                return Ok(Roster::default());
            }
            Err(e) => return Err(StoreError::Io(format!("read roster: {e}"))),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    async fn replace(&self, roster: Roster) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(&roster)?;
        // Readers must never observe a half-written roster.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        info!(
            path = %self.path.display(),
            students = roster.students.len(),
            pairings = roster.pairings.len(),
            "roster replaced"
        );
        Ok(())
    }
}

/// Roster held in memory; used by tests and ephemeral runs.
#[derive(Default)]
pub struct StaticRoster {
    roster: RwLock<Roster>,
}

impl StaticRoster {
    pub fn new(roster: Roster) -> Self {
        Self {
            roster: RwLock::new(roster),
        }
    }
}

#[async_trait]
impl RosterSource for StaticRoster {
    async fn load(&self) -> Result<Roster, StoreError> {
        Ok(self.roster.read().clone())
    }

    async fn replace(&self, roster: Roster) -> Result<(), StoreError> {
        *self.roster.write() = roster;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{PairingMember, RosterPairing, Student};

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("quill-roster-{}", uuid::Uuid::now_v7()))
            .join("roster.json")
    }

    fn sample() -> Roster {
        Roster {
            students: vec![Student::new("A1", "Alice"), Student::new("A2", "Bob")],
            pairings: vec![RosterPairing::new(
                PairingMember { id: "A1".into(), name: "Alice".into() },
                PairingMember { id: "A2".into(), name: "Bob".into() },
            )],
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty_roster() {
        let file = JsonRosterFile::new(temp_path());
        let roster = file.load().await.unwrap();
        assert!(roster.is_empty());
    }

    #[tokio::test]
    async fn replace_then_load() {
        let path = temp_path();
        let file = JsonRosterFile::new(&path);
        file.replace(sample()).await.unwrap();
        assert!(path.exists());

        let loaded = file.load().await.unwrap();
        assert_eq!(loaded, sample());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn malformed_file_is_serialization_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonRosterFile::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn static_roster_replace() {
        let source = StaticRoster::default();
        assert!(source.load().await.unwrap().is_empty());
        source.replace(sample()).await.unwrap();
        assert_eq!(source.load().await.unwrap().students.len(), 2);
    }
}
