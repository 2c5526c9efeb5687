//! Roster directory: cached view of enrolled students and declared pairings.
//!
//! The cache is refreshed from the [`RosterSource`] when older than the
//! configured TTL, or on demand. Pairings set by hand through the admin
//! surface live in a separate overlay that takes precedence over the roster
//! and survives TTL refreshes; only [`RosterDirectory::invalidate`] drops it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use quill_core::roster::normalize_id;
use quill_core::{PairingMember, Roster, RosterPairing, Student};
use quill_store::RosterSource;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{ExerciseError, Result};

pub const DEFAULT_ROSTER_TTL: Duration = Duration::from_secs(60);

struct CachedRoster {
    loaded_at: Instant,
    roster: Arc<Roster>,
    /// Normalized student id -> pairing, indexed from both sides.
    pairings: HashMap<String, RosterPairing>,
}

impl CachedRoster {
    fn build(roster: Roster) -> Self {
        let mut pairings = HashMap::new();
        for pairing in &roster.pairings {
            for member in [&pairing.primary, &pairing.partner] {
                let key = normalize_id(&member.id);
                if !key.is_empty() {
                    pairings.insert(key, pairing.clone());
                }
            }
        }
        Self {
            loaded_at: Instant::now(),
            roster: Arc::new(roster),
            pairings,
        }
    }
}

pub struct RosterDirectory {
    source: Arc<dyn RosterSource>,
    ttl: Duration,
    cache: RwLock<Option<CachedRoster>>,
    manual: RwLock<HashMap<String, RosterPairing>>,
}

impl RosterDirectory {
    pub fn new(source: Arc<dyn RosterSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(None),
            manual: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &Arc<dyn RosterSource> {
        &self.source
    }

    fn fresh(&self) -> Option<Arc<Roster>> {
        let cache = self.cache.read();
        cache
            .as_ref()
            .filter(|c| c.loaded_at.elapsed() < self.ttl)
            .map(|c| Arc::clone(&c.roster))
    }

    /// Current roster, reloading from the source when stale or forced.
    pub async fn fetch_roster_students(&self, force_reload: bool) -> Result<Arc<Roster>> {
        if !force_reload {
            if let Some(roster) = self.fresh() {
                return Ok(roster);
            }
        }

        let roster = self.source.load().await?;
        let cached = CachedRoster::build(roster);
        let snapshot = Arc::clone(&cached.roster);
        debug!(
            students = snapshot.students.len(),
            pairings = cached.pairings.len(),
            forced = force_reload,
            "roster reloaded"
        );
        *self.cache.write() = Some(cached);
        Ok(snapshot)
    }

    /// Verify a login against the roster and return the roster's entry.
    pub async fn ensure_student_allowed(
        &self,
        student_id: &str,
        student_name: &str,
    ) -> Result<Student> {
        let id = student_id.trim();
        if id.is_empty() {
            return Err(ExerciseError::Validation("student id is required".into()));
        }

        let roster = self.fetch_roster_students(false).await?;
        if roster.is_empty() {
            return Err(ExerciseError::Config("the roster has no students".into()));
        }

        let student = roster.find_student(id).ok_or_else(|| {
            ExerciseError::Permission(format!("student {id} is not on the roster"))
        })?;

        let expected = student.name.trim();
        if !expected.is_empty() && expected != student_name.trim() {
            return Err(ExerciseError::Permission(format!(
                "name does not match the roster entry for {id}"
            )));
        }
        Ok(student.clone())
    }

    pub async fn find_student(&self, student_id: &str) -> Result<Option<Student>> {
        let roster = self.fetch_roster_students(false).await?;
        Ok(roster.find_student(student_id).cloned())
    }

    /// Declared pairing containing `student_id` on either side.
    /// Manually recorded pairings win over the roster.
    pub async fn find_pairing_for_student(
        &self,
        student_id: &str,
    ) -> Result<Option<RosterPairing>> {
        let key = normalize_id(student_id);
        if key.is_empty() {
            return Ok(None);
        }
        let manual = self.manual.read().get(&key).cloned();
        if manual.is_some() {
            return Ok(manual);
        }

        self.fetch_roster_students(false).await?;
        let cache = self.cache.read();
        Ok(cache.as_ref().and_then(|c| c.pairings.get(&key).cloned()))
    }

    pub fn record_manual_pairing(&self, a: PairingMember, b: PairingMember) {
        let pairing = RosterPairing::new(a, b);
        let mut manual = self.manual.write();
        for member in [&pairing.primary, &pairing.partner] {
            manual.insert(normalize_id(&member.id), pairing.clone());
        }
        info!(
            primary = %pairing.primary.id,
            partner = %pairing.partner.id,
            "manual pairing recorded"
        );
    }

    /// Drop the overlay entry for `student_id`, and the counterpart's entry
    /// when it still names `student_id`.
    pub fn forget_manual_pairing(&self, student_id: &str) {
        let key = normalize_id(student_id);
        let mut manual = self.manual.write();
        let Some(pairing) = manual.remove(&key) else {
            return;
        };
        if let Some(other) = pairing.counterpart_of(&key) {
            let other_key = normalize_id(&other.id);
            if manual.get(&other_key).is_some_and(|p| p.involves(&key)) {
                manual.remove(&other_key);
            }
        }
        debug!(student_id = %key, "manual pairing forgotten");
    }

    /// Drop the cached roster and every manual pairing.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
        self.manual.write().clear();
        debug!("roster directory invalidated");
    }
}
