//! Presence mirror: copies a session's own presence into its partner's record.

use std::sync::Arc;

use quill_core::{now_millis, PartnerSnapshot, SessionKey, SessionRecord};
use quill_store::{SessionMutation, SessionStore};
use tracing::{debug, instrument, warn};

use crate::commands::SessionCommand;
use crate::error::Result;
use crate::lookup::find_canonical;

pub struct PresenceMirror {
    store: Arc<dyn SessionStore>,
}

impl PresenceMirror {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Mark the session online and propagate to the partner.
    #[instrument(skip(self), fields(session_key = %key))]
    pub async fn touch(&self, key: &SessionKey) -> Result<SessionRecord> {
        let cmd = SessionCommand::TouchPresence { at: now_millis() };
        let record = self.store.update(key, None, &cmd).await?;
        self.propagate(&record).await;
        Ok(record)
    }

    /// Mark the session offline and propagate to the partner.
    #[instrument(skip(self), fields(session_key = %key))]
    pub async fn leave(
        &self,
        key: &SessionKey,
        user_id: Option<String>,
        user_name: Option<String>,
    ) -> Result<SessionRecord> {
        let cmd = SessionCommand::LeavePresence {
            at: now_millis(),
            id: user_id.filter(|s| !s.trim().is_empty()),
            name: user_name.filter(|s| !s.trim().is_empty()),
        };
        let record = self.store.update(key, None, &cmd).await?;
        self.propagate(&record).await;
        Ok(record)
    }

    /// Best effort. Never fails the caller; outcomes are logged.
    pub async fn propagate(&self, record: &SessionRecord) {
        let Some(partner) = record.partner.as_ref() else {
            debug!("presence not propagated: no partner");
            return;
        };

        let target = match self.resolve_partner(record, partner).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                debug!(partner_id = %partner.id, "presence not propagated: partner has no session");
                return;
            }
            Err(e) => {
                warn!(partner_id = %partner.id, error = %e, "presence propagation failed");
                return;
            }
        };

        if !target.partner_is(&record.owner.id) {
            debug!(
                partner_key = %target.session_key,
                "presence not propagated: partner is linked elsewhere"
            );
            return;
        }

        let cmd = SessionCommand::MirrorPartnerPresence {
            from_student: record.owner.id.clone(),
            presence: record.presence.own.clone(),
        };
        if cmd.apply(target.clone()) == target {
            return;
        }
        match self.store.update(&target.session_key, None, &cmd).await {
            Ok(_) => debug!(
                partner_key = %target.session_key,
                online = record.presence.own.online,
                "presence propagated"
            ),
            Err(e) => warn!(
                partner_key = %target.session_key,
                error = %e,
                "presence propagation failed"
            ),
        }
    }

    /// Partner's record via the linked key when it still belongs to the
    /// partner, else by student id.
    async fn resolve_partner(
        &self,
        record: &SessionRecord,
        partner: &PartnerSnapshot,
    ) -> Result<Option<SessionRecord>> {
        if let Some(key) = partner.session_key.as_ref().filter(|k| !k.is_blank()) {
            if let Some(found) = self.store.get(key).await? {
                if found.belongs_to(&partner.id) {
                    return Ok(Some(found));
                }
            }
        }
        find_canonical(self.store.as_ref(), &partner.id, Some(&record.session_key)).await
    }
}
