//! Pairing resolver.
//!
//! Keeps the partner link between two session records symmetric. The store
//! only offers single-key atomic updates, so linking is done in two phases:
//! read both records and decide, then write both with the revisions that were
//! read. A conflict on either write restarts the whole pass from a fresh read.
//! Every write is idempotent, so a pass that landed on only one side converges
//! on the next attempt.
//!
//! Chat histories are copied into the shared stream only after both writes
//! land. Each record keeps the provisional streams it has left behind, and
//! later passes fold anything posted to them into its current stream.

use std::fmt;
use std::sync::Arc;

use quill_core::roster::same_id;
use quill_core::{ChatStreamId, PairingMember, PartnerSnapshot, SessionKey, SessionRecord};
use quill_store::{SessionMutation, SessionStore};
use tracing::{debug, info, instrument, warn};

use crate::commands::{PreviewPolicy, SessionCommand};
use crate::error::{ExerciseError, Result};
use crate::lookup::find_canonical;
use crate::reconcile::ChatReconciler;
use crate::roster::RosterDirectory;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Neither the roster nor the manual overlay pairs this student.
    NoDeclaredPairing,
    /// The session already has a different partner; first assignment wins.
    KeptExistingPartner,
    /// The declared partner has no session yet; a placeholder is attached.
    PartnerPending,
    /// The partner's record is linked to someone else.
    PartnerTaken,
    AlreadyLinked,
    Linked { stream: ChatStreamId, merged: usize },
    /// Every attempt hit a concurrent write.
    Contended,
}

impl PairingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoDeclaredPairing => "no_declared_pairing",
            Self::KeptExistingPartner => "kept_existing_partner",
            Self::PartnerPending => "partner_pending",
            Self::PartnerTaken => "partner_taken",
            Self::AlreadyLinked => "already_linked",
            Self::Linked { .. } => "linked",
            Self::Contended => "contended",
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, Self::AlreadyLinked | Self::Linked { .. })
    }
}

impl fmt::Display for PairingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of an explicit partner assignment.
#[derive(Clone, Debug, Default)]
pub struct PartnerRequest {
    pub partner_session_key: Option<SessionKey>,
    pub partner_id: Option<String>,
    pub partner_name: Option<String>,
}

/// Resolved partner for an explicit assignment.
struct PartnerTarget {
    member: PairingMember,
    session_key: Option<SessionKey>,
}

/// Apply `cmd` through the store only when it would change `record`.
///
/// Returns the resulting record and whether a write happened.
pub(crate) async fn write_if_changed(
    store: &dyn SessionStore,
    record: &SessionRecord,
    cmd: &SessionCommand,
) -> Result<(SessionRecord, bool)> {
    if cmd.apply(record.clone()) == *record {
        return Ok((record.clone(), false));
    }
    let saved = store
        .update(&record.session_key, Some(record.revision), cmd)
        .await?;
    debug!(
        session_key = %saved.session_key,
        command = cmd.describe(),
        revision = saved.revision,
        "session updated"
    );
    Ok((saved, true))
}

fn link_commands(
    reader: &SessionRecord,
    other: &SessionRecord,
    stream: Option<ChatStreamId>,
) -> (SessionCommand, SessionCommand) {
    let for_reader = SessionCommand::LinkPartner {
        snapshot: PartnerSnapshot::of(other, true),
        preview: PreviewPolicy::Replace,
        partner_presence: other.presence.own.clone(),
        peer_stream: stream.clone(),
    };
    let for_other = SessionCommand::LinkPartner {
        snapshot: PartnerSnapshot::of(reader, false),
        preview: PreviewPolicy::KeepExisting,
        partner_presence: reader.presence.own.clone(),
        peer_stream: stream,
    };
    (for_reader, for_other)
}

pub struct PairingResolver {
    store: Arc<dyn SessionStore>,
    roster: Arc<RosterDirectory>,
    chat: Arc<ChatReconciler>,
    max_attempts: u32,
}

impl PairingResolver {
    pub fn new(
        store: Arc<dyn SessionStore>,
        roster: Arc<RosterDirectory>,
        chat: Arc<ChatReconciler>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            roster,
            chat,
            max_attempts: max_attempts.max(1),
        }
    }

    async fn reload(&self, key: &SessionKey) -> Result<SessionRecord> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| ExerciseError::NotFound(format!("session {key}")))
    }

    /// Bring `session` in line with its declared pairing.
    ///
    /// Safe to call on every read: when nothing needs to change no write is
    /// issued. Returns the possibly updated record.
    #[instrument(
        skip_all,
        fields(session_key = %session.session_key, student_id = %session.owner.id)
    )]
    pub async fn ensure_roster_pairing(
        &self,
        session: SessionRecord,
    ) -> Result<(SessionRecord, PairingOutcome)> {
        let key = session.session_key.clone();
        let mut current = session;
        for attempt in 1..=self.max_attempts {
            match self.pairing_pass(&current).await {
                Ok((record, outcome)) => {
                    debug!(
                        outcome = outcome.as_str(),
                        partner_id = record.partner.as_ref().map(|p| p.id.as_str()).unwrap_or(""),
                        attempt,
                        "pairing decision"
                    );
                    // Linking already swept both records.
                    if !outcome.is_linked() {
                        self.sweep_retired(&record).await?;
                    }
                    return Ok((record, outcome));
                }
                Err(e) if e.is_conflict() => {
                    debug!(attempt, error = %e, "pairing pass lost a race, retrying");
                    current = self.reload(&key).await?;
                }
                Err(e) => return Err(e),
            }
        }
        warn!(attempts = self.max_attempts, "pairing pass abandoned after repeated conflicts");
        self.sweep_retired(&current).await?;
        Ok((current, PairingOutcome::Contended))
    }

    async fn pairing_pass(
        &self,
        session: &SessionRecord,
    ) -> Result<(SessionRecord, PairingOutcome)> {
        let owner_id = session.owner.id.as_str();
        let Some(pairing) = self.roster.find_pairing_for_student(owner_id).await? else {
            return Ok((session.clone(), PairingOutcome::NoDeclaredPairing));
        };
        let Some(desired) = pairing.counterpart_of(owner_id).cloned() else {
            return Ok((session.clone(), PairingOutcome::NoDeclaredPairing));
        };
        if same_id(&desired.id, owner_id) || desired.id.trim().is_empty() {
            return Ok((session.clone(), PairingOutcome::NoDeclaredPairing));
        }

        if session.partner.is_some() && !session.partner_is(&desired.id) {
            return Ok((session.clone(), PairingOutcome::KeptExistingPartner));
        }

        let Some(partner) =
            find_canonical(self.store.as_ref(), &desired.id, Some(&session.session_key)).await?
        else {
            if session.partner.is_some() {
                return Ok((session.clone(), PairingOutcome::PartnerPending));
            }
            let cmd = SessionCommand::AttachPartner(PartnerSnapshot::placeholder(&desired));
            let (record, _) = write_if_changed(self.store.as_ref(), session, &cmd).await?;
            return Ok((record, PairingOutcome::PartnerPending));
        };

        if partner.partner.is_some() && !partner.partner_is(owner_id) {
            return Ok((session.clone(), PairingOutcome::PartnerTaken));
        }

        let (record, outcome) = self.link(session, &partner).await?;
        Ok((record, outcome))
    }

    /// Write the symmetric link between `reader` and `other`, then copy both
    /// histories into the shared peer stream.
    ///
    /// Nothing is copied until both guarded writes succeed, so a pass lost to
    /// a conflict leaves no partial history behind.
    async fn link(
        &self,
        reader: &SessionRecord,
        other: &SessionRecord,
    ) -> Result<(SessionRecord, PairingOutcome)> {
        let shared = self
            .chat
            .determine_shared_stream(
                reader.peer_chat_stream_id.as_ref(),
                other.peer_chat_stream_id.as_ref(),
            )
            .await?;
        let stream = shared.target;
        let (for_reader, for_other) = link_commands(reader, other, Some(stream.clone()));

        let store = self.store.as_ref();
        let ((record, reader_changed), (partner, other_changed)) = futures::try_join!(
            write_if_changed(store, reader, &for_reader),
            write_if_changed(store, other, &for_other),
        )?;

        // Re-reading the sources here also picks up messages posted to them
        // while the writes were in flight.
        let merged = self.sweep(&stream, &[&record, &partner], &shared.sources).await?;

        if reader_changed || other_changed {
            info!(
                session_key = %reader.session_key,
                partner_key = %other.session_key,
                stream = %stream,
                merged,
                "sessions linked"
            );
            Ok((record, PairingOutcome::Linked { stream, merged }))
        } else {
            Ok((record, PairingOutcome::AlreadyLinked))
        }
    }

    /// Copy whatever `sources` and the records' retired streams hold into
    /// `target`. Returns how many messages were appended.
    async fn sweep(
        &self,
        target: &ChatStreamId,
        records: &[&SessionRecord],
        sources: &[ChatStreamId],
    ) -> Result<usize> {
        let mut pending: Vec<ChatStreamId> = Vec::new();
        let retired = records.iter().flat_map(|r| r.retired_peer_streams.iter());
        for stream in sources.iter().chain(retired) {
            if stream != target && !stream.is_blank() && !pending.contains(stream) {
                pending.push(stream.clone());
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }
        self.chat.merge_histories(target, &pending).await
    }

    /// Fold late messages on `record`'s retired streams into its current one.
    async fn sweep_retired(&self, record: &SessionRecord) -> Result<usize> {
        if record.retired_peer_streams.is_empty() {
            return Ok(0);
        }
        match record.peer_chat_stream_id.as_ref().filter(|s| !s.is_blank()) {
            Some(target) => self.sweep(target, &[record], &[]).await,
            None => Ok(0),
        }
    }

    async fn resolve_target(
        &self,
        session: &SessionRecord,
        request: &PartnerRequest,
    ) -> Result<PartnerTarget> {
        if let Some(key) = request.partner_session_key.as_ref().filter(|k| !k.is_blank()) {
            let partner = self.reload(key).await?;
            return Ok(PartnerTarget {
                member: PairingMember::from(&partner.owner),
                session_key: Some(partner.session_key),
            });
        }

        let id = request.partner_id.as_deref().map(str::trim).unwrap_or_default();
        if id.is_empty() {
            return Err(ExerciseError::Validation("partner id is required".into()));
        }
        let name = match request.partner_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .roster
                .find_student(id)
                .await?
                .map(|s| s.name)
                .unwrap_or_default(),
        };
        let student = self.roster.ensure_student_allowed(id, &name).await?;
        let existing =
            find_canonical(self.store.as_ref(), &student.id, Some(&session.session_key)).await?;
        Ok(PartnerTarget {
            member: PairingMember::from(&student),
            session_key: existing.map(|r| r.session_key),
        })
    }

    /// Explicitly assign a partner, overriding whatever the session had.
    #[instrument(skip(self, request), fields(session_key = %key))]
    pub async fn set_partner(
        &self,
        key: &SessionKey,
        request: PartnerRequest,
    ) -> Result<SessionRecord> {
        let session = self.reload(key).await?;
        let target = self.resolve_target(&session, &request).await?;
        if same_id(&target.member.id, &session.owner.id)
            || target.session_key.as_ref() == Some(key)
        {
            return Err(ExerciseError::Validation(
                "a student cannot be paired with themselves".into(),
            ));
        }

        let mut attempt = 1;
        let record = loop {
            match self.assign_pass(key, &target).await {
                Ok(record) => break record,
                Err(e) if e.is_conflict() && attempt < self.max_attempts => {
                    debug!(attempt, error = %e, "partner assignment lost a race, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        self.roster
            .record_manual_pairing(PairingMember::from(&record.owner), target.member.clone());
        info!(partner_id = %target.member.id, "partner assigned");
        Ok(record)
    }

    async fn assign_pass(&self, key: &SessionKey, target: &PartnerTarget) -> Result<SessionRecord> {
        let session = self.reload(key).await?;
        let partner = match &target.session_key {
            Some(partner_key) => self.store.get(partner_key).await?,
            None => None,
        };
        let store = self.store.as_ref();

        let Some(partner) = partner else {
            let cmd = SessionCommand::AttachPartner(PartnerSnapshot::placeholder(&target.member));
            let (record, _) = write_if_changed(store, &session, &cmd).await?;
            return Ok(record);
        };

        let partner_free = partner.partner.is_none() || partner.partner_is(&session.owner.id);
        if !partner_free {
            warn!(
                partner_key = %partner.session_key,
                partner_id = %partner.owner.id,
                "partner is linked elsewhere; only this side updated"
            );
            let (for_reader, _) = link_commands(&session, &partner, None);
            let (record, _) = write_if_changed(store, &session, &for_reader).await?;
            return Ok(record);
        }

        let (record, _) = self.link(&session, &partner).await?;
        Ok(record)
    }

    /// Detach the partner from this session only. The peer stream is kept.
    #[instrument(skip(self), fields(session_key = %key))]
    pub async fn clear_partner(&self, key: &SessionKey) -> Result<SessionRecord> {
        let record = self.store.update(key, None, &SessionCommand::ClearPartner).await?;
        self.roster.forget_manual_pairing(&record.owner.id);
        info!("partner cleared");
        Ok(record)
    }
}
