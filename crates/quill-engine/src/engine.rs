//! Exercise engine: the operations the server exposes, composed from the
//! roster directory, pairing resolver, presence mirror and chat service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quill_core::{
    now_millis, pick_canonical, Channel, ChatMessage, ChatStreamId, Group, MessageRole,
    PartnerSnapshot, Roster, SessionKey, SessionRecord, Stage, Student,
};
use quill_store::{ChatLog, RosterSource, SessionMutation, SessionStore};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::chat::{ChatService, NewMessage};
use crate::commands::{require_text, SessionCommand};
use crate::error::{ExerciseError, Result};
use crate::lookup::find_canonical;
use crate::pairing::{PairingOutcome, PairingResolver, PartnerRequest, DEFAULT_MAX_ATTEMPTS};
use crate::presence::PresenceMirror;
use crate::reconcile::ChatReconciler;
use crate::roster::{RosterDirectory, DEFAULT_ROSTER_TTL};
use crate::stage;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub pairing_max_attempts: u32,
    pub roster_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pairing_max_attempts: DEFAULT_MAX_ATTEMPTS,
            roster_ttl: DEFAULT_ROSTER_TTL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WritingTimestamps {
    pub prewriting_saved_at: i64,
    pub draft_saved_at: i64,
    pub notes_saved_at: i64,
    pub final_saved_at: i64,
}

/// Admin listing row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_key: SessionKey,
    pub group: Group,
    pub owner: Student,
    pub stage: Stage,
    pub created_at: i64,
    pub updated_at: i64,
    pub writing: WritingTimestamps,
    pub partner: Option<PartnerSnapshot>,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(r: &SessionRecord) -> Self {
        Self {
            session_key: r.session_key.clone(),
            group: r.group,
            owner: r.owner.clone(),
            stage: r.stage,
            created_at: r.created_at,
            updated_at: r.updated_at,
            writing: WritingTimestamps {
                prewriting_saved_at: r.writing.prewriting.saved_at,
                draft_saved_at: r.writing.draft.saved_at,
                notes_saved_at: r.writing.notes.saved_at,
                final_saved_at: r.writing.final_writing.saved_at,
            },
            partner: r.partner.clone().map(|p| PartnerSnapshot { writing: None, ..p }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub examined: usize,
    pub linked: usize,
    pub pending: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub sessions: usize,
    pub storage_mode: &'static str,
    pub roster_students: usize,
}

pub struct ExerciseEngine {
    store: Arc<dyn SessionStore>,
    roster: Arc<RosterDirectory>,
    pairing: PairingResolver,
    presence: PresenceMirror,
    chat: ChatService,
}

impl ExerciseEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        chat_log: Arc<dyn ChatLog>,
        roster_source: Arc<dyn RosterSource>,
        config: EngineConfig,
    ) -> Self {
        let roster = Arc::new(RosterDirectory::new(roster_source, config.roster_ttl));
        let reconciler = Arc::new(ChatReconciler::new(chat_log.clone()));
        Self {
            pairing: PairingResolver::new(
                store.clone(),
                roster.clone(),
                reconciler,
                config.pairing_max_attempts,
            ),
            presence: PresenceMirror::new(store.clone()),
            chat: ChatService::new(chat_log),
            roster,
            store,
        }
    }

    pub fn roster(&self) -> &Arc<RosterDirectory> {
        &self.roster
    }

    async fn load(&self, key: &SessionKey) -> Result<SessionRecord> {
        if key.is_blank() {
            return Err(ExerciseError::Validation("session key is required".into()));
        }
        self.store
            .get(key)
            .await?
            .ok_or_else(|| ExerciseError::NotFound(format!("session {key}")))
    }

    async fn apply(&self, key: &SessionKey, cmd: SessionCommand) -> Result<SessionRecord> {
        if key.is_blank() {
            return Err(ExerciseError::Validation("session key is required".into()));
        }
        let record = self.store.update(key, None, &cmd).await?;
        debug!(
            session_key = %key,
            command = cmd.describe(),
            stage = %record.stage,
            "session updated"
        );
        Ok(record)
    }

    /// Apply a stage-changing command and let the partner see the new stage.
    async fn apply_and_mirror(
        &self,
        key: &SessionKey,
        cmd: SessionCommand,
    ) -> Result<SessionRecord> {
        let record = self.apply(key, cmd).await?;
        self.presence.propagate(&record).await;
        Ok(record)
    }

    // ── Sessions ──

    /// Roster-verified login. Resumes the student's canonical record when one
    /// exists; otherwise creates a fresh one.
    #[instrument(skip(self, student_name))]
    pub async fn start_session(
        &self,
        group: &str,
        student_id: &str,
        student_name: &str,
    ) -> Result<SessionRecord> {
        let group: Group = group.parse().map_err(ExerciseError::Validation)?;
        let id = student_id.trim();
        let name = student_name.trim();
        if id.is_empty() {
            return Err(ExerciseError::Validation("student id is required".into()));
        }
        if name.is_empty() {
            return Err(ExerciseError::Validation("student name is required".into()));
        }

        let student = self.roster.ensure_student_allowed(id, name).await?;
        let record = match find_canonical(self.store.as_ref(), &student.id, None).await? {
            Some(existing) => {
                info!(session_key = %existing.session_key, "session resumed");
                existing
            }
            None => {
                let owner_name = if student.name.trim().is_empty() {
                    name.to_string()
                } else {
                    student.name.trim().to_string()
                };
                let owner = Student::new(student.id.trim(), owner_name);
                let fresh = SessionRecord::new(owner, group, now_millis());
                let saved = self.store.save(fresh).await?;
                info!(session_key = %saved.session_key, group = %group, "session started");
                saved
            }
        };
        Ok(self.reconciled(record).await)
    }

    /// Run the pairing pass, falling back to the record as read on failure.
    async fn reconciled(&self, record: SessionRecord) -> SessionRecord {
        let key = record.session_key.clone();
        match self.pairing.ensure_roster_pairing(record.clone()).await {
            Ok((updated, _)) => updated,
            Err(e) => {
                warn!(session_key = %key, error = %e, kind = e.error_kind(), "pairing pass failed");
                record
            }
        }
    }

    pub async fn session_state(&self, key: &SessionKey) -> Result<SessionRecord> {
        let record = self.load(key).await?;
        Ok(self.reconciled(record).await)
    }

    /// Summaries of every stored session, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let records = self.all_records().await?;
        let mut summaries: Vec<SessionSummary> = records.iter().map(SessionSummary::from).collect();
        summaries.sort_by(|a, b| {
            (b.updated_at, b.created_at).cmp(&(a.updated_at, a.created_at))
        });
        Ok(summaries)
    }

    async fn all_records(&self) -> Result<Vec<SessionRecord>> {
        let keys = self.store.list().await?;
        let store = self.store.as_ref();
        let records = futures::future::try_join_all(keys.iter().map(|k| store.get(k))).await?;
        Ok(records.into_iter().flatten().collect())
    }

    #[instrument(skip(self))]
    pub async fn delete_session(&self, key: &SessionKey) -> Result<()> {
        self.store.delete(key).await?;
        info!("session deleted");
        Ok(())
    }

    // ── Writing and stages ──

    pub async fn submit_prewriting(&self, key: &SessionKey, text: &str) -> Result<SessionRecord> {
        let text = require_text("prewriting", text)?;
        self.apply_and_mirror(key, SessionCommand::SubmitPrewriting { text, at: now_millis() })
            .await
    }

    pub async fn save_draft(&self, key: &SessionKey, text: &str) -> Result<SessionRecord> {
        let text = require_text("draft", text)?;
        self.apply(key, SessionCommand::SaveDraft { text, at: now_millis() }).await
    }

    pub async fn save_peer_notes(&self, key: &SessionKey, text: &str) -> Result<SessionRecord> {
        let text = require_text("peer notes", text)?;
        self.apply(key, SessionCommand::SavePeerNotes { text, at: now_millis() }).await
    }

    pub async fn submit_final_writing(
        &self,
        key: &SessionKey,
        text: &str,
    ) -> Result<SessionRecord> {
        let text = require_text("final writing", text)?;
        self.apply_and_mirror(key, SessionCommand::SubmitFinal { text, at: now_millis() })
            .await
    }

    pub async fn advance_to_peer_stage(&self, key: &SessionKey) -> Result<SessionRecord> {
        self.apply_and_mirror(key, SessionCommand::AdvanceToPeerStage).await
    }

    pub async fn advance_to_final_stage(&self, key: &SessionKey) -> Result<SessionRecord> {
        self.apply_and_mirror(key, SessionCommand::AdvanceToFinalStage).await
    }

    pub async fn regress_stage(&self, key: &SessionKey) -> Result<SessionRecord> {
        self.apply_and_mirror(key, SessionCommand::RegressStage).await
    }

    /// Administrative override to any stage in 1..=4.
    pub async fn jump_to_stage(&self, key: &SessionKey, target: i64) -> Result<SessionRecord> {
        let stage = stage::jump_target(target).ok_or_else(|| {
            ExerciseError::Validation(format!("stage must be between 1 and 4, got {target}"))
        })?;
        self.apply_and_mirror(key, SessionCommand::JumpToStage(stage)).await
    }

    // ── Partners and presence ──

    pub async fn set_partner(
        &self,
        key: &SessionKey,
        request: PartnerRequest,
    ) -> Result<SessionRecord> {
        self.pairing.set_partner(key, request).await
    }

    pub async fn clear_partner(&self, key: &SessionKey) -> Result<SessionRecord> {
        self.pairing.clear_partner(key).await
    }

    pub async fn touch_presence(&self, key: &SessionKey) -> Result<SessionRecord> {
        self.presence.touch(key).await
    }

    pub async fn leave_presence(
        &self,
        key: &SessionKey,
        user_id: Option<String>,
        user_name: Option<String>,
    ) -> Result<SessionRecord> {
        self.presence.leave(key, user_id, user_name).await
    }

    // ── Roster ──

    pub async fn roster_students(&self, force_reload: bool) -> Result<Arc<Roster>> {
        self.roster.fetch_roster_students(force_reload).await
    }

    /// Run the pairing pass over every student's canonical record.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let mut canonical: HashMap<String, Vec<SessionRecord>> = HashMap::new();
        for record in self.all_records().await? {
            canonical.entry(record.owner_key()).or_default().push(record);
        }

        let mut report = ReconcileReport::default();
        for records in canonical.into_values() {
            let Some(record) = pick_canonical(records) else {
                continue;
            };
            report.examined += 1;
            // Earlier passes may have touched this record.
            let fresh = match self.store.get(&record.session_key).await? {
                Some(fresh) => fresh,
                None => continue,
            };
            match self.pairing.ensure_roster_pairing(fresh).await {
                Ok((_, outcome)) if outcome.is_linked() => report.linked += 1,
                Ok((_, PairingOutcome::PartnerPending)) => report.pending += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(session_key = %record.session_key, error = %e, "reconcile pass failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            linked = report.linked,
            pending = report.pending,
            failed = report.failed,
            "roster reconciliation finished"
        );
        Ok(report)
    }

    /// Persist a new roster, drop cached state, and re-pair everyone.
    #[instrument(
        skip_all,
        fields(students = roster.students.len(), pairings = roster.pairings.len())
    )]
    pub async fn replace_roster(&self, roster: Roster) -> Result<ReconcileReport> {
        self.roster.source().replace(roster).await?;
        self.roster.invalidate();
        self.reconcile_all().await
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        let sessions = self.store.count().await?;
        let roster_students = self.roster.fetch_roster_students(false).await?.students.len();
        Ok(Diagnostics {
            sessions,
            storage_mode: self.store.describe(),
            roster_students,
        })
    }

    // ── Chat ──

    fn stream_for(record: &SessionRecord, channel: Channel) -> Result<ChatStreamId> {
        match channel {
            Channel::Ai => Ok(record.ai_chat_stream_id.clone()),
            Channel::Peer => record
                .peer_chat_stream_id
                .clone()
                .filter(|s| !s.is_blank())
                .ok_or_else(|| ExerciseError::Validation("session has no peer chat stream".into())),
        }
    }

    /// Append a message from the session owner to the session's stream.
    pub async fn post_chat(
        &self,
        key: &SessionKey,
        channel: Channel,
        role: MessageRole,
        text: &str,
    ) -> Result<ChatMessage> {
        let record = self.load(key).await?;
        let stream = Self::stream_for(&record, channel)?;
        let message = NewMessage {
            role,
            group: Some(record.group),
            ..NewMessage::from_user(record.owner.id.clone(), record.owner.name.clone(), text)
        };
        self.chat.post(&stream, channel, message).await
    }

    pub async fn chat_messages(
        &self,
        key: &SessionKey,
        channel: Channel,
        since: i64,
    ) -> Result<Vec<ChatMessage>> {
        let record = self.load(key).await?;
        let stream = Self::stream_for(&record, channel)?;
        self.chat.messages_since(&stream, channel, since).await
    }

    pub async fn chat_history(
        &self,
        key: &SessionKey,
        channel: Channel,
    ) -> Result<Vec<ChatMessage>> {
        let record = self.load(key).await?;
        let stream = Self::stream_for(&record, channel)?;
        self.chat.history(&stream, channel).await
    }
}
