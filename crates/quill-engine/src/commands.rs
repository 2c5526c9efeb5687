//! Session mutations as explicit command values.
//!
//! Every write to a session record goes through one of these, applied by the
//! store to the freshly read record. Commands carry their own timestamps so
//! applying one is deterministic and can be compared against the input to
//! detect no-op writes.

use quill_core::roster::same_id;
use quill_core::{
    ChatStreamId, PartnerSnapshot, PresenceSnapshot, SessionRecord, Stage, WritingArtifact,
};
use quill_store::SessionMutation;

use crate::error::{ExerciseError, Result};
use crate::stage;

/// How the receiving side treats the partner's writing preview.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewPolicy {
    /// Take the preview carried by the snapshot.
    Replace,
    /// Keep whatever preview the record already holds for the same partner.
    KeepExisting,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    SubmitPrewriting { text: String, at: i64 },
    SaveDraft { text: String, at: i64 },
    SavePeerNotes { text: String, at: i64 },
    SubmitFinal { text: String, at: i64 },
    AdvanceToPeerStage,
    AdvanceToFinalStage,
    RegressStage,
    JumpToStage(Stage),
    AttachPartner(PartnerSnapshot),
    ClearPartner,
    LinkPartner {
        snapshot: PartnerSnapshot,
        preview: PreviewPolicy,
        partner_presence: PresenceSnapshot,
        peer_stream: Option<ChatStreamId>,
    },
    MirrorPartnerPresence {
        from_student: String,
        presence: PresenceSnapshot,
    },
    TouchPresence { at: i64 },
    LeavePresence {
        at: i64,
        id: Option<String>,
        name: Option<String>,
    },
}

/// Trim `text`, rejecting blank input.
pub fn require_text(field: &str, text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExerciseError::Validation(format!("{field} text is required")));
    }
    Ok(trimmed.to_string())
}

fn set_stage(record: &mut SessionRecord, next: Stage) {
    record.stage = next;
    record.presence.own.stage = next;
}

impl SessionMutation for SessionCommand {
    fn apply(&self, mut record: SessionRecord) -> SessionRecord {
        match self {
            Self::SubmitPrewriting { text, at } => {
                record.writing.prewriting = WritingArtifact::new(text.clone(), *at);
                let next = stage::after_prewriting(record.stage);
                set_stage(&mut record, next);
            }
            Self::SaveDraft { text, at } => {
                record.writing.draft = WritingArtifact::new(text.clone(), *at);
            }
            Self::SavePeerNotes { text, at } => {
                record.writing.notes = WritingArtifact::new(text.clone(), *at);
            }
            Self::SubmitFinal { text, at } => {
                record.writing.final_writing = WritingArtifact::new(text.clone(), *at);
                set_stage(&mut record, Stage::Final);
            }
            Self::AdvanceToPeerStage => {
                let next = stage::advance_to_peer(record.group, record.stage);
                set_stage(&mut record, next);
            }
            Self::AdvanceToFinalStage => set_stage(&mut record, Stage::Final),
            Self::RegressStage => {
                let next = stage::regress(record.group, record.stage);
                set_stage(&mut record, next);
            }
            Self::JumpToStage(target) => set_stage(&mut record, *target),
            Self::AttachPartner(snapshot) => {
                record.partner = Some(snapshot.clone());
            }
            Self::ClearPartner => {
                record.partner = None;
                record.presence.partner = None;
            }
            Self::LinkPartner {
                snapshot,
                preview,
                partner_presence,
                peer_stream,
            } => {
                let mut snapshot = snapshot.clone();
                if *preview == PreviewPolicy::KeepExisting {
                    snapshot.writing = record
                        .partner
                        .as_ref()
                        .filter(|p| same_id(&p.id, &snapshot.id))
                        .and_then(|p| p.writing.clone());
                }
                record.partner = Some(snapshot);
                record.presence.partner = Some(partner_presence.clone());
                if let Some(stream) = peer_stream {
                    if let Some(old) = record.peer_chat_stream_id.replace(stream.clone()) {
                        let known = record.retired_peer_streams.contains(&old);
                        if old != *stream && !old.is_blank() && !known {
                            record.retired_peer_streams.push(old);
                        }
                    }
                }
            }
            Self::MirrorPartnerPresence {
                from_student,
                presence,
            } => {
                if record.partner_is(from_student) {
                    record.presence.partner = Some(presence.clone());
                }
            }
            Self::TouchPresence { at } => {
                record.presence.own.online = true;
                record.presence.own.last_seen = *at;
                record.presence.own.stage = record.stage;
            }
            Self::LeavePresence { at, id, name } => {
                record.presence.own = PresenceSnapshot {
                    online: false,
                    last_seen: *at,
                    stage: record.stage,
                    id: id.clone(),
                    name: name.clone(),
                };
            }
        }
        record
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::SubmitPrewriting { .. } => "submit_prewriting",
            Self::SaveDraft { .. } => "save_draft",
            Self::SavePeerNotes { .. } => "save_peer_notes",
            Self::SubmitFinal { .. } => "submit_final",
            Self::AdvanceToPeerStage => "advance_to_peer_stage",
            Self::AdvanceToFinalStage => "advance_to_final_stage",
            Self::RegressStage => "regress_stage",
            Self::JumpToStage(_) => "jump_to_stage",
            Self::AttachPartner(_) => "attach_partner",
            Self::ClearPartner => "clear_partner",
            Self::LinkPartner { .. } => "link_partner",
            Self::MirrorPartnerPresence { .. } => "mirror_partner_presence",
            Self::TouchPresence { .. } => "touch_presence",
            Self::LeavePresence { .. } => "leave_presence",
        }
    }
}
