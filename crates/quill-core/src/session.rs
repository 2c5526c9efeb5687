use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::{ChatStreamId, SessionKey};
use crate::roster::{normalize_id, same_id, PairingMember, Student};

/// Exercise group. Decides which stage transitions are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    A,
    B,
    C,
}

impl Group {
    /// Group C skips the peer-notes stage.
    pub fn skips_peer_stage(self) -> bool {
        matches!(self, Self::C)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}

impl FromStr for Group {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            other => Err(format!("unknown group: {other}")),
        }
    }
}

/// Writing stage. Serialized as its number (1-4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    Prewriting = 1,
    Drafting = 2,
    PeerNotes = 3,
    Final = 4,
}

impl Stage {
    pub fn number(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;
    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Self::Prewriting),
            2 => Ok(Self::Drafting),
            3 => Ok(Self::PeerNotes),
            4 => Ok(Self::Final),
            other => Err(format!("stage out of range: {other}")),
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.number()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Text saved for one stage. `saved_at == 0` means never saved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WritingArtifact {
    pub text: String,
    pub saved_at: i64,
}

impl WritingArtifact {
    pub fn new(text: impl Into<String>, saved_at: i64) -> Self {
        Self {
            text: text.into(),
            saved_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Writing {
    pub prewriting: WritingArtifact,
    pub draft: WritingArtifact,
    pub notes: WritingArtifact,
    #[serde(rename = "final")]
    pub final_writing: WritingArtifact,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub online: bool,
    pub last_seen: i64,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PresenceSnapshot {
    pub fn online(stage: Stage, at: i64) -> Self {
        Self {
            online: true,
            last_seen: at,
            stage,
            id: None,
            name: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    #[serde(rename = "self")]
    pub own: PresenceSnapshot,
    #[serde(default)]
    pub partner: Option<PresenceSnapshot>,
}

/// What a session knows about its partner.
///
/// A snapshot without `session_key` is an offline placeholder: the roster
/// names the partner but they have not started a session yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub session_key: Option<SessionKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writing: Option<Writing>,
}

impl PartnerSnapshot {
    pub fn placeholder(member: &PairingMember) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            session_key: None,
            writing: None,
        }
    }

    /// Snapshot of `record`'s owner, optionally carrying their writing.
    pub fn of(record: &SessionRecord, with_writing: bool) -> Self {
        Self {
            id: record.owner.id.clone(),
            name: record.owner.name.clone(),
            session_key: Some(record.session_key.clone()),
            writing: with_writing.then(|| record.writing.clone()),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !self.session_key.as_ref().is_some_and(|k| !k.is_blank())
    }
}

/// One student's persisted progress through the exercise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_key: SessionKey,
    pub owner: Student,
    pub group: Group,
    pub stage: Stage,
    #[serde(default)]
    pub writing: Writing,
    #[serde(default)]
    pub partner: Option<PartnerSnapshot>,
    pub presence: Presence,
    #[serde(default)]
    pub peer_chat_stream_id: Option<ChatStreamId>,
    /// Provisional peer streams this record pointed at before a link moved it
    /// to the shared one. Late messages on them are folded in on later reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired_peer_streams: Vec<ChatStreamId>,
    pub ai_chat_stream_id: ChatStreamId,
    pub created_at: i64,
    pub updated_at: i64,
    /// Optimistic concurrency token, bumped by every store write.
    #[serde(default)]
    pub revision: u64,
}

impl SessionRecord {
    /// Fresh record at stage 1 with its own AI and provisional peer streams.
    pub fn new(owner: Student, group: Group, now: i64) -> Self {
        Self {
            session_key: SessionKey::new(),
            owner,
            group,
            stage: Stage::Prewriting,
            writing: Writing::default(),
            partner: None,
            presence: Presence {
                own: PresenceSnapshot::online(Stage::Prewriting, now),
                partner: None,
            },
            peer_chat_stream_id: Some(ChatStreamId::new()),
            retired_peer_streams: Vec::new(),
            ai_chat_stream_id: ChatStreamId::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn owner_key(&self) -> String {
        normalize_id(&self.owner.id)
    }

    pub fn belongs_to(&self, student_id: &str) -> bool {
        same_id(&self.owner.id, student_id)
    }

    /// True when the partner slot names `student_id`.
    pub fn partner_is(&self, student_id: &str) -> bool {
        self.partner
            .as_ref()
            .is_some_and(|p| same_id(&p.id, student_id))
    }

    fn recency(&self) -> (i64, i64, &SessionKey) {
        (self.updated_at, self.created_at, &self.session_key)
    }
}

/// Pick the authoritative record among duplicates for one student.
pub fn pick_canonical<I>(records: I) -> Option<SessionRecord>
where
    I: IntoIterator<Item = SessionRecord>,
{
    records.into_iter().max_by(|a, b| a.recency().cmp(&b.recency()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, created: i64, updated: i64) -> SessionRecord {
        let mut r = SessionRecord::new(Student::new(id, "Name"), Group::A, created);
        r.updated_at = updated;
        r
    }

    #[test]
    fn group_parses_loosely() {
        assert_eq!(" b ".parse::<Group>().unwrap(), Group::B);
        assert_eq!("c".parse::<Group>().unwrap(), Group::C);
        assert!("D".parse::<Group>().is_err());
    }

    #[test]
    fn stage_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Stage::PeerNotes).unwrap(), "3");
        let s: Stage = serde_json::from_str("4").unwrap();
        assert_eq!(s, Stage::Final);
        assert!(serde_json::from_str::<Stage>("5").is_err());
        assert!(serde_json::from_str::<Stage>("0").is_err());
    }

    #[test]
    fn new_record_starts_at_prewriting_with_own_streams() {
        let r = SessionRecord::new(Student::new("A1", "Alice"), Group::C, 1000);
        assert_eq!(r.stage, Stage::Prewriting);
        assert!(r.peer_chat_stream_id.is_some());
        assert_ne!(
            r.peer_chat_stream_id.as_ref().unwrap().as_str(),
            r.ai_chat_stream_id.as_str()
        );
        assert!(r.presence.own.online);
        assert!(r.partner.is_none());
    }

    #[test]
    fn wire_shape_uses_camel_case_and_self() {
        let r = SessionRecord::new(Student::new("A1", "Alice"), Group::A, 1000);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("sessionKey").is_some());
        assert!(json.get("peerChatStreamId").is_some());
        assert_eq!(json["presence"]["self"]["online"], true);
        assert!(json["writing"].get("final").is_some());
        assert_eq!(json["stage"], 1);
    }

    #[test]
    fn canonical_prefers_latest_update_then_creation() {
        let older = record("A1", 100, 500);
        let newer = record("A1", 50, 900);
        let picked = pick_canonical(vec![older.clone(), newer.clone()]).unwrap();
        assert_eq!(picked.session_key, newer.session_key);

        let early = record("A1", 100, 900);
        let late = record("A1", 200, 900);
        let picked = pick_canonical(vec![late.clone(), early]).unwrap();
        assert_eq!(picked.session_key, late.session_key);

        assert!(pick_canonical(Vec::new()).is_none());
    }

    #[test]
    fn placeholder_has_no_session_key() {
        let member = PairingMember {
            id: "A2".into(),
            name: "Bob".into(),
        };
        let snap = PartnerSnapshot::placeholder(&member);
        assert!(snap.is_placeholder());
        let full = PartnerSnapshot::of(&record("A2", 1, 1), false);
        assert!(!full.is_placeholder());
        assert!(full.writing.is_none());
    }

    #[test]
    fn partner_is_ignores_case() {
        let mut r = record("A1", 1, 1);
        r.partner = Some(PartnerSnapshot::placeholder(&PairingMember {
            id: "a2".into(),
            name: "Bob".into(),
        }));
        assert!(r.partner_is("A2"));
        assert!(!r.partner_is("A3"));
        assert!(r.belongs_to("a1"));
    }
}
