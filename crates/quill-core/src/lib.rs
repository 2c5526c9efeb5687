pub mod chat;
pub mod clock;
pub mod ids;
pub mod roster;
pub mod session;

pub use chat::{Channel, ChatMessage, MessageRole};
pub use clock::now_millis;
pub use ids::{ChatStreamId, SessionKey};
pub use roster::{PairingMember, Roster, RosterPairing, Student};
pub use session::{
    pick_canonical, Group, PartnerSnapshot, Presence, PresenceSnapshot, SessionRecord, Stage,
    Writing, WritingArtifact,
};
