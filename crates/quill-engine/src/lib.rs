//! Peer-pairing and cross-session consistency engine for the writing exercise.

pub mod chat;
pub mod commands;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod pairing;
pub mod presence;
pub mod reconcile;
pub mod roster;
pub mod stage;

pub use chat::{ChatService, NewMessage};
pub use commands::{PreviewPolicy, SessionCommand};
pub use engine::{Diagnostics, EngineConfig, ExerciseEngine, ReconcileReport, SessionSummary};
pub use error::{ExerciseError, Result};
pub use pairing::{PairingOutcome, PairingResolver, PartnerRequest};
pub use presence::PresenceMirror;
pub use reconcile::{ChatReconciler, SharedStream};
pub use roster::RosterDirectory;
