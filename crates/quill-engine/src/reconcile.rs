//! Peer chat reconciliation.
//!
//! Before pairing each session writes peer messages to its own provisional
//! stream. When two sessions are linked they must end up on one stream that
//! holds the union of both histories, each message exactly once.

use std::collections::HashSet;
use std::sync::Arc;

use quill_core::{Channel, ChatMessage, ChatStreamId};
use quill_store::ChatLog;
use tracing::{debug, info};

use crate::error::Result;

/// Outcome of choosing the shared stream for a pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedStream {
    pub target: ChatStreamId,
    /// Streams whose messages must be copied into `target`.
    pub sources: Vec<ChatStreamId>,
    /// True when `target` was freshly created.
    pub minted: bool,
}

impl SharedStream {
    fn keep(target: ChatStreamId, sources: Vec<ChatStreamId>) -> Self {
        Self {
            target,
            sources,
            minted: false,
        }
    }
}

pub struct ChatReconciler {
    log: Arc<dyn ChatLog>,
}

fn usable(id: Option<&ChatStreamId>) -> Option<&ChatStreamId> {
    id.filter(|s| !s.is_blank())
}

fn identities(messages: &[ChatMessage]) -> HashSet<(i64, String, String)> {
    messages.iter().map(ChatMessage::identity).collect()
}

impl ChatReconciler {
    pub fn new(log: Arc<dyn ChatLog>) -> Self {
        Self { log }
    }

    /// Pick the stream both sessions will share.
    ///
    /// When both logs hold messages and one already contains every message of
    /// the other (a merge that was applied to only one side), the covering
    /// stream is kept instead of minting again.
    pub async fn determine_shared_stream(
        &self,
        a: Option<&ChatStreamId>,
        b: Option<&ChatStreamId>,
    ) -> Result<SharedStream> {
        let (a, b) = match (usable(a), usable(b)) {
            (None, None) => {
                return Ok(SharedStream {
                    target: ChatStreamId::new(),
                    sources: Vec::new(),
                    minted: true,
                })
            }
            (Some(only), None) | (None, Some(only)) => {
                return Ok(SharedStream::keep(only.clone(), Vec::new()))
            }
            (Some(a), Some(b)) if a == b => return Ok(SharedStream::keep(a.clone(), Vec::new())),
            (Some(a), Some(b)) => (a, b),
        };

        let a_log = self.log.read_all(a, Channel::Peer).await?;
        let b_log = self.log.read_all(b, Channel::Peer).await?;

        let shared = match (a_log.is_empty(), b_log.is_empty()) {
            (false, true) => SharedStream::keep(a.clone(), vec![b.clone()]),
            (true, false) => SharedStream::keep(b.clone(), vec![a.clone()]),
            (true, true) => {
                let (keep, drop) = if a.as_str() <= b.as_str() { (a, b) } else { (b, a) };
                SharedStream::keep(keep.clone(), vec![drop.clone()])
            }
            (false, false) => {
                let a_ids = identities(&a_log);
                let b_ids = identities(&b_log);
                if b_ids.is_subset(&a_ids) {
                    SharedStream::keep(a.clone(), vec![b.clone()])
                } else if a_ids.is_subset(&b_ids) {
                    SharedStream::keep(b.clone(), vec![a.clone()])
                } else {
                    SharedStream {
                        target: ChatStreamId::new(),
                        sources: vec![a.clone(), b.clone()],
                        minted: true,
                    }
                }
            }
        };

        debug!(
            target = %shared.target,
            sources = shared.sources.len(),
            minted = shared.minted,
            a_messages = a_log.len(),
            b_messages = b_log.len(),
            "merge sources selected"
        );
        Ok(shared)
    }

    /// Copy every message from `sources` missing in `target`, ordered by
    /// timestamp. Returns how many messages were appended.
    pub async fn merge_histories(
        &self,
        target: &ChatStreamId,
        sources: &[ChatStreamId],
    ) -> Result<usize> {
        let mut seen = identities(&self.log.read_all(target, Channel::Peer).await?);

        let mut incoming = Vec::new();
        for source in sources.iter().filter(|s| *s != target) {
            incoming.extend(self.log.read_all(source, Channel::Peer).await?);
        }
        // Stable: ties keep source order.
        incoming.sort_by_key(|m| m.ts);

        let mut appended = 0;
        for message in incoming {
            if seen.insert(message.identity()) {
                self.log.append(target, Channel::Peer, &message).await?;
                appended += 1;
            }
        }

        if appended > 0 {
            info!(target = %target, appended, "peer chat histories merged");
        }
        Ok(appended)
    }
}
