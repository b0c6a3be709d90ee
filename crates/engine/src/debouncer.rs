// SPDX-License-Identifier: MIT

//! Per-agent mention watermark plus a deduped queue of pending mention ids
//!. The watermark itself is persisted by the Store; this structure
//! holds the supervisor's in-memory view plus messages queued for the next
//! spawn.

use fray_core::{AgentId, Home, MessageId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct AgentQueue {
    watermark: Option<MessageId>,
    pending: Vec<(MessageId, Home)>,
    queued: HashSet<MessageId>,
}

/// Tracks, per agent, the last-processed mention id and any mention ids
/// queued (deduped) while a spawn is in flight or coalescing.
#[derive(Default)]
pub struct Debouncer {
    agents: Mutex<HashMap<AgentId, AgentQueue>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watermark(&self, agent_id: &AgentId) -> Option<MessageId> {
        self.agents
            .lock()
            .get(agent_id)
            .and_then(|q| q.watermark.clone())
    }

    /// Seeds the in-memory watermark from the Store at startup.
    pub fn set_watermark(&self, agent_id: &AgentId, msg_id: Option<MessageId>) {
        self.agents.lock().entry(agent_id.clone()).or_default().watermark = msg_id;
    }

    /// Queue a mention id (and its home, for wake-prompt grouping) for
    /// `agent_id`, deduped against anything already pending.
    pub fn queue_mention(&self, agent_id: &AgentId, msg_id: MessageId, home: Home) {
        let mut agents = self.agents.lock();
        let queue = agents.entry(agent_id.clone()).or_default();
        if queue.queued.insert(msg_id.clone()) {
            queue.pending.push((msg_id, home));
        }
    }

    pub fn has_pending(&self, agent_id: &AgentId) -> bool {
        self.agents
            .lock()
            .get(agent_id)
            .is_some_and(|q| !q.pending.is_empty())
    }

    pub fn pending_count(&self, agent_id: &AgentId) -> usize {
        self.agents
            .lock()
            .get(agent_id)
            .map(|q| q.pending.len())
            .unwrap_or(0)
    }

    /// Drains and returns every pending (mention id, home) for `agent_id`, in
    /// queue order. Called exactly at spawn time so the flushed set is
    /// folded into the wake prompt.
    pub fn flush_pending(&self, agent_id: &AgentId) -> Vec<(MessageId, Home)> {
        let mut agents = self.agents.lock();
        let queue = agents.entry(agent_id.clone()).or_default();
        queue.queued.clear();
        std::mem::take(&mut queue.pending)
    }
}
