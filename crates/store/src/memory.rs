// SPDX-License-Identifier: MIT

//! An in-memory [`Store`] implementation: used by the supervisor's test
//! suite and by `fray-cli`'s standalone mode (no daemon running).

use crate::error::StoreError;
use crate::store::Store;
use async_trait::async_trait;
use fray_core::{
    Agent, AgentId, Message, MessageId, Presence, PresenceAudit, SessionEnd, SessionMode,
    SessionStart, Thread, ThreadId, TokenWatermark, UsageSnapshot,
};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    agents: HashMap<AgentId, Agent>,
    messages: Vec<Message>,
    threads: HashMap<ThreadId, Thread>,
    audit: Vec<PresenceAudit>,
    session_starts: Vec<SessionStart>,
    session_ends: Vec<SessionEnd>,
    usage_snapshots: Vec<UsageSnapshot>,
}

/// A plain `RwLock`-guarded in-memory store. Good enough for deterministic
/// tests and for running the supervisor without a real log behind it.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_agent(&self, agent: Agent) {
        self.state.write().agents.insert(agent.agent_id.clone(), agent);
    }

    pub fn insert_thread(&self, thread: Thread) {
        self.state.write().threads.insert(thread.id.clone(), thread);
    }

    pub fn insert_message(&self, message: Message) {
        self.state.write().messages.push(message);
    }

    /// Audit records recorded so far, for test assertions.
    pub fn audit_log(&self) -> Vec<PresenceAudit> {
        self.state.read().audit.clone()
    }

    pub fn session_starts(&self) -> Vec<SessionStart> {
        self.state.read().session_starts.clone()
    }

    pub fn session_ends(&self) -> Vec<SessionEnd> {
        self.state.read().session_ends.clone()
    }

    pub fn usage_snapshots(&self) -> Vec<UsageSnapshot> {
        self.state.read().usage_snapshots.clone()
    }

    /// Every message inserted directly and every one appended via
    /// [`Store::create_message`] (e.g. by a repair step), in insertion order.
    pub fn messages(&self) -> Vec<Message> {
        self.state.read().messages.clone()
    }
}

fn base_name_of(agent_id: &AgentId) -> String {
    agent_id
        .as_str()
        .split_once('.')
        .map(|(base, _)| base.to_string())
        .unwrap_or_else(|| agent_id.as_str().to_string())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_managed_agents(&self) -> Result<Vec<Agent>, StoreError> {
        Ok(self
            .state
            .read()
            .agents
            .values()
            .filter(|a| a.managed)
            .cloned()
            .collect())
    }

    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, StoreError> {
        Ok(self.state.read().agents.get(agent_id).cloned())
    }

    async fn messages_mentioning(
        &self,
        base_name: &str,
        after: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read();
        let start = after
            .and_then(|id| state.messages.iter().position(|m| &m.id == id))
            .map(|pos| pos + 1)
            .unwrap_or(0);
        Ok(state.messages[start..]
            .iter()
            .filter(|m| m.mentions.iter().any(|mention| mention == base_name))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn messages_replying_to(
        &self,
        agent_id: &AgentId,
        after: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read();
        let start = after
            .and_then(|id| state.messages.iter().position(|m| &m.id == id))
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let authored: Vec<&MessageId> = state
            .messages
            .iter()
            .filter(|m| &m.from_agent == agent_id)
            .map(|m| &m.id)
            .collect();
        Ok(state.messages[start..]
            .iter()
            .filter(|m| {
                m.reply_to
                    .as_ref()
                    .is_some_and(|reply_to| authored.contains(&reply_to))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_thread(&self, thread_id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        Ok(self.state.read().threads.get(thread_id).cloned())
    }

    async fn has_replied(&self, agent_id: &AgentId, msg_id: &MessageId) -> Result<bool, StoreError> {
        Ok(self.state.read().messages.iter().any(|m| {
            &m.from_agent == agent_id && m.reply_to.as_ref() == Some(msg_id)
        }))
    }

    async fn last_post_at(&self, agent_id: &AgentId) -> Result<Option<u64>, StoreError> {
        Ok(self
            .state
            .read()
            .messages
            .iter()
            .filter(|m| &m.from_agent == agent_id)
            .map(|m| m.ts)
            .max())
    }

    async fn agent_bases(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .read()
            .agents
            .keys()
            .map(base_name_of)
            .collect())
    }

    async fn set_presence(
        &self,
        agent_id: &AgentId,
        presence: Presence,
        audit: PresenceAudit,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if let Some(agent) = state.agents.get_mut(agent_id) {
            agent.presence = presence;
        }
        state.audit.push(audit);
        Ok(())
    }

    async fn set_session(
        &self,
        agent_id: &AgentId,
        session_id: Option<String>,
        session_mode: Option<SessionMode>,
    ) -> Result<(), StoreError> {
        if let Some(agent) = self.state.write().agents.get_mut(agent_id) {
            agent.last_session_id = session_id;
            agent.session_mode = session_mode;
        }
        Ok(())
    }

    async fn set_token_watermark(
        &self,
        agent_id: &AgentId,
        watermark: TokenWatermark,
    ) -> Result<(), StoreError> {
        if let Some(agent) = self.state.write().agents.get_mut(agent_id) {
            agent.tokens = watermark;
        }
        Ok(())
    }

    async fn set_mention_watermark(
        &self,
        agent_id: &AgentId,
        msg_id: MessageId,
    ) -> Result<(), StoreError> {
        if let Some(agent) = self.state.write().agents.get_mut(agent_id) {
            agent.mention_watermark = Some(msg_id.to_string());
        }
        Ok(())
    }

    async fn set_reaction_watermark(
        &self,
        agent_id: &AgentId,
        ts_ms: u64,
    ) -> Result<(), StoreError> {
        if let Some(agent) = self.state.write().agents.get_mut(agent_id) {
            agent.reaction_watermark = Some(ts_ms);
        }
        Ok(())
    }

    async fn set_left_at(&self, agent_id: &AgentId, ts_ms: Option<u64>) -> Result<(), StoreError> {
        if let Some(agent) = self.state.write().agents.get_mut(agent_id) {
            agent.left_at = ts_ms;
        }
        Ok(())
    }

    async fn append_session_start(&self, event: SessionStart) -> Result<(), StoreError> {
        self.state.write().session_starts.push(event);
        Ok(())
    }

    async fn append_session_end(&self, event: SessionEnd) -> Result<(), StoreError> {
        self.state.write().session_ends.push(event);
        Ok(())
    }

    async fn append_usage_snapshot(&self, snapshot: UsageSnapshot) -> Result<(), StoreError> {
        self.state.write().usage_snapshots.push(snapshot);
        Ok(())
    }

    async fn create_message(&self, message: Message) -> Result<(), StoreError> {
        self.state.write().messages.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_core::{Home, MessageType};

    fn msg(id: &str, from: &str, mentions: &[&str]) -> Message {
        Message {
            id: MessageId::new(id),
            ts: 0,
            home: Home::Room,
            from_agent: AgentId::new(from),
            kind: MessageType::User,
            body: "hi".to_string(),
            mentions: mentions.iter().map(|s| s.to_string()).collect(),
            fork_sessions: HashMap::new(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn mentions_are_filtered_and_bounded_by_watermark() {
        let store = InMemoryStore::new();
        store.insert_message(msg("m1", "bob", &["alice"]));
        store.insert_message(msg("m2", "bob", &["carol"]));
        store.insert_message(msg("m3", "bob", &["alice"]));

        let all = store
            .messages_mentioning("alice", None, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let after_first = store
            .messages_mentioning("alice", Some(&MessageId::new("m1")), 10)
            .await
            .unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].id, MessageId::new("m3"));
    }

    #[tokio::test]
    async fn managed_agents_excludes_unmanaged() {
        let store = InMemoryStore::new();
        store.insert_agent(Agent::new("alice").managed(fray_core::Invoke::new("claude")));
        store.insert_agent(Agent::new("bob"));

        let managed = store.list_managed_agents().await.unwrap();
        assert_eq!(managed.len(), 1);
        assert_eq!(managed[0].agent_id, AgentId::new("alice"));
    }

    #[tokio::test]
    async fn presence_write_updates_agent_and_appends_audit() {
        let store = InMemoryStore::new();
        store.insert_agent(Agent::new("alice").managed(fray_core::Invoke::new("claude")));

        let audit = PresenceAudit {
            agent_id: AgentId::new("alice"),
            prev: Presence::Offline,
            next: Presence::Spawning,
            reason: "mention".to_string(),
            actor: "supervisor".to_string(),
            at_ms: 1,
        };
        store
            .set_presence(&AgentId::new("alice"), Presence::Spawning, audit)
            .await
            .unwrap();

        let agent = store.get_agent(&AgentId::new("alice")).await.unwrap().unwrap();
        assert_eq!(agent.presence, Presence::Spawning);
        assert_eq!(store.audit_log().len(), 1);
    }
}
