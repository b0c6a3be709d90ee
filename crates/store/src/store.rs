// SPDX-License-Identifier: MIT

//! The Store contract: the supervisor's only window
//! onto the append-only message log and the agent registry that lives on
//! top of it. The real JSONL-log-plus-SQL-cache engine behind this trait is
//! out of scope; this crate only carries the interface the supervisor is
//! coded against.

use crate::error::StoreError;
use async_trait::async_trait;
use fray_core::{
    Agent, AgentId, Message, MessageId, Presence, PresenceAudit, SessionEnd, SessionMode,
    SessionStart, Thread, ThreadId, TokenWatermark, UsageSnapshot,
};

/// Read and write access to agents, messages, threads, and the audit trail
///. All writes are append-only at the log level; mutable agent
/// fields are projections the store maintains on top of that log.
#[async_trait]
pub trait Store: Send + Sync {
    // --- reads ---

    /// Every agent with `managed == true`.
    async fn list_managed_agents(&self) -> Result<Vec<Agent>, StoreError>;

    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, StoreError>;

    /// Messages whose `mentions` include `base_name`, posted after `after`
    /// (exclusive), oldest first, capped at `limit`.
    async fn messages_mentioning(
        &self,
        base_name: &str,
        after: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// Messages whose `reply_to` points at a message authored by `agent_id`,
    /// posted after `after` (exclusive), oldest first, capped at `limit`.
    async fn messages_replying_to(
        &self,
        agent_id: &AgentId,
        after: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    async fn get_thread(&self, thread_id: &ThreadId) -> Result<Option<Thread>, StoreError>;

    /// True if `agent_id` has already authored a message whose `reply_to`
    /// points at `msg_id` - an already-replied safety net against watermark
    /// regressions.
    async fn has_replied(&self, agent_id: &AgentId, msg_id: &MessageId) -> Result<bool, StoreError>;

    /// Timestamp of the agent's most recent authored message, if any.
    async fn last_post_at(&self, agent_id: &AgentId) -> Result<Option<u64>, StoreError>;

    /// Every known agent base name (an agent's id with any `.N` fork suffix
    /// stripped), used to extract `@mentions` from message bodies.
    async fn agent_bases(&self) -> Result<Vec<String>, StoreError>;

    // --- writes ---

    async fn set_presence(
        &self,
        agent_id: &AgentId,
        presence: Presence,
        audit: PresenceAudit,
    ) -> Result<(), StoreError>;

    async fn set_session(
        &self,
        agent_id: &AgentId,
        session_id: Option<String>,
        session_mode: Option<SessionMode>,
    ) -> Result<(), StoreError>;

    async fn set_token_watermark(
        &self,
        agent_id: &AgentId,
        watermark: TokenWatermark,
    ) -> Result<(), StoreError>;

    async fn set_mention_watermark(
        &self,
        agent_id: &AgentId,
        msg_id: MessageId,
    ) -> Result<(), StoreError>;

    async fn set_reaction_watermark(
        &self,
        agent_id: &AgentId,
        ts_ms: u64,
    ) -> Result<(), StoreError>;

    async fn set_left_at(&self, agent_id: &AgentId, ts_ms: Option<u64>) -> Result<(), StoreError>;

    async fn append_session_start(&self, event: SessionStart) -> Result<(), StoreError>;

    async fn append_session_end(&self, event: SessionEnd) -> Result<(), StoreError>;

    async fn append_usage_snapshot(&self, snapshot: UsageSnapshot) -> Result<(), StoreError>;

    /// Used to post synthetic repair output: a process that died without
    /// producing a final message gets one appended on its behalf.
    async fn create_message(&self, message: Message) -> Result<(), StoreError>;
}
