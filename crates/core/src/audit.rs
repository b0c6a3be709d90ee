// SPDX-License-Identifier: MIT

//! Append-only lifecycle records the supervisor emits to the Store.

use crate::agent::Presence;
use crate::id::{AgentId, MessageId};
use crate::usage::TokenUsage;
use serde::{Deserialize, Serialize};

/// Emitted when a process is registered for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStart {
    pub agent_id: AgentId,
    pub session_id: Option<String>,
    pub session_mode: String,
    pub trigger_msg_id: Option<MessageId>,
    pub started_at_ms: u64,
}

/// Emitted once per process exit, including for stale (superseded) processes
/// so the audit trail stays faithful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEnd {
    pub agent_id: AgentId,
    pub session_id: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub last_outgoing_msg_id: Option<MessageId>,
    /// Tail of stderr, populated only on non-zero exits.
    pub stderr_tail: Option<String>,
    pub ended_at_ms: u64,
}

/// Emitted on every presence transition the state machine makes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceAudit {
    pub agent_id: AgentId,
    pub prev: Presence,
    pub next: Presence,
    pub reason: String,
    pub actor: String,
    pub at_ms: u64,
}

/// A point-in-time usage capture, taken at exit so it survives transcript
/// rotation and daemon restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub agent_id: AgentId,
    pub session_id: Option<String>,
    pub usage: TokenUsage,
    pub model: Option<String>,
    pub captured_at_ms: u64,
}
