// SPDX-License-Identifier: MIT

//! The ambiguity router contract: consulted only for mentions that
//! are neither a direct address nor a reply-to-agent.

use async_trait::async_trait;
use fray_core::{AgentId, ThreadId};

/// Everything the router needs to judge one ambiguous mention.
pub struct AmbiguityQuery<'a> {
    pub body: &'a str,
    pub sender: &'a AgentId,
    pub target: &'a AgentId,
    pub thread: Option<&'a ThreadId>,
}

/// The router's verdict. `confidence` is informational only; `should_spawn`
/// is the binding decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbiguityDecision {
    pub should_spawn: bool,
    pub confidence: f64,
}

impl AmbiguityDecision {
    /// The decision used whenever the router itself is unavailable:
    /// unavailability is treated as "do not spawn".
    pub fn unavailable() -> Self {
        Self {
            should_spawn: false,
            confidence: 0.0,
        }
    }
}

/// Routes ambiguous mentions to a spawn/no-spawn decision. Never fails: an
/// implementation backed by a flaky external call must fold its own errors
/// into [`AmbiguityDecision::unavailable`] rather than propagate them, so the
/// supervisor's dispatch loop has one uniform path.
#[async_trait]
pub trait AmbiguityRouter: Send + Sync {
    async fn route(&self, query: AmbiguityQuery<'_>) -> AmbiguityDecision;
}
