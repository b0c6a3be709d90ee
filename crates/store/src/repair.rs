// SPDX-License-Identifier: MIT

//! The repair step: an optional, external hook consulted once per exit,
//! after the session's stdout has been captured in full. It may decide to
//! post a synthesized message to the log on the agent's behalf - e.g. when
//! the CLI printed a useful answer but the agent itself never posted it.

use async_trait::async_trait;
use fray_core::{AgentId, Message};

/// Everything the repair step needs to judge one finished session.
pub struct RepairQuery<'a> {
    pub agent_id: &'a AgentId,
    pub session_id: Option<&'a str>,
    pub exit_code: Option<i32>,
    /// The tail of stdout captured by the process's ring buffer.
    pub stdout_tail: &'a str,
}

/// Inspects a finished session's captured stdout and optionally produces a
/// message to post on the agent's behalf. Never fails: an implementation
/// backed by a flaky external call must fold its own errors into `None`
/// rather than propagate them, matching `AmbiguityRouter`'s uniform path.
#[async_trait]
pub trait RepairStep: Send + Sync {
    async fn repair(&self, query: RepairQuery<'_>) -> Option<Message>;
}

/// The repair step used when none is configured: never posts anything.
pub struct NoRepair;

#[async_trait]
impl RepairStep for NoRepair {
    async fn repair(&self, _query: RepairQuery<'_>) -> Option<Message> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_repair_never_posts() {
        let agent_id = AgentId::new("alice");
        let step = NoRepair;
        let result = step
            .repair(RepairQuery {
                agent_id: &agent_id,
                session_id: Some("sess1"),
                exit_code: Some(0),
                stdout_tail: "looks done",
            })
            .await;
        assert!(result.is_none());
    }
}
