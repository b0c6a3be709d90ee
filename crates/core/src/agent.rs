// SPDX-License-Identifier: MIT

//! Agent identity, configuration, and presence.

use crate::id::AgentId;
use crate::session::SessionMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How a driver should deliver the wake prompt to the underlying CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDelivery {
    Args,
    Stdin,
    TempFile,
}

/// Per-agent invocation configuration: which driver to use and its timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoke {
    pub driver: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
    /// `None` leaves the choice to the driver's own default (Opencode
    /// defaults to a temp file, everything else to an argument).
    #[serde(default)]
    pub prompt_delivery: Option<PromptDelivery>,
    #[serde(default = "default_spawn_timeout_ms")]
    pub spawn_timeout_ms: u64,
    #[serde(default = "default_idle_after_ms")]
    pub idle_after_ms: u64,
    /// 0 disables the done-detection check.
    #[serde(default)]
    pub min_checkin_ms: u64,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_runtime_ms: u64,
}

fn default_spawn_timeout_ms() -> u64 {
    60_000
}
fn default_idle_after_ms() -> u64 {
    60_000
}

impl Invoke {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            model: None,
            config: HashMap::new(),
            prompt_delivery: None,
            spawn_timeout_ms: default_spawn_timeout_ms(),
            idle_after_ms: default_idle_after_ms(),
            min_checkin_ms: 0,
            max_runtime_ms: 0,
        }
    }
}

/// Presence state machine values. Transitions only via the rules the
/// supervisor implements; every transition is paired with a `PresenceAudit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Offline,
    Spawning,
    Prompting,
    Prompted,
    Active,
    Idle,
    Compacting,
    Brb,
    Error,
}

impl Presence {
    /// A process is tracked for the agent while in any of these states;
    /// if the process map disagrees, the presence is orphaned.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Presence::Spawning
                | Presence::Prompting
                | Presence::Prompted
                | Presence::Compacting
                | Presence::Active
        )
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Presence::Offline => "offline",
            Presence::Spawning => "spawning",
            Presence::Prompting => "prompting",
            Presence::Prompted => "prompted",
            Presence::Active => "active",
            Presence::Idle => "idle",
            Presence::Compacting => "compacting",
            Presence::Brb => "brb",
            Presence::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Token watermarks recorded the last time the supervisor observed usage
/// for an agent's current process, plus when that observation happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenWatermark {
    pub input: u64,
    pub output: u64,
    pub updated_at_ms: u64,
}

/// The persistent record of a managed or unmanaged participant.
///
/// Created by registration and mutated by commands and the supervisor;
/// never destroyed (invariant: agents are never removed, only retired).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub managed: bool,
    pub invoke: Option<Invoke>,
    pub presence: Presence,
    pub last_session_id: Option<String>,
    pub session_mode: Option<SessionMode>,
    pub mention_watermark: Option<String>,
    pub reaction_watermark: Option<u64>,
    pub tokens: TokenWatermark,
    pub last_heartbeat: Option<u64>,
    pub left_at: Option<u64>,
    /// Whether this agent may be woken automatically by a non-trusted
    /// sender's mention.
    pub wake_trust: bool,
}

impl Agent {
    pub fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            managed: false,
            invoke: None,
            presence: Presence::Offline,
            last_session_id: None,
            session_mode: None,
            mention_watermark: None,
            reaction_watermark: None,
            tokens: TokenWatermark::default(),
            last_heartbeat: None,
            left_at: None,
            wake_trust: false,
        }
    }

    pub fn managed(mut self, invoke: Invoke) -> Self {
        self.managed = true;
        self.invoke = Some(invoke);
        self
    }
}
