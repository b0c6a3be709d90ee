// SPDX-License-Identifier: MIT

//! The presence state machine, driven once per poll tick for every
//! tracked Process. Pure decision logic lives here; the supervisor supplies
//! the token reading, the agent's last-post time, and the activity-detector
//! fallback, then applies the resulting writes (token watermark, presence,
//! audit).

use fray_core::{Invoke, Presence, TokenUsageWithModel};

/// Everything the state machine needs to decide one agent's next presence.
pub struct PresenceInputs<'a> {
    pub invoke: &'a Invoke,
    pub current: Presence,
    pub baseline_tokens: (u64, u64),
    pub last_seen_tokens: (u64, u64),
    pub last_seen_at_ms: u64,
    pub started_at_ms: u64,
    pub now_ms: u64,
    pub usage: Option<TokenUsageWithModel>,
    /// The agent's most recent authored message timestamp, if any (used for
    /// the "posted since spawn" / "posted since last idle-check" fallbacks).
    pub last_post_at_ms: Option<u64>,
    /// ActivityDetector's "saw stdout/stderr bytes recently" fallback, used
    /// only when transcript parsing is unavailable.
    pub activity_recently_seen: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceAction {
    /// No change in presence; token watermark may still need bumping.
    Hold,
    Transition(Presence),
    /// idle + hop, or idle + min_checkin done-detection: kill the process,
    /// but treat the resulting exit as a clean, resumable one.
    TerminateSoft,
    /// spawning/prompting/prompted/compacting stuck past spawn_timeout_ms.
    SpawnTimedOut,
}

pub struct PresenceDecision {
    pub action: PresenceAction,
    pub reason: &'static str,
    /// New cumulative (input, output) totals to persist as the token
    /// watermark, if the transcript was read successfully this tick.
    pub totals: Option<(u64, u64)>,
    /// True if this tick should reset the "last activity" clock (tokens
    /// moved, or in the active->idle fallback case, the agent posted).
    pub activity_seen: bool,
}

fn hold(reason: &'static str) -> PresenceDecision {
    PresenceDecision {
        action: PresenceAction::Hold,
        reason,
        totals: None,
        activity_seen: false,
    }
}

/// Decide the next presence for a busy (spawning/prompting/prompted/active/
/// compacting) process. Callers are expected to have already applied the
/// `max_runtime_ms` zombie check before calling this.
pub fn decide(inputs: &PresenceInputs<'_>) -> PresenceDecision {
    match inputs.current {
        Presence::Spawning | Presence::Prompting | Presence::Prompted | Presence::Compacting => {
            decide_spawning_family(inputs)
        }
        Presence::Active => decide_active(inputs),
        Presence::Idle => decide_idle(inputs),
        _ => hold("not a busy presence"),
    }
}

fn decide_spawning_family(inputs: &PresenceInputs<'_>) -> PresenceDecision {
    let Some(usage) = &inputs.usage else {
        return spawn_timeout_check(inputs, "transcript unavailable");
    };
    let totals = (usage.usage.input, usage.usage.output);
    let new_input = totals.0.saturating_sub(inputs.baseline_tokens.0);
    let new_output = totals.1.saturating_sub(inputs.baseline_tokens.1);

    if new_output > 0 {
        return PresenceDecision {
            action: PresenceAction::Transition(Presence::Prompted),
            reason: "new output tokens observed",
            totals: Some(totals),
            activity_seen: true,
        };
    }
    if new_input > 0 && inputs.current == Presence::Spawning {
        return PresenceDecision {
            action: PresenceAction::Transition(Presence::Prompting),
            reason: "new input tokens observed",
            totals: Some(totals),
            activity_seen: true,
        };
    }
    if inputs
        .last_post_at_ms
        .is_some_and(|posted| posted >= inputs.started_at_ms)
    {
        return PresenceDecision {
            action: PresenceAction::Transition(Presence::Active),
            reason: "agent posted since spawn",
            totals: Some(totals),
            activity_seen: true,
        };
    }
    spawn_timeout_check(inputs, "no activity yet")
}

fn spawn_timeout_check(inputs: &PresenceInputs<'_>, reason: &'static str) -> PresenceDecision {
    if inputs.current != Presence::Spawning {
        return PresenceDecision {
            action: PresenceAction::Hold,
            reason,
            totals: None,
            activity_seen: false,
        };
    }
    let elapsed = inputs.now_ms.saturating_sub(inputs.started_at_ms);
    if elapsed > inputs.invoke.spawn_timeout_ms {
        return PresenceDecision {
            action: PresenceAction::SpawnTimedOut,
            reason: "spawn_timeout_ms exceeded",
            totals: None,
            activity_seen: false,
        };
    }
    PresenceDecision {
        action: PresenceAction::Hold,
        reason,
        totals: None,
        activity_seen: false,
    }
}

fn decide_active(inputs: &PresenceInputs<'_>) -> PresenceDecision {
    let activity_since_last_check = match &inputs.usage {
        Some(usage) => {
            usage.usage.input != inputs.last_seen_tokens.0
                || usage.usage.output != inputs.last_seen_tokens.1
        }
        None => inputs.activity_recently_seen,
    };

    if activity_since_last_check {
        return PresenceDecision {
            action: PresenceAction::Hold,
            reason: "token or stdout activity this tick",
            totals: inputs.usage.as_ref().map(|u| (u.usage.input, u.usage.output)),
            activity_seen: true,
        };
    }

    let idle_for_ms = inputs.now_ms.saturating_sub(inputs.last_seen_at_ms);
    if idle_for_ms >= inputs.invoke.idle_after_ms {
        return PresenceDecision {
            action: PresenceAction::Transition(Presence::Idle),
            reason: "no input/output movement within idle_after_ms",
            totals: inputs.usage.as_ref().map(|u| (u.usage.input, u.usage.output)),
            activity_seen: false,
        };
    }

    hold("still within idle_after_ms window")
}

fn decide_idle(inputs: &PresenceInputs<'_>) -> PresenceDecision {
    if inputs.invoke.min_checkin_ms == 0 {
        return hold("min_checkin_ms disabled");
    }
    let reference = [
        inputs.last_post_at_ms,
        Some(inputs.last_seen_at_ms),
        Some(inputs.started_at_ms),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(inputs.started_at_ms);

    if inputs.now_ms.saturating_sub(reference) >= inputs.invoke.min_checkin_ms {
        return PresenceDecision {
            action: PresenceAction::TerminateSoft,
            reason: "done-detection: no check-in within min_checkin_ms",
            totals: None,
            activity_seen: false,
        };
    }
    hold("within min_checkin_ms window")
}
