// SPDX-License-Identifier: MIT

//! Exit handling: runs once per Process, under the supervisor lock, whether
//! or not it is still the agent's current process. Pure decision logic; the
//! supervisor performs the actual Store writes and driver cleanup this
//! result implies.

use fray_core::Presence;

const RESUME_FAILURE_WINDOW_MS: u64 = 30_000;
pub const CLEAN_EXIT_COOLDOWN_MS: u64 = 30_000;

/// What happened to a Process, as observed by its monitor.
pub struct ExitObservation {
    pub exit_code: Option<i32>,
    /// True if the kernel/user killed it via signal rather than the
    /// process exiting on its own.
    pub signal_killed: bool,
    pub had_session_id: bool,
    pub duration_ms: u64,
    /// Whether this Process is still the agent's tracked one, or has been
    /// superseded by a newer spawn (still audited, but presence is left
    /// alone).
    pub is_current: bool,
    pub presence_before: Presence,
}

pub struct ExitOutcome {
    pub next_presence: Option<Presence>,
    pub reason: &'static str,
    pub clear_session_id: bool,
    pub set_cooldown_ms: Option<u64>,
    pub respawn_brb: bool,
    pub set_left_at: bool,
}

/// Decide the presence/session/cooldown consequences of one exit.
pub fn decide(observation: &ExitObservation) -> ExitOutcome {
    if !observation.is_current {
        return ExitOutcome {
            next_presence: None,
            reason: "superseded by a newer spawn",
            clear_session_id: false,
            set_cooldown_ms: None,
            respawn_brb: false,
            set_left_at: false,
        };
    }

    if observation.presence_before == Presence::Brb {
        return ExitOutcome {
            next_presence: Some(Presence::Idle),
            reason: "brb respawn",
            clear_session_id: true,
            set_cooldown_ms: None,
            respawn_brb: true,
            set_left_at: true,
        };
    }

    if observation.presence_before == Presence::Offline {
        return ExitOutcome {
            next_presence: None,
            reason: "explicit bye already recorded",
            clear_session_id: false,
            set_cooldown_ms: None,
            respawn_brb: false,
            set_left_at: true,
        };
    }

    if observation.signal_killed {
        return ExitOutcome {
            next_presence: Some(Presence::Idle),
            reason: "signal-killed, resumable",
            clear_session_id: false,
            set_cooldown_ms: None,
            respawn_brb: false,
            set_left_at: true,
        };
    }

    match observation.exit_code {
        Some(0) => ExitOutcome {
            next_presence: Some(Presence::Idle),
            reason: "clean exit",
            clear_session_id: false,
            set_cooldown_ms: Some(CLEAN_EXIT_COOLDOWN_MS),
            respawn_brb: false,
            set_left_at: true,
        },
        Some(code) if code != 0 => {
            if observation.had_session_id && observation.duration_ms < RESUME_FAILURE_WINDOW_MS {
                ExitOutcome {
                    next_presence: Some(Presence::Offline),
                    reason: "resume failure: fast non-zero exit with a session id",
                    clear_session_id: true,
                    set_cooldown_ms: None,
                    respawn_brb: false,
                    set_left_at: true,
                }
            } else {
                ExitOutcome {
                    next_presence: Some(Presence::Error),
                    reason: "non-zero exit, requires manual recovery",
                    clear_session_id: false,
                    set_cooldown_ms: None,
                    respawn_brb: false,
                    set_left_at: true,
                }
            }
        }
        _ => ExitOutcome {
            next_presence: Some(Presence::Idle),
            reason: "unknown exit status, treated as signal-equivalent",
            clear_session_id: false,
            set_cooldown_ms: None,
            respawn_brb: false,
            set_left_at: true,
        },
    }
}
