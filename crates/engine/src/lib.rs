// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fray-engine: the supervisor's decision logic and poll loop. Pure
//! decisions (dispatch gating, presence transitions, exit handling, mention
//! matching, wake prompt assembly) live in their own modules so they can be
//! exercised without a live `Store`, `Driver`, or clock; `supervisor` is the
//! I/O glue that drives them against the real world.

pub mod debouncer;
pub mod dispatch;
pub mod error;
pub mod exit;
pub mod lock;
pub mod mentions;
pub mod presence;
pub mod state;
pub mod supervisor;
pub mod wake_prompt;

pub use debouncer::Debouncer;
pub use dispatch::{
    classify, resolve_after_router, parse_interrupt, DispatchInputs, Decision, GateResult,
    Interrupt, MatchKind, SenderAuthorization, COOLDOWN_MS, STALENESS_GATE_MS,
};
pub use error::SupervisorError;
pub use exit::{decide as decide_exit, ExitObservation, ExitOutcome, CLEAN_EXIT_COOLDOWN_MS};
pub use lock::{Lock, LockBody};
pub use mentions::{
    base_name, classify_match, leading_mentions, mentions_all_broadcast, BROADCAST_TOKEN,
};
pub use presence::{decide as decide_presence, PresenceAction, PresenceDecision, PresenceInputs};
pub use state::{RuntimeMeta, SupervisorState};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use wake_prompt::{build as build_wake_prompt, IncludedMention, WakePrompt};
