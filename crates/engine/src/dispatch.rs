// SPDX-License-Identifier: MIT

//! Mention dispatch classification: the ordered gate sequence that
//! decides, for one fresh mention-bearing message, whether to skip it,
//! queue it, or spawn the agent (possibly as an interrupt).
//!
//! Consulting the AmbiguityRouter requires I/O, so this module splits the
//! gate sequence in two: [`classify`] runs every synchronous gate and
//! either reaches a final [`Decision`] or returns
//! [`GateResult::ConsultRouter`]; the caller then awaits the router and
//! calls [`resolve_after_router`] to finish.

use fray_core::{AgentId, Message, MessageType};

pub const STALENESS_GATE_MS: u64 = 20 * 60 * 1000;
pub const COOLDOWN_MS: u64 = 30_000;

/// Parsed `!@agent` / `!!@agent` / trailing `!` interrupt syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    pub discard_session: bool,
    pub no_respawn: bool,
}

/// Detects a leading `!` or `!!` before the mention, and a trailing `!`.
/// Returns `None` if the body carries no interrupt marker.
pub fn parse_interrupt(body: &str) -> Option<Interrupt> {
    let trimmed = body.trim_start();
    let (marker, rest) = if let Some(rest) = trimmed.strip_prefix("!!") {
        ("!!", rest)
    } else if let Some(rest) = trimmed.strip_prefix('!') {
        ("!", rest)
    } else {
        return None;
    };
    if !rest.trim_start().starts_with('@') {
        return None;
    }
    let no_respawn = body.trim_end().ends_with('!') && body.trim_end().len() > marker.len();
    Some(Interrupt {
        discard_session: marker == "!!",
        no_respawn,
    })
}

fn is_fyi_pattern(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    let lower = lower.trim_start();
    lower.starts_with("fyi ") || lower.starts_with("cc ") || lower.starts_with("heads up ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// A direct `@agent` mention, addressed to this agent specifically.
    DirectAddress,
    /// A reply to a message this agent authored.
    ReplyToAgent,
    /// Neither: consult the AmbiguityRouter.
    Ambiguous,
}

pub struct SenderAuthorization {
    pub is_human: bool,
    /// True if the sender is a managed agent with wake-trust.
    pub has_wake_trust: bool,
    /// True if the message's thread (if any) is owned by the sender.
    pub thread_owned_by_sender: bool,
}

pub struct DispatchInputs<'a> {
    pub message: &'a Message,
    pub target_agent_id: &'a AgentId,
    pub match_kind: MatchKind,
    pub mentions_all_broadcast: bool,
    pub supervisor_start_ms: u64,
    pub already_replied: bool,
    pub sender: SenderAuthorization,
    pub has_process: bool,
    pub spawn_issued_this_poll: bool,
    pub spawn_in_progress: bool,
    pub active_by_tokens: bool,
    pub presence_is_busy: bool,
    pub presence_is_error: bool,
    pub cooldown_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip {
        reason: &'static str,
        advance_watermark: bool,
    },
    Queue,
    Spawn {
        interrupt: Option<Interrupt>,
    },
    /// No Process is tracked, yet presence claims to be busy: reset to idle
    /// without deciding this message further.
    ResetOrphan,
}

pub enum GateResult {
    Decided(Decision),
    ConsultRouter,
}

fn skip(reason: &'static str) -> GateResult {
    GateResult::Decided(Decision::Skip {
        reason,
        advance_watermark: true,
    })
}

/// Run every gate that does not require the AmbiguityRouter.
pub fn classify(inputs: &DispatchInputs<'_>) -> GateResult {
    // 1. Self-mention.
    if &inputs.message.from_agent == inputs.target_agent_id {
        return skip("self-mention");
    }

    // 2. @all-only, no direct address.
    if inputs.mentions_all_broadcast && inputs.match_kind != MatchKind::DirectAddress {
        return skip("broadcast-only mention");
    }

    // 4. Interrupt syntax short-circuits most later gates.
    if let Some(interrupt) = parse_interrupt(&inputs.message.body) {
        if !authorized(&inputs.sender, inputs.message) {
            return skip("interrupt sender not authorized");
        }
        return GateResult::Decided(Decision::Spawn {
            interrupt: Some(interrupt),
        });
    }

    // 3. Staleness gate.
    if inputs
        .supervisor_start_ms
        .saturating_sub(inputs.message.ts)
        > STALENESS_GATE_MS
    {
        return skip("predates supervisor start by more than 20 minutes");
    }

    // 5. Already-replied suppression.
    if matches!(inputs.match_kind, MatchKind::DirectAddress | MatchKind::ReplyToAgent)
        && inputs.already_replied
    {
        return skip("already replied to this message");
    }

    // 6. FYI pattern.
    if is_fyi_pattern(&inputs.message.body) {
        return skip("fyi/cc/heads-up pattern");
    }

    // 7. Ambiguous mention: defer to the router.
    if inputs.match_kind == MatchKind::Ambiguous {
        return GateResult::ConsultRouter;
    }

    finish(inputs, None)
}

/// Continue classification after the AmbiguityRouter has answered (only
/// called when `classify` returned `ConsultRouter`).
pub fn resolve_after_router(inputs: &DispatchInputs<'_>, should_spawn: bool) -> Decision {
    if !should_spawn {
        return Decision::Skip {
            reason: "ambiguity router declined",
            advance_watermark: true,
        };
    }
    match finish(inputs, None) {
        GateResult::Decided(decision) => decision,
        GateResult::ConsultRouter => unreachable!("router already consulted"),
    }
}

fn finish(inputs: &DispatchInputs<'_>, _unused: Option<()>) -> GateResult {
    // 8. Authorization.
    if !authorized(&inputs.sender, inputs.message) {
        return skip("sender not authorized to wake this agent");
    }

    // 9. Coalescence.
    if inputs.spawn_issued_this_poll
        || inputs.has_process
        || inputs.spawn_in_progress
        || inputs.active_by_tokens
    {
        return GateResult::Decided(Decision::Queue);
    }

    // 10. Orphan reset.
    if inputs.presence_is_busy && !inputs.has_process {
        return GateResult::Decided(Decision::ResetOrphan);
    }

    // 11. Cooldown.
    if inputs.cooldown_active {
        return GateResult::Decided(Decision::Skip {
            reason: "cooldown active after clean exit",
            advance_watermark: true,
        });
    }

    // 12. Error state.
    if inputs.presence_is_error {
        return GateResult::Decided(Decision::Skip {
            reason: "agent in error state, requires manual recovery",
            advance_watermark: false,
        });
    }

    GateResult::Decided(Decision::Spawn { interrupt: None })
}

fn authorized(sender: &SenderAuthorization, message: &Message) -> bool {
    if message.kind == MessageType::User {
        return sender.is_human;
    }
    sender.has_wake_trust || sender.thread_owned_by_sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_core::Home;

    fn message(from: &str, body: &str, ts: u64) -> Message {
        Message {
            id: fray_core::MessageId::new("m1"),
            ts,
            home: Home::Room,
            from_agent: AgentId::new(from),
            kind: MessageType::User,
            body: body.to_string(),
            mentions: vec!["alice".to_string()],
            fork_sessions: Default::default(),
            reply_to: None,
        }
    }

    fn base_inputs<'a>(message: &'a Message, agent: &'a AgentId) -> DispatchInputs<'a> {
        DispatchInputs {
            message,
            target_agent_id: agent,
            match_kind: MatchKind::DirectAddress,
            mentions_all_broadcast: false,
            supervisor_start_ms: 1_000_000,
            already_replied: false,
            sender: SenderAuthorization {
                is_human: true,
                has_wake_trust: false,
                thread_owned_by_sender: false,
            },
            has_process: false,
            spawn_issued_this_poll: false,
            spawn_in_progress: false,
            active_by_tokens: false,
            presence_is_busy: false,
            presence_is_error: false,
            cooldown_active: false,
        }
    }

    // A static is awkward here since AgentId isn't Copy; use a helper instead.
    fn agent_alice() -> AgentId {
        AgentId::new("alice")
    }

    #[test]
    fn self_mention_is_skipped() {
        let agent = agent_alice();
        let msg = message("alice", "@alice note to self", 1_000_000);
        let inputs = base_inputs(&msg, &agent);
        let result = classify(&inputs);
        assert!(matches!(
            result,
            GateResult::Decided(Decision::Skip { reason: "self-mention", .. })
        ));
    }

    #[test]
    fn stale_message_is_skipped() {
        let agent = agent_alice();
        let msg = message("bob", "@alice old news", 0);
        let inputs = base_inputs(&msg, &agent);
        let result = classify(&inputs);
        assert!(matches!(
            result,
            GateResult::Decided(Decision::Skip { .. })
        ));
    }

    #[test]
    fn fyi_pattern_is_skipped() {
        let agent = agent_alice();
        let msg = message("bob", "fyi @alice this happened", 1_000_000);
        let inputs = base_inputs(&msg, &agent);
        let result = classify(&inputs);
        assert!(matches!(
            result,
            GateResult::Decided(Decision::Skip { reason: "fyi/cc/heads-up pattern", .. })
        ));
    }

    #[test]
    fn direct_address_from_human_spawns() {
        let agent = agent_alice();
        let msg = message("bob", "@alice can you help", 1_000_000);
        let inputs = base_inputs(&msg, &agent);
        let result = classify(&inputs);
        assert!(matches!(
            result,
            GateResult::Decided(Decision::Spawn { interrupt: None })
        ));
    }

    #[test]
    fn agent_sender_without_wake_trust_is_unauthorized() {
        let agent = agent_alice();
        let mut msg = message("bob", "@alice can you help", 1_000_000);
        msg.kind = MessageType::Agent;
        let mut inputs = base_inputs(&msg, &agent);
        inputs.sender.is_human = false;
        let result = classify(&inputs);
        assert!(matches!(
            result,
            GateResult::Decided(Decision::Skip { reason: "sender not authorized to wake this agent", .. })
        ));
    }

    #[test]
    fn ambiguous_mention_defers_to_router() {
        let agent = agent_alice();
        let msg = message("bob", "maybe alice knows", 1_000_000);
        let mut inputs = base_inputs(&msg, &agent);
        inputs.match_kind = MatchKind::Ambiguous;
        let result = classify(&inputs);
        assert!(matches!(result, GateResult::ConsultRouter));

        let decision = resolve_after_router(&inputs, false);
        assert!(matches!(decision, Decision::Skip { reason: "ambiguity router declined", .. }));

        let decision = resolve_after_router(&inputs, true);
        assert!(matches!(decision, Decision::Spawn { interrupt: None }));
    }

    #[test]
    fn interrupt_bypasses_cooldown_and_error_state() {
        let agent = agent_alice();
        let msg = message("bob", "!@alice stop and look at this", 1_000_000);
        let mut inputs = base_inputs(&msg, &agent);
        inputs.cooldown_active = true;
        inputs.presence_is_error = true;
        let result = classify(&inputs);
        assert!(matches!(
            result,
            GateResult::Decided(Decision::Spawn {
                interrupt: Some(Interrupt { discard_session: false, no_respawn: false })
            })
        ));
    }

    #[test]
    fn double_bang_interrupt_discards_session() {
        let agent = agent_alice();
        let msg = message("bob", "!!@alice fresh start please", 1_000_000);
        let inputs = base_inputs(&msg, &agent);
        let result = classify(&inputs);
        assert!(matches!(
            result,
            GateResult::Decided(Decision::Spawn {
                interrupt: Some(Interrupt { discard_session: true, .. })
            })
        ));
    }

    #[test]
    fn trailing_bang_means_no_respawn() {
        let agent = agent_alice();
        let msg = message("bob", "!@alice stop!", 1_000_000);
        let inputs = base_inputs(&msg, &agent);
        let result = classify(&inputs);
        match result {
            GateResult::Decided(Decision::Spawn {
                interrupt: Some(Interrupt { no_respawn, .. }),
            }) => assert!(no_respawn),
            _ => panic!("expected a spawn-with-interrupt decision"),
        }
    }

    #[test]
    fn coalescence_queues_when_process_already_running() {
        let agent = agent_alice();
        let msg = message("bob", "@alice another thing", 1_000_000);
        let mut inputs = base_inputs(&msg, &agent);
        inputs.has_process = true;
        let result = classify(&inputs);
        assert!(matches!(result, GateResult::Decided(Decision::Queue)));
    }

    #[test]
    fn orphaned_busy_presence_is_reset() {
        let agent = agent_alice();
        let msg = message("bob", "@alice are you there", 1_000_000);
        let mut inputs = base_inputs(&msg, &agent);
        inputs.presence_is_busy = true;
        let result = classify(&inputs);
        assert!(matches!(result, GateResult::Decided(Decision::ResetOrphan)));
    }

    #[test]
    fn cooldown_skips_without_interrupt() {
        let agent = agent_alice();
        let msg = message("bob", "@alice go again", 1_000_000);
        let mut inputs = base_inputs(&msg, &agent);
        inputs.cooldown_active = true;
        let result = classify(&inputs);
        assert!(matches!(
            result,
            GateResult::Decided(Decision::Skip { reason: "cooldown active after clean exit", .. })
        ));
    }
}
