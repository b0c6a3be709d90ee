// SPDX-License-Identifier: MIT

//! The supervisor: the poll loop that ties mention dispatch,
//! spawning, the presence state machine, and exit handling
//! to a live [`Store`], [`DriverRegistry`], and process table. Every
//! pure decision lives in a sibling module (`dispatch`, `presence`, `exit`,
//! `mentions`); this module is the I/O glue around them.

use crate::debouncer::Debouncer;
use crate::dispatch::{self, Decision, DispatchInputs, GateResult, Interrupt, SenderAuthorization};
use crate::exit::{self, ExitObservation, ExitOutcome};
use crate::mentions;
use crate::presence::{self, PresenceAction, PresenceInputs};
use crate::state::{RuntimeMeta, SupervisorState};
use crate::wake_prompt::{self, IncludedMention};
use fray_adapters::{
    ActivityDetector, DriverRegistry, Process, SpawnMode, SpawnRequest, SpawnTrigger, TokenCache,
    TranscriptReader,
};
use fray_core::{
    Agent, AgentId, Clock, Home, Invoke, Message, MessageId, MessageType, Presence as AgentPresence,
    PresenceAudit, SessionEnd, SessionMode, SessionStart, TokenWatermark, UsageSnapshot,
};
use fray_store::{AmbiguityQuery, AmbiguityRouter, RepairQuery, RepairStep, Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Tunables the daemon wires in from config.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    /// Minimum spacing between spawns, across all agents.
    pub spawn_rate_limit_ms: u64,
    /// How long to wait on a driver's asynchronously-discovered session id
    /// before continuing regardless.
    pub session_id_ready_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            spawn_rate_limit_ms: 500,
            session_id_ready_timeout: Duration::from_secs(5),
        }
    }
}

struct Inner<ST, AR> {
    store: Arc<ST>,
    router: Arc<AR>,
    repair: Arc<dyn RepairStep>,
    drivers: Arc<DriverRegistry>,
    transcripts: Arc<dyn TranscriptReader>,
    token_cache: Arc<TokenCache>,
    clock: Arc<dyn Clock>,
    state: Arc<SupervisorState>,
    debouncer: Arc<Debouncer>,
    started_at_ms: u64,
    config: SupervisorConfig,
    stop: CancellationToken,
}

/// Mention dispatch, spawning, presence, and exit handling, all wired to a
/// live Store/DriverRegistry/process table. Cheap to clone: every
/// clone shares the same inner state, so a monitor task can hold its own
/// handle back into the supervisor that spawned it.
pub struct Supervisor<ST, AR> {
    inner: Arc<Inner<ST, AR>>,
}

impl<ST, AR> Clone for Supervisor<ST, AR> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<ST, AR> Supervisor<ST, AR>
where
    ST: Store + 'static,
    AR: AmbiguityRouter + 'static,
{
    pub fn new(
        store: Arc<ST>,
        router: Arc<AR>,
        drivers: Arc<DriverRegistry>,
        transcripts: Arc<dyn TranscriptReader>,
        clock: Arc<dyn Clock>,
        config: SupervisorConfig,
    ) -> Self {
        Self::with_repair(
            store,
            router,
            Arc::new(fray_store::NoRepair),
            drivers,
            transcripts,
            clock,
            config,
        )
    }

    /// Same as [`Self::new`], but with an explicit repair step instead of
    /// the no-op default.
    pub fn with_repair(
        store: Arc<ST>,
        router: Arc<AR>,
        repair: Arc<dyn RepairStep>,
        drivers: Arc<DriverRegistry>,
        transcripts: Arc<dyn TranscriptReader>,
        clock: Arc<dyn Clock>,
        config: SupervisorConfig,
    ) -> Self {
        let started_at_ms = clock.now_ms();
        let token_cache = Arc::new(TokenCache::new(clock.clone()));
        Self {
            inner: Arc::new(Inner {
                store,
                router,
                repair,
                drivers,
                transcripts,
                token_cache,
                clock,
                state: Arc::new(SupervisorState::new()),
                debouncer: Arc::new(Debouncer::new()),
                started_at_ms,
                config,
                stop: CancellationToken::new(),
            }),
        }
    }

    /// Signals the poll loop and every live monitor to wind down.
    pub fn stop(&self) {
        self.inner.stop.cancel();
    }

    pub fn state(&self) -> &Arc<SupervisorState> {
        &self.inner.state
    }

    /// Runs the poll loop until [`Self::stop`] is called.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.inner.config.poll_interval);
        loop {
            tokio::select! {
                _ = self.inner.stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "supervisor tick failed");
                    }
                }
            }
        }
    }

    /// Runs exactly one poll tick: orphan reconciliation,
    /// presence updates for every tracked process, then mention dispatch for
    /// every managed agent.
    pub async fn tick(&self) -> Result<(), StoreError> {
        self.inner.state.reset_poll_markers();

        let agents = self.inner.store.list_managed_agents().await?;
        self.reconcile_orphans(&agents).await?;

        for agent in &agents {
            self.update_presence_for_agent(agent).await?;
        }

        // Re-fetch: presence writes above may have changed what dispatch sees.
        let agents = self.inner.store.list_managed_agents().await?;
        for agent in &agents {
            self.dispatch_for_agent(agent).await?;
        }
        Ok(())
    }

    async fn apply_presence(
        &self,
        agent_id: &AgentId,
        prev: AgentPresence,
        next: AgentPresence,
        reason: &str,
        at_ms: u64,
    ) -> Result<(), StoreError> {
        let audit = PresenceAudit {
            agent_id: agent_id.clone(),
            prev,
            next,
            reason: reason.to_string(),
            actor: "supervisor".to_string(),
            at_ms,
        };
        self.inner.store.set_presence(agent_id, next, audit).await
    }

    /// An agent whose presence claims to be busy but has no tracked process
    /// is reset to idle.
    async fn reconcile_orphans(&self, agents: &[Agent]) -> Result<(), StoreError> {
        let now_ms = self.inner.clock.now_ms();
        for agent in agents {
            if agent.presence.is_busy() && !self.inner.state.has_process(&agent.agent_id) {
                self.apply_presence(
                    &agent.agent_id,
                    agent.presence,
                    AgentPresence::Idle,
                    "orphaned: no tracked process",
                    now_ms,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// One tick's worth of presence bookkeeping for a single tracked
    /// process: zombie check, token-based presence decision, and the
    /// writes it implies.
    async fn update_presence_for_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        if !agent.presence.is_busy() {
            return Ok(());
        }
        let Some(handle) = self.inner.state.process(&agent.agent_id) else {
            return Ok(());
        };
        let Some(meta) = self.inner.state.runtime_meta(&agent.agent_id) else {
            return Ok(());
        };
        let Some(invoke) = &agent.invoke else {
            return Ok(());
        };

        let now_ms = self.inner.clock.now_ms();

        if invoke.max_runtime_ms > 0
            && now_ms.saturating_sub(meta.started_at_ms) > invoke.max_runtime_ms
        {
            handle.kill();
            return Ok(());
        }

        let session_id = handle.session_id();
        let usage = session_id.as_deref().map(|session_id| {
            self.inner
                .token_cache
                .get_or_read(&handle.driver_name, session_id, || {
                    self.inner
                        .transcripts
                        .read(&handle.driver_name, session_id)
                        .unwrap_or_default()
                })
        });

        let last_post_at_ms = self.inner.store.last_post_at(&agent.agent_id).await?;

        let inputs = PresenceInputs {
            invoke,
            current: agent.presence,
            baseline_tokens: handle.baseline_tokens,
            last_seen_tokens: handle.last_seen_tokens(),
            last_seen_at_ms: meta.last_seen_at_ms(),
            started_at_ms: meta.started_at_ms,
            now_ms,
            usage,
            last_post_at_ms,
            activity_recently_seen: meta.activity.saw_recent_activity(invoke.idle_after_ms),
        };

        let decision = presence::decide(&inputs);

        if let Some(totals) = decision.totals {
            handle.record_tokens(totals.0, totals.1);
            self.inner
                .store
                .set_token_watermark(
                    &agent.agent_id,
                    TokenWatermark {
                        input: totals.0,
                        output: totals.1,
                        updated_at_ms: now_ms,
                    },
                )
                .await?;
        }
        if decision.activity_seen {
            meta.record_seen_at_ms(now_ms);
        }

        match decision.action {
            PresenceAction::Hold => {}
            PresenceAction::Transition(next) => {
                self.apply_presence(&agent.agent_id, agent.presence, next, decision.reason, now_ms)
                    .await?;
                // Hop sessions auto-terminate the moment they go idle.
                if next == AgentPresence::Idle
                    && handle.spawn_mode == fray_adapters::SpawnMode::Hop
                {
                    handle.kill();
                }
            }
            PresenceAction::TerminateSoft => {
                handle.kill();
            }
            PresenceAction::SpawnTimedOut => {
                self.apply_presence(
                    &agent.agent_id,
                    agent.presence,
                    AgentPresence::Error,
                    decision.reason,
                    now_ms,
                )
                .await?;
                handle.kill();
            }
        }
        Ok(())
    }

    /// Every fresh mention or reply for one agent, oldest first.
    async fn dispatch_for_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        let base = mentions::base_name(agent.agent_id.as_str()).to_string();

        let watermark = match self.inner.debouncer.watermark(&agent.agent_id) {
            Some(watermark) => Some(watermark),
            None => {
                let stored = agent
                    .mention_watermark
                    .as_ref()
                    .map(|s| MessageId::new(s.clone()));
                self.inner
                    .debouncer
                    .set_watermark(&agent.agent_id, stored.clone());
                stored
            }
        };

        let mentioning = self
            .inner
            .store
            .messages_mentioning(&base, watermark.as_ref(), 100)
            .await?;
        let replying = self
            .inner
            .store
            .messages_replying_to(&agent.agent_id, watermark.as_ref(), 100)
            .await?;

        let mut tagged: Vec<(Message, bool)> = mentioning.into_iter().map(|m| (m, false)).collect();
        for reply in replying {
            if let Some(existing) = tagged.iter_mut().find(|(m, _)| m.id == reply.id) {
                existing.1 = true;
            } else {
                tagged.push((reply, true));
            }
        }
        tagged.sort_by_key(|(m, _)| m.ts);

        for (message, is_reply_to_agent) in &tagged {
            self.dispatch_one(agent, &base, message, *is_reply_to_agent)
                .await?;
        }
        Ok(())
    }

    async fn dispatch_one(
        &self,
        agent: &Agent,
        base: &str,
        message: &Message,
        is_reply_to_agent: bool,
    ) -> Result<(), StoreError> {
        let match_kind = mentions::classify_match(&message.body, base, is_reply_to_agent);
        let mentions_all_broadcast = mentions::mentions_all_broadcast(&message.mentions);
        let already_replied = self
            .inner
            .store
            .has_replied(&agent.agent_id, &message.id)
            .await?;

        let sender_agent = self.inner.store.get_agent(&message.from_agent).await?;
        let has_wake_trust = sender_agent.as_ref().is_some_and(|a| a.wake_trust);
        let thread_owned_by_sender = match &message.home {
            Home::Thread(thread_id) => {
                let owner = self
                    .inner
                    .store
                    .get_thread(thread_id)
                    .await?
                    .and_then(|t| t.owner_agent);
                owner.as_ref() == Some(&message.from_agent)
            }
            Home::Room => false,
        };

        let now_ms = self.inner.clock.now_ms();
        let sender = SenderAuthorization {
            is_human: message.kind == MessageType::User,
            has_wake_trust,
            thread_owned_by_sender,
        };

        let inputs = DispatchInputs {
            message,
            target_agent_id: &agent.agent_id,
            match_kind,
            mentions_all_broadcast,
            supervisor_start_ms: self.inner.started_at_ms,
            already_replied,
            sender,
            has_process: self.inner.state.has_process(&agent.agent_id),
            spawn_issued_this_poll: self.inner.state.spawn_issued_this_poll(&agent.agent_id),
            spawn_in_progress: self.inner.state.is_spawning(&agent.agent_id),
            active_by_tokens: agent.presence == AgentPresence::Active,
            presence_is_busy: agent.presence.is_busy(),
            presence_is_error: agent.presence == AgentPresence::Error,
            cooldown_active: self.inner.state.cooldown_active(&agent.agent_id, now_ms),
        };

        let decision = match dispatch::classify(&inputs) {
            GateResult::Decided(decision) => decision,
            GateResult::ConsultRouter => {
                let thread = match &message.home {
                    Home::Thread(id) => Some(id),
                    Home::Room => None,
                };
                let verdict = self
                    .inner
                    .router
                    .route(AmbiguityQuery {
                        body: &message.body,
                        sender: &message.from_agent,
                        target: &agent.agent_id,
                        thread,
                    })
                    .await;
                dispatch::resolve_after_router(&inputs, verdict.should_spawn)
            }
        };

        self.apply_dispatch_decision(agent, message, decision).await
    }

    async fn apply_dispatch_decision(
        &self,
        agent: &Agent,
        message: &Message,
        decision: Decision,
    ) -> Result<(), StoreError> {
        match decision {
            Decision::Skip {
                advance_watermark, ..
            } => {
                if advance_watermark {
                    self.advance_watermark(&agent.agent_id, &message.id).await?;
                }
            }
            Decision::Queue => {
                // The watermark must not advance past a queued-but-not-yet-
                // consumed mention (Invariant 4): it would be lost for good
                // on a daemon restart, and nothing would re-surface it once
                // the agent goes idle and cooldown clears. The next natural
                // spawn re-reads this message (it's still after the
                // watermark) and flushes it into that wake prompt instead.
                self.inner.debouncer.queue_mention(
                    &agent.agent_id,
                    message.id.clone(),
                    message.home.clone(),
                );
            }
            Decision::ResetOrphan => {
                let now_ms = self.inner.clock.now_ms();
                self.apply_presence(
                    &agent.agent_id,
                    agent.presence,
                    AgentPresence::Idle,
                    "orphaned: no tracked process",
                    now_ms,
                )
                .await?;
            }
            Decision::Spawn { interrupt } => {
                self.inner.state.mark_spawn_issued_this_poll(&agent.agent_id);
                self.advance_watermark(&agent.agent_id, &message.id).await?;
                self.spawn_agent(agent, message, interrupt).await?;
            }
        }
        Ok(())
    }

    async fn advance_watermark(&self, agent_id: &AgentId, msg_id: &MessageId) -> Result<(), StoreError> {
        self.inner.debouncer.set_watermark(agent_id, Some(msg_id.clone()));
        self.inner.store.set_mention_watermark(agent_id, msg_id.clone()).await
    }

    async fn wait_for_spawn_slot(&self) {
        let wait_ms = self
            .inner
            .config
            .spawn_rate_limit_ms
            .saturating_sub(self.inner.state.ms_since_last_spawn(self.inner.clock.now_ms()));
        if wait_ms > 0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
                _ = self.inner.stop.cancelled() => {}
            }
        }
    }

    /// Spawn (or interrupt-and-respawn) an agent on behalf of `trigger`.
    async fn spawn_agent(
        &self,
        agent: &Agent,
        trigger: &Message,
        interrupt: Option<Interrupt>,
    ) -> Result<(), StoreError> {
        let Some(invoke) = agent.invoke.clone() else {
            return Ok(());
        };

        self.wait_for_spawn_slot().await;

        let mut discard_session = false;
        if let Some(interrupt) = interrupt {
            if let Some(existing) = self.inner.state.process(&agent.agent_id) {
                existing.kill();
            }
            self.inner.state.clear_cooldown(&agent.agent_id);
            discard_session = interrupt.discard_session;
            if interrupt.no_respawn {
                return Ok(());
            }
        }

        let base = mentions::base_name(agent.agent_id.as_str());
        let fork_session = trigger.fork_sessions.get(base).cloned();
        let stored_session_id = if discard_session {
            None
        } else {
            agent.last_session_id.clone()
        };

        let (session_mode, last_session_id) = if let Some(session_id) = fork_session {
            (SessionMode::Fork(session_id.clone()), Some(session_id))
        } else if stored_session_id.is_none() {
            (SessionMode::New, None)
        } else {
            (SessionMode::Resume, stored_session_id)
        };

        let now_ms = self.inner.clock.now_ms();
        self.apply_presence(
            &agent.agent_id,
            agent.presence,
            AgentPresence::Spawning,
            "spawn requested",
            now_ms,
        )
        .await?;
        self.inner.state.mark_spawning(&agent.agent_id);
        self.inner.state.record_spawn_at(now_ms);

        let pending = self.inner.debouncer.flush_pending(&agent.agent_id);
        let mut included = vec![IncludedMention {
            msg_id: trigger.id.clone(),
            home: trigger.home.clone(),
        }];
        for (msg_id, home) in pending {
            if msg_id != trigger.id {
                included.push(IncludedMention { msg_id, home });
            }
        }
        let wake = wake_prompt::build(&agent.agent_id, &trigger.body, &included, None);

        self.launch(
            agent,
            &invoke,
            Some(trigger.id.clone()),
            trigger.home.label(),
            wake.prompt,
            wake.mode,
            session_mode,
            last_session_id,
        )
        .await
    }

    /// `respawn_brb`: a `/brb` exit respawns the agent with a clean
    /// session and no particular trigger message.
    async fn respawn_after_brb(&self, agent_id: &AgentId) {
        let agent = match self.inner.store.get_agent(agent_id).await {
            Ok(Some(agent)) => agent,
            _ => return,
        };
        let Some(invoke) = agent.invoke.clone() else {
            return;
        };

        self.wait_for_spawn_slot().await;
        let now_ms = self.inner.clock.now_ms();
        if self
            .apply_presence(
                agent_id,
                agent.presence,
                AgentPresence::Spawning,
                "brb respawn",
                now_ms,
            )
            .await
            .is_err()
        {
            return;
        }
        self.inner.state.mark_spawning(agent_id);
        self.inner.state.record_spawn_at(now_ms);

        let wake = wake_prompt::build(agent_id, "", &[], None);
        if let Err(err) = self
            .launch(
                &agent,
                &invoke,
                None,
                Home::Room.label(),
                wake.prompt,
                wake.mode,
                SessionMode::New,
                None,
            )
            .await
        {
            warn!(agent = %agent_id, error = %err, "brb respawn failed");
        }
    }

    /// Shared spawn mechanics: resolve the driver, launch the process, wait
    /// briefly for an async session id, capture the token baseline, persist
    /// the session-start record, register the process, and hand the running
    /// child off to a monitor task.
    async fn launch(
        &self,
        agent: &Agent,
        invoke: &Invoke,
        trigger_msg_id: Option<MessageId>,
        trigger_home: String,
        prompt: String,
        spawn_mode: SpawnMode,
        session_mode: SessionMode,
        last_session_id: Option<String>,
    ) -> Result<(), StoreError> {
        let now_ms = self.inner.clock.now_ms();

        let driver = match self.inner.drivers.get(&invoke.driver) {
            Ok(driver) => driver,
            Err(err) => {
                self.inner.state.clear_spawning(&agent.agent_id);
                self.apply_presence(
                    &agent.agent_id,
                    AgentPresence::Spawning,
                    AgentPresence::Error,
                    "unknown driver",
                    now_ms,
                )
                .await?;
                warn!(agent = %agent.agent_id, error = %err, "spawn failed: unknown driver");
                return Ok(());
            }
        };

        let cancel = CancellationToken::new();
        let request = SpawnRequest {
            agent_id: &agent.agent_id,
            invoke,
            prompt: &prompt,
            last_session_id: last_session_id.as_deref(),
            trigger: SpawnTrigger {
                msg_id: trigger_msg_id.clone().unwrap_or_else(|| MessageId::new("")),
                home: trigger_home,
            },
            cancel: cancel.clone(),
            spawn_mode,
        };

        let mut process = match driver.spawn(request).await {
            Ok(process) => process,
            Err(err) => {
                self.inner.state.clear_spawning(&agent.agent_id);
                self.apply_presence(
                    &agent.agent_id,
                    AgentPresence::Spawning,
                    AgentPresence::Error,
                    "driver spawn failed",
                    now_ms,
                )
                .await?;
                warn!(agent = %agent.agent_id, error = %err, "spawn failed");
                return Ok(());
            }
        };

        if let Some(ready) = process.session_id_ready.take() {
            let _ = tokio::time::timeout(self.inner.config.session_id_ready_timeout, ready).await;
        }

        let driver_name = driver.name().to_string();
        let session_id = process.session_id().or(last_session_id);

        let baseline = session_id
            .as_deref()
            .map(|session_id| {
                self.inner
                    .token_cache
                    .get_or_read(&driver_name, session_id, || {
                        self.inner
                            .transcripts
                            .read(&driver_name, session_id)
                            .unwrap_or_default()
                    })
            })
            .unwrap_or_default();
        process = process.with_baseline(baseline.usage.input, baseline.usage.output);

        self.inner
            .store
            .set_session(&agent.agent_id, session_id.clone(), Some(session_mode.clone()))
            .await?;
        self.inner
            .store
            .append_session_start(SessionStart {
                agent_id: agent.agent_id.clone(),
                session_id: session_id.clone(),
                session_mode: session_mode.to_string(),
                trigger_msg_id,
                started_at_ms: now_ms,
            })
            .await?;

        let activity = ActivityDetector::new(self.inner.clock.clone());
        let handle = process.handle();
        let generation = self.inner.state.register_process(agent.agent_id.clone(), handle);
        self.inner.state.set_runtime_meta(
            agent.agent_id.clone(),
            generation,
            RuntimeMeta::new(now_ms, activity),
        );
        self.inner.state.clear_spawning(&agent.agent_id);

        let supervisor = self.clone();
        let agent_id = agent.agent_id.clone();
        tokio::spawn(async move {
            supervisor
                .run_monitor(agent_id, generation, process, driver_name, cancel)
                .await;
        });

        Ok(())
    }

    /// Owns the running `Child` until it exits, then applies the
    /// exit-handling decision and releases the process from the state table.
    async fn run_monitor(
        &self,
        agent_id: AgentId,
        generation: u64,
        mut process: Process,
        driver_name: String,
        cancel: CancellationToken,
    ) {
        let pid = process.child.id();
        let kill_task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                if let Some(pid) = pid {
                    kill_pid(pid);
                }
            }
        });

        let activity = self.inner.state.runtime_meta(&agent_id).map(|m| m.activity.clone());
        let stdout_override = process.stdout_override.take();
        let raw_stdout = process.child.stdout.take();
        let raw_stderr = process.child.stderr.take();
        let stdout_buf = process.stdout.clone();
        let stderr_buf = process.stderr.clone();

        let stdout_task = if let Some(reader) = stdout_override {
            spawn_reader_drain(reader, move |bytes| stdout_buf.push(bytes), activity.clone())
        } else if let Some(reader) = raw_stdout {
            spawn_reader_drain(reader, move |bytes| stdout_buf.push(bytes), activity.clone())
        } else {
            tokio::spawn(async {})
        };
        let stderr_task = if let Some(reader) = raw_stderr {
            spawn_reader_drain(reader, move |bytes| stderr_buf.push(bytes), activity.clone())
        } else {
            tokio::spawn(async {})
        };

        let status = process.child.wait().await;
        kill_task.abort();
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        let ended_at_ms = self.inner.clock.now_ms();
        let started_at_ms = self
            .inner
            .state
            .runtime_meta(&agent_id)
            .map(|m| m.started_at_ms)
            .unwrap_or(ended_at_ms);
        let duration_ms = ended_at_ms.saturating_sub(started_at_ms);

        let (exit_code, signal_killed) = match &status {
            Ok(status) => (status.code(), status.code().is_none()),
            Err(_) => (None, true),
        };

        let is_current = self.inner.state.is_current(&agent_id, generation);
        let agent = self.inner.store.get_agent(&agent_id).await.ok().flatten();
        let presence_before = agent.map(|a| a.presence).unwrap_or(AgentPresence::Offline);
        let had_session_id = process.session_id().is_some();

        let outcome = exit::decide(&ExitObservation {
            exit_code,
            signal_killed,
            had_session_id,
            duration_ms,
            is_current,
            presence_before,
        });
        let respawn_brb = outcome.respawn_brb;

        if self.inner.state.mark_handled(&agent_id, generation) {
            self.apply_exit_outcome(
                &agent_id,
                &mut process,
                &driver_name,
                presence_before,
                outcome,
                exit_code,
                duration_ms,
                ended_at_ms,
            )
            .await;
        }

        if let Ok(driver) = self.inner.drivers.get(&driver_name) {
            driver.cleanup(&mut process).await;
        }

        self.inner.state.remove_process_if_current(&agent_id, generation);
        if let Some(session_id) = process.session_id() {
            self.inner.token_cache.invalidate(&driver_name, &session_id);
        }

        if respawn_brb {
            self.respawn_after_brb(&agent_id).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_exit_outcome(
        &self,
        agent_id: &AgentId,
        process: &mut Process,
        driver_name: &str,
        presence_before: AgentPresence,
        outcome: ExitOutcome,
        exit_code: Option<i32>,
        duration_ms: u64,
        ended_at_ms: u64,
    ) {
        if let Some(next) = outcome.next_presence {
            let _ = self
                .apply_presence(agent_id, presence_before, next, outcome.reason, ended_at_ms)
                .await;
        }
        if outcome.clear_session_id {
            let _ = self.inner.store.set_session(agent_id, None, None).await;
        }
        if let Some(cooldown_ms) = outcome.set_cooldown_ms {
            self.inner.state.set_cooldown_until(agent_id, ended_at_ms + cooldown_ms);
        }
        if outcome.set_left_at {
            let _ = self.inner.store.set_left_at(agent_id, Some(ended_at_ms)).await;
        }

        let session_id = process.session_id();
        let stderr_tail = if exit_code.is_some_and(|c| c != 0) {
            let tail = process.stderr.snapshot();
            if tail.is_empty() {
                None
            } else {
                Some(tail)
            }
        } else {
            None
        };

        let _ = self
            .inner
            .store
            .append_session_end(SessionEnd {
                agent_id: agent_id.clone(),
                session_id: session_id.clone(),
                exit_code,
                duration_ms,
                last_outgoing_msg_id: None,
                stderr_tail,
                ended_at_ms,
            })
            .await;

        if let Some(session_id) = &session_id {
            let usage = self
                .inner
                .token_cache
                .get_or_read(driver_name, session_id, || {
                    self.inner
                        .transcripts
                        .read(driver_name, session_id)
                        .unwrap_or_default()
                });
            let _ = self
                .inner
                .store
                .append_usage_snapshot(UsageSnapshot {
                    agent_id: agent_id.clone(),
                    session_id: Some(session_id.clone()),
                    usage: usage.usage,
                    model: usage.model,
                    captured_at_ms: ended_at_ms,
                })
                .await;
        }

        let stdout_tail = process.stdout.snapshot();
        if let Some(message) = self
            .inner
            .repair
            .repair(RepairQuery {
                agent_id,
                session_id: session_id.as_deref(),
                exit_code,
                stdout_tail: stdout_tail.as_str(),
            })
            .await
        {
            let _ = self.inner.store.create_message(message).await;
        }
    }
}

fn spawn_reader_drain<R>(
    mut reader: R,
    buffer: impl Fn(&[u8]) + Send + 'static,
    activity: Option<ActivityDetector>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    buffer(&buf[..n]);
                    if let Some(activity) = &activity {
                        activity.record_activity();
                    }
                }
            }
        }
    })
}

#[cfg(unix)]
fn kill_pid(pid: u32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_pid(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_adapters::{AlwaysFailsDriver, FakeDriver};
    use fray_core::{FakeClock, Invoke, MessageType};
    use fray_store::{FixedAmbiguityRouter, InMemoryStore};
    use std::collections::HashMap;

    fn supervisor_with(
        store: Arc<InMemoryStore>,
        router: FixedAmbiguityRouter,
        clock: Arc<FakeClock>,
    ) -> Supervisor<InMemoryStore, FixedAmbiguityRouter> {
        supervisor_with_repair(store, router, Arc::new(fray_store::NoRepair), clock)
    }

    fn supervisor_with_repair(
        store: Arc<InMemoryStore>,
        router: FixedAmbiguityRouter,
        repair: Arc<dyn fray_store::RepairStep>,
        clock: Arc<FakeClock>,
    ) -> Supervisor<InMemoryStore, FixedAmbiguityRouter> {
        let mut registry = DriverRegistry::new();
        registry.register(Box::new(FakeDriver::new("fake", "exit 0")));
        registry.register(Box::new(AlwaysFailsDriver("broken")));
        Supervisor::with_repair(
            store,
            Arc::new(router),
            repair,
            Arc::new(registry),
            Arc::new(NullTranscriptReader),
            clock.clone() as Arc<dyn Clock>,
            SupervisorConfig {
                poll_interval: Duration::from_millis(10),
                spawn_rate_limit_ms: 0,
                session_id_ready_timeout: Duration::from_millis(50),
            },
        )
    }

    struct NullTranscriptReader;
    impl TranscriptReader for NullTranscriptReader {
        fn read(
            &self,
            _driver: &str,
            _session_id: &str,
        ) -> Result<fray_core::TokenUsageWithModel, fray_adapters::TranscriptError> {
            Ok(fray_core::TokenUsage::default().with_model(None))
        }
        fn locate(&self, _driver: &str, _session_id: &str) -> Option<std::path::PathBuf> {
            None
        }
    }

    fn message(id: &str, from: &str, body: &str, mentions: &[&str], ts: u64) -> Message {
        Message {
            id: MessageId::new(id),
            ts,
            home: Home::Room,
            from_agent: AgentId::new(from),
            kind: MessageType::User,
            body: body.to_string(),
            mentions: mentions.iter().map(|s| s.to_string()).collect(),
            fork_sessions: HashMap::new(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn a_direct_address_spawns_the_agent_and_runs_to_completion() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_agent(Agent::new("alice").managed(Invoke::new("fake")));
        store.insert_message(message("m1", "bob", "@alice can you help", &["alice"], 1_000));

        let clock = Arc::new(FakeClock::new(1_000));
        let supervisor = supervisor_with(store.clone(), FixedAmbiguityRouter::never_spawn(), clock);

        supervisor.tick().await.unwrap();

        let agent = store.get_agent(&AgentId::new("alice")).await.unwrap().unwrap();
        assert_eq!(agent.presence, AgentPresence::Spawning);

        // Give the monitor task a moment to observe the fake process exit.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let agent = store.get_agent(&AgentId::new("alice")).await.unwrap().unwrap();
        assert_eq!(agent.presence, AgentPresence::Idle);
        assert_eq!(store.session_starts().len(), 1);
        assert_eq!(store.session_ends().len(), 1);
    }

    #[tokio::test]
    async fn an_fyi_message_never_spawns() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_agent(Agent::new("alice").managed(Invoke::new("fake")));
        store.insert_message(message("m1", "bob", "fyi @alice heads up", &["alice"], 1_000));

        let clock = Arc::new(FakeClock::new(1_000));
        let supervisor = supervisor_with(store.clone(), FixedAmbiguityRouter::never_spawn(), clock);
        supervisor.tick().await.unwrap();

        let agent = store.get_agent(&AgentId::new("alice")).await.unwrap().unwrap();
        assert_eq!(agent.presence, AgentPresence::Offline);
    }

    struct PostsWhateverStdoutSaid;

    #[async_trait::async_trait]
    impl fray_store::RepairStep for PostsWhateverStdoutSaid {
        async fn repair(&self, query: fray_store::RepairQuery<'_>) -> Option<Message> {
            let body = query.stdout_tail.trim();
            if body.is_empty() {
                return None;
            }
            Some(Message {
                id: MessageId::new("repaired-1"),
                ts: 0,
                home: Home::Room,
                from_agent: query.agent_id.clone(),
                kind: MessageType::Agent,
                body: body.to_string(),
                mentions: Vec::new(),
                fork_sessions: HashMap::new(),
                reply_to: None,
            })
        }
    }

    #[tokio::test]
    async fn repair_step_posts_a_message_from_captured_stdout() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_agent(Agent::new("alice").managed(Invoke::new("fake")));
        store.insert_message(message("m1", "bob", "@alice can you help", &["alice"], 1_000));

        let driver = FakeDriver::new("fake", "exit 0");
        driver.push_script("echo 'finished the task'; exit 0");
        let mut registry = DriverRegistry::new();
        registry.register(Box::new(driver));

        let clock = Arc::new(FakeClock::new(1_000));
        let supervisor: Supervisor<InMemoryStore, FixedAmbiguityRouter> = Supervisor::with_repair(
            store.clone(),
            Arc::new(FixedAmbiguityRouter::never_spawn()),
            Arc::new(PostsWhateverStdoutSaid),
            Arc::new(registry),
            Arc::new(NullTranscriptReader),
            clock.clone() as Arc<dyn Clock>,
            SupervisorConfig {
                poll_interval: Duration::from_millis(10),
                spawn_rate_limit_ms: 0,
                session_id_ready_timeout: Duration::from_millis(50),
            },
        );

        supervisor.tick().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let messages = store.messages();
        assert!(
            messages.iter().any(|m| m.id == MessageId::new("repaired-1")),
            "expected the repair step's message to have been posted"
        );
    }

    #[tokio::test]
    async fn unknown_driver_goes_to_error_without_panicking() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_agent(Agent::new("alice").managed(Invoke::new("no-such-driver")));
        store.insert_message(message("m1", "bob", "@alice can you help", &["alice"], 1_000));

        let clock = Arc::new(FakeClock::new(1_000));
        let supervisor = supervisor_with(store.clone(), FixedAmbiguityRouter::never_spawn(), clock);
        supervisor.tick().await.unwrap();

        let agent = store.get_agent(&AgentId::new("alice")).await.unwrap().unwrap();
        assert_eq!(agent.presence, AgentPresence::Error);
    }

    #[tokio::test]
    async fn orphaned_busy_presence_is_reconciled_to_idle() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_agent(Agent::new("alice").managed(Invoke::new("fake")));
        store
            .set_presence(
                &AgentId::new("alice"),
                AgentPresence::Active,
                PresenceAudit {
                    agent_id: AgentId::new("alice"),
                    prev: AgentPresence::Offline,
                    next: AgentPresence::Active,
                    reason: "test setup".to_string(),
                    actor: "test".to_string(),
                    at_ms: 0,
                },
            )
            .await
            .unwrap();

        let clock = Arc::new(FakeClock::new(1_000));
        let supervisor = supervisor_with(store.clone(), FixedAmbiguityRouter::never_spawn(), clock);
        supervisor.tick().await.unwrap();

        let agent = store.get_agent(&AgentId::new("alice")).await.unwrap().unwrap();
        assert_eq!(agent.presence, AgentPresence::Idle);
    }
}
