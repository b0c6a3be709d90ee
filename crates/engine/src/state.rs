// SPDX-License-Identifier: MIT

//! In-memory supervisor bookkeeping: the process map, the cooldown
//! map, the spawning set, and the per-process `handled` flag, all guarded
//! by a single `RwLock` per the concurrency model: readers use `read`,
//! mutators use `write`, and external I/O (Store, Driver, fs) is always
//! performed with the lock dropped.

use fray_adapters::{ActivityDetector, ProcessHandle};
use fray_core::AgentId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Wall-clock bookkeeping for one tracked process that doesn't fit on
/// [`ProcessHandle`] itself (whose `started_at`/`last_seen_at` are
/// monotonic `Instant`s, not comparable against a possibly-fake [`Clock`]).
/// Registered alongside the process handle at spawn time.
pub struct RuntimeMeta {
    pub started_at_ms: u64,
    pub activity: ActivityDetector,
    last_seen_at_ms: AtomicU64,
}

impl RuntimeMeta {
    pub fn new(started_at_ms: u64, activity: ActivityDetector) -> Self {
        Self {
            started_at_ms,
            activity,
            last_seen_at_ms: AtomicU64::new(started_at_ms),
        }
    }

    pub fn last_seen_at_ms(&self) -> u64 {
        self.last_seen_at_ms.load(Ordering::SeqCst)
    }

    pub fn record_seen_at_ms(&self, now_ms: u64) {
        self.last_seen_at_ms.store(now_ms, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Tracked {
    processes: HashMap<AgentId, ProcessHandle>,
    /// Generation counter per agent: bumped on every spawn so a monitor for
    /// a since-superseded process can tell it is no longer current.
    generation: HashMap<AgentId, u64>,
    meta: HashMap<AgentId, Arc<RuntimeMeta>>,
    handled: HashSet<(AgentId, u64)>,
    spawning: HashSet<AgentId>,
    cooldown_until_ms: HashMap<AgentId, u64>,
    spawn_issued_this_poll: HashSet<AgentId>,
}

/// All mutable state the poll loop, the monitors, and `handleExit` share.
#[derive(Default)]
pub struct SupervisorState {
    inner: RwLock<Tracked>,
    last_spawn_at_ms: std::sync::atomic::AtomicU64,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_process(&self, agent_id: &AgentId) -> bool {
        self.inner.read().processes.contains_key(agent_id)
    }

    pub fn process(&self, agent_id: &AgentId) -> Option<ProcessHandle> {
        self.inner.read().processes.get(agent_id).cloned()
    }

    pub fn tracked_agents(&self) -> Vec<AgentId> {
        self.inner.read().processes.keys().cloned().collect()
    }

    /// Registers a freshly spawned process as the agent's current one,
    /// returning the generation stamp the owning monitor must present to
    /// `handle_exit` to be considered "current".
    pub fn register_process(&self, agent_id: AgentId, handle: ProcessHandle) -> u64 {
        let mut state = self.inner.write();
        let generation = state.generation.entry(agent_id.clone()).or_insert(0);
        *generation += 1;
        let generation = *generation;
        state.processes.insert(agent_id, handle);
        generation
    }

    /// True if `generation` is still the current one for `agent_id` (i.e.
    /// this Process hasn't been superseded by a newer spawn).
    pub fn is_current(&self, agent_id: &AgentId, generation: u64) -> bool {
        self.inner
            .read()
            .generation
            .get(agent_id)
            .is_some_and(|g| *g == generation)
    }

    /// Removes the tracked process for `agent_id` iff `generation` is still
    /// current (a superseded process's removal is a no-op: the newer one
    /// owns the map entry now).
    pub fn remove_process_if_current(&self, agent_id: &AgentId, generation: u64) {
        let mut state = self.inner.write();
        if state.generation.get(agent_id).is_some_and(|g| *g == generation) {
            state.processes.remove(agent_id);
            state.meta.remove(agent_id);
        }
    }

    /// Attach wall-clock runtime metadata to the process just registered
    /// under `generation`. A no-op if that generation has already been
    /// superseded (the newer spawn's metadata wins).
    pub fn set_runtime_meta(&self, agent_id: AgentId, generation: u64, meta: RuntimeMeta) {
        let mut state = self.inner.write();
        if state.generation.get(&agent_id).is_some_and(|g| *g == generation) {
            state.meta.insert(agent_id, Arc::new(meta));
        }
    }

    pub fn runtime_meta(&self, agent_id: &AgentId) -> Option<Arc<RuntimeMeta>> {
        self.inner.read().meta.get(agent_id).cloned()
    }

    /// Idempotency guard for `handle_exit`: true if this is the
    /// first call for this (agent, generation) pair.
    pub fn mark_handled(&self, agent_id: &AgentId, generation: u64) -> bool {
        self.inner
            .write()
            .handled
            .insert((agent_id.clone(), generation))
    }

    pub fn mark_spawning(&self, agent_id: &AgentId) {
        self.inner.write().spawning.insert(agent_id.clone());
    }

    pub fn clear_spawning(&self, agent_id: &AgentId) {
        self.inner.write().spawning.remove(agent_id);
    }

    pub fn is_spawning(&self, agent_id: &AgentId) -> bool {
        self.inner.read().spawning.contains(agent_id)
    }

    pub fn mark_spawn_issued_this_poll(&self, agent_id: &AgentId) {
        self.inner
            .write()
            .spawn_issued_this_poll
            .insert(agent_id.clone());
    }

    pub fn spawn_issued_this_poll(&self, agent_id: &AgentId) -> bool {
        self.inner.read().spawn_issued_this_poll.contains(agent_id)
    }

    /// Clears the per-poll "already spawned" marker; called once at the
    /// start of each tick.
    pub fn reset_poll_markers(&self) {
        self.inner.write().spawn_issued_this_poll.clear();
    }

    pub fn set_cooldown_until(&self, agent_id: &AgentId, until_ms: u64) {
        self.inner
            .write()
            .cooldown_until_ms
            .insert(agent_id.clone(), until_ms);
    }

    pub fn clear_cooldown(&self, agent_id: &AgentId) {
        self.inner.write().cooldown_until_ms.remove(agent_id);
    }

    pub fn cooldown_active(&self, agent_id: &AgentId, now_ms: u64) -> bool {
        self.inner
            .read()
            .cooldown_until_ms
            .get(agent_id)
            .is_some_and(|until| now_ms < *until)
    }

    /// Milliseconds since any spawn was last issued, for the global 500ms
    /// spawn rate limit.
    pub fn ms_since_last_spawn(&self, now_ms: u64) -> u64 {
        let last = self
            .last_spawn_at_ms
            .load(std::sync::atomic::Ordering::SeqCst);
        now_ms.saturating_sub(last)
    }

    pub fn record_spawn_at(&self, now_ms: u64) {
        self.last_spawn_at_ms
            .store(now_ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_adapters::{Process, SpawnMode};
    use tokio_util::sync::CancellationToken;

    fn handle() -> ProcessHandle {
        // A Process needs a real Child to build a handle from; use `sh -c
        // true` started and immediately handed to the handle (the handle
        // itself never touches `child`).
        let child = std::process::Command::new("sh")
            .arg("-c")
            .arg("true")
            .spawn()
            .map(tokio::process::Child::from_std)
            .unwrap()
            .unwrap();
        let process = Process::with_cancel(child, "fake", SpawnMode::Normal, CancellationToken::new());
        process.handle()
    }

    #[test]
    fn registering_a_process_bumps_generation_and_marks_current() {
        let state = SupervisorState::new();
        let agent = AgentId::new("alice");
        let gen1 = state.register_process(agent.clone(), handle());
        assert!(state.is_current(&agent, gen1));
        assert!(state.has_process(&agent));

        let gen2 = state.register_process(agent.clone(), handle());
        assert_ne!(gen1, gen2);
        assert!(!state.is_current(&agent, gen1), "superseded generation");
        assert!(state.is_current(&agent, gen2));
    }

    #[test]
    fn removing_a_stale_generation_is_a_no_op() {
        let state = SupervisorState::new();
        let agent = AgentId::new("alice");
        let gen1 = state.register_process(agent.clone(), handle());
        let _gen2 = state.register_process(agent.clone(), handle());

        state.remove_process_if_current(&agent, gen1);
        assert!(state.has_process(&agent), "gen2 process should remain tracked");
    }

    #[test]
    fn handled_flag_is_idempotent_per_generation() {
        let state = SupervisorState::new();
        let agent = AgentId::new("alice");
        assert!(state.mark_handled(&agent, 1));
        assert!(!state.mark_handled(&agent, 1));
        assert!(state.mark_handled(&agent, 2));
    }

    #[test]
    fn cooldown_expires_after_the_window() {
        let state = SupervisorState::new();
        let agent = AgentId::new("alice");
        state.set_cooldown_until(&agent, 30_000);
        assert!(state.cooldown_active(&agent, 10_000));
        assert!(!state.cooldown_active(&agent, 30_000));
    }
}
