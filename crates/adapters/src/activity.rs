// SPDX-License-Identifier: MIT

//! Process-level liveness fallback.
//!
//! Transcript parsing is the primary presence signal; `ActivityDetector`
//! only covers the fallback case where a CLI prints to stdout/stderr without
//! that activity showing up as new transcript tokens (e.g. progress dots).

use fray_core::Clock;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct State {
    last_activity_ms: u64,
}

/// Tracks the last time a process's stdout/stderr drainer observed any bytes.
#[derive(Clone)]
pub struct ActivityDetector {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl ActivityDetector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            state: Arc::new(Mutex::new(State {
                last_activity_ms: now,
            })),
            clock,
        }
    }

    /// Called by a stream drainer whenever it reads a non-empty chunk.
    pub fn record_activity(&self) {
        self.state.lock().last_activity_ms = self.clock.now_ms();
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.state.lock().last_activity_ms
    }

    /// Whether any bytes were seen within the last `window_ms`.
    pub fn saw_recent_activity(&self, window_ms: u64) -> bool {
        self.clock.now_ms().saturating_sub(self.last_activity_ms()) < window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_core::FakeClock;

    #[test]
    fn records_and_reports_recent_activity() {
        let clock = Arc::new(FakeClock::new(0));
        let detector = ActivityDetector::new(clock.clone());
        clock.advance_ms(10_000);
        assert!(!detector.saw_recent_activity(5_000));

        detector.record_activity();
        assert!(detector.saw_recent_activity(5_000));
    }

    #[test]
    fn activity_expires_after_window() {
        let clock = Arc::new(FakeClock::new(0));
        let detector = ActivityDetector::new(clock.clone());
        detector.record_activity();
        clock.advance_ms(6_000);
        assert!(!detector.saw_recent_activity(5_000));
    }
}
