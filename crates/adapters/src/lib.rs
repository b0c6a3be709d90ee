// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fray-adapters: the driver abstraction over heterogeneous LLM CLIs, plus
//! the transcript-reading and process-liveness machinery the supervisor
//! needs to infer presence from something other than stdout.

pub mod activity;
pub mod buffer;
pub mod driver;
pub mod drivers;
pub mod process;
#[cfg(feature = "test-support")]
pub mod test_support;
pub mod token_cache;
pub mod transcript;
pub mod watcher;

pub use activity::ActivityDetector;
pub use buffer::{RingBuffer, StderrBuffer, StdoutBuffer};
pub use driver::{base_env, Driver, DriverError, DriverRegistry, SpawnRequest, SpawnTrigger};
pub use drivers::{ClaudeDriver, CodexDriver, OpencodeDriver};
pub use process::{Process, ProcessHandle, SessionIdSetter, SpawnMode};
#[cfg(feature = "test-support")]
pub use test_support::{AlwaysFailsDriver, FakeDriver};
pub use token_cache::TokenCache;
pub use transcript::{FilesystemTranscriptReader, TranscriptError, TranscriptReader};
pub use watcher::{TranscriptWatcher, UsageEvent};

/// A `DriverRegistry` pre-populated with the three families Fray ships
/// support for out of the box.
pub fn default_driver_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(Box::new(ClaudeDriver));
    registry.register(Box::new(CodexDriver));
    registry.register(Box::new(OpencodeDriver));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_all_three_families() {
        let registry = default_driver_registry();
        assert!(registry.get("claude").is_ok());
        assert!(registry.get("codex").is_ok());
        assert!(registry.get("opencode").is_ok());
    }
}
