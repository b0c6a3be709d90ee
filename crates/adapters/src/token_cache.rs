// SPDX-License-Identifier: MIT

//! Short-lived cache over `TranscriptReader::read`: transcript files
//! can be large, and a single poll tick may ask for the same session's usage
//! from more than one caller, so reads within a short TTL are memoized.

use fray_core::{Clock, TokenUsageWithModel};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_TTL_MS: u64 = 250;

struct Entry {
    usage: TokenUsageWithModel,
    read_at_ms: u64,
}

/// Caches `(driver, session_id) -> TokenUsageWithModel` for `ttl_ms`.
pub struct TokenCache {
    entries: Mutex<HashMap<(String, String), Entry>>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl TokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, DEFAULT_TTL_MS)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            ttl_ms,
        }
    }

    /// Returns a cached value if one was stored within `ttl_ms`, else calls
    /// `read` and caches its result.
    pub fn get_or_read(
        &self,
        driver: &str,
        session_id: &str,
        read: impl FnOnce() -> TokenUsageWithModel,
    ) -> TokenUsageWithModel {
        let key = (driver.to_string(), session_id.to_string());
        let now = self.clock.now_ms();
        {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(&key) {
                if now.saturating_sub(entry.read_at_ms) < self.ttl_ms {
                    return entry.usage.clone();
                }
            }
        }
        let usage = read();
        self.entries.lock().insert(
            key,
            Entry {
                usage: usage.clone(),
                read_at_ms: now,
            },
        );
        usage
    }

    /// Drops a session's cached usage, e.g. when its process has exited.
    pub fn invalidate(&self, driver: &str, session_id: &str) {
        self.entries
            .lock()
            .remove(&(driver.to_string(), session_id.to_string()));
    }
}
