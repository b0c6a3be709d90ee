// SPDX-License-Identifier: MIT

//! A fixed-answer [`AmbiguityRouter`] for tests and for `fray-cli`'s
//! standalone mode, where no real routing model is wired up.

use crate::ambiguity::{AmbiguityDecision, AmbiguityQuery, AmbiguityRouter};
use async_trait::async_trait;

/// Always returns the same decision, regardless of the query. Constructing
/// one that always declines matches the "unavailable" default.
pub struct FixedAmbiguityRouter {
    decision: AmbiguityDecision,
}

impl FixedAmbiguityRouter {
    pub fn always_spawn() -> Self {
        Self {
            decision: AmbiguityDecision {
                should_spawn: true,
                confidence: 1.0,
            },
        }
    }

    pub fn never_spawn() -> Self {
        Self {
            decision: AmbiguityDecision::unavailable(),
        }
    }
}

#[async_trait]
impl AmbiguityRouter for FixedAmbiguityRouter {
    async fn route(&self, _query: AmbiguityQuery<'_>) -> AmbiguityDecision {
        self.decision
    }
}
