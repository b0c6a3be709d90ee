// SPDX-License-Identifier: MIT

//! Uniform token usage shape produced by every transcript adapter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cached: u64,
    pub context_limit: u64,
}

impl TokenUsage {
    pub fn with_model(self, model: Option<String>) -> TokenUsageWithModel {
        TokenUsageWithModel {
            usage: self,
            model,
        }
    }

    /// Percentage of the context window consumed by `input`, 0-100.
    pub fn context_percent(&self) -> f64 {
        if self.context_limit == 0 {
            return 0.0;
        }
        (self.input as f64 / self.context_limit as f64) * 100.0
    }
}

/// `TokenUsage` plus the model name it was attributed to, since the model
/// is carried alongside counts but isn't part of the arithmetic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsageWithModel {
    pub usage: TokenUsage,
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_percent_is_zero_when_limit_unknown() {
        let usage = TokenUsage {
            input: 500,
            ..Default::default()
        };
        assert_eq!(usage.context_percent(), 0.0);
    }

    #[test]
    fn context_percent_computes_ratio() {
        let usage = TokenUsage {
            input: 50_000,
            context_limit: 200_000,
            ..Default::default()
        };
        assert_eq!(usage.context_percent(), 25.0);
    }
}
