//! Token-budget trim planning

use goalgetter_core::config::schema::MemoryConfig;

use crate::types::{total_tokens, Message};

/// Decides when and where to cut a conversation's history.
///
/// A session over `threshold_tokens` is reduced to the longest suffix that
/// fits within the threshold minus a reserve kept for the synthetic summary
/// message. The most recent message is always retained, even when it alone
/// exceeds the budget.
#[derive(Debug, Clone)]
pub struct TrimPolicy {
    /// Cumulative token estimate that triggers a trim
    pub threshold_tokens: u64,
    /// Headroom kept for the summary message
    pub summary_reserve_tokens: u64,
}

impl TrimPolicy {
    pub fn new(threshold_tokens: u64, summary_reserve_tokens: u64) -> Self {
        Self {
            threshold_tokens,
            summary_reserve_tokens,
        }
    }

    /// Build a policy from configuration
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(
            u64::from(config.trim_threshold_tokens),
            u64::from(config.summary_reserve_tokens),
        )
    }

    /// Whether the sequence is over budget
    pub fn needs_trim(&self, messages: &[Message]) -> bool {
        total_tokens(messages) > self.threshold_tokens
    }

    /// Index of the first retained message, or `None` when no trim is needed.
    ///
    /// A result of `Some(0)` means everything fits once the newest message is
    /// forced in; callers treat it as a no-op.
    pub fn plan(&self, messages: &[Message]) -> Option<usize> {
        if !self.needs_trim(messages) {
            return None;
        }

        let budget = self
            .threshold_tokens
            .saturating_sub(self.summary_reserve_tokens);
        let mut kept_tokens = 0u64;
        let mut start = messages.len();

        for (idx, message) in messages.iter().enumerate().rev() {
            let cost = u64::from(message.token_estimate);
            // the newest message is kept unconditionally
            if start < messages.len() && kept_tokens + cost > budget {
                break;
            }
            kept_tokens += cost;
            start = idx;
        }

        Some(start)
    }
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}
