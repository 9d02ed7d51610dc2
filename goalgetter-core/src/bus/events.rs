//! Event types for the memory event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification published by the conversation memory subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemoryEvent {
    /// The durable store became unreachable; conversations are now served
    /// from transient storage for the rest of the process lifetime
    DegradedToTransient {
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A session exceeded the trim threshold and its history was reduced
    SessionTrimmed {
        user_id: String,
        dropped: usize,
        retained: usize,
        summarized: bool,
        timestamp: DateTime<Utc>,
    },
    /// Summarization failed and trimming fell back to truncation
    SummaryFallback {
        user_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl MemoryEvent {
    /// Create a degradation event
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::DegradedToTransient {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a trim event
    pub fn trimmed(user_id: impl Into<String>, dropped: usize, retained: usize, summarized: bool) -> Self {
        Self::SessionTrimmed {
            user_id: user_id.into(),
            dropped,
            retained,
            summarized,
            timestamp: Utc::now(),
        }
    }

    /// Create a summary-fallback event
    pub fn summary_fallback(user_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SummaryFallback {
            user_id: user_id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}
