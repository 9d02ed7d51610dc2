//! Conversation memory for goalgetter
//!
//! This crate owns per-user conversation history: durable-when-possible
//! storage, automatic trimming with summarization, and sticky fallback to
//! transient in-process storage when the relational store is unreachable.

pub mod backend;
pub mod durable;
pub mod manager;
pub mod summarizer;
pub mod tokens;
pub mod transient;
pub mod trim;
pub mod types;

pub use backend::{BackendError, MemoryBackend};
pub use durable::DurableBackend;
pub use manager::{MemoryError, MemoryManager};
pub use summarizer::{LlmSummarizer, SummarizeError, Summarizer};
pub use transient::TransientBackend;
pub use trim::TrimPolicy;
pub use types::{ConversationSession, Message, Role};
