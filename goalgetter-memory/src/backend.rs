//! Storage backend abstraction

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Message;

/// Error type for backend operations
///
/// Backend errors never reach the manager's callers; the manager absorbs
/// them and degrades to transient storage.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("store unreachable: {0}")]
    Connectivity(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("stored data invalid: {0}")]
    Corrupt(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for per-user conversation history
///
/// Implementations keep each user's messages ordered, oldest first. A
/// session exists implicitly from its first `append`.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Load a user's messages, most-recent-last
    async fn load(&self, user_id: &str) -> BackendResult<Vec<Message>>;

    /// Append one message to a user's history
    async fn append(&self, user_id: &str, message: &Message) -> BackendResult<()>;

    /// Replace a user's history wholesale; used by trimming
    async fn replace(&self, user_id: &str, messages: &[Message]) -> BackendResult<()>;

    /// Remove a user's history entirely
    async fn clear(&self, user_id: &str) -> BackendResult<()>;

    /// Force a durable flush; volatile stores treat this as a no-op
    async fn flush(&self) -> BackendResult<()>;
}
