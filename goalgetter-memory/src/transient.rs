//! Process-local volatile storage

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::backend::{BackendResult, MemoryBackend};
use crate::types::Message;

/// In-process conversation store, lost on restart
///
/// Serves as the fallback when the durable store is unreachable. State is
/// keyed by user id and lives for the process lifetime.
#[derive(Debug, Default)]
pub struct TransientBackend {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl TransientBackend {
    /// Create an empty transient store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently held
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl MemoryBackend for TransientBackend {
    async fn load(&self, user_id: &str) -> BackendResult<Vec<Message>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, user_id: &str, message: &Message) -> BackendResult<()> {
        self.sessions
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn replace(&self, user_id: &str, messages: &[Message]) -> BackendResult<()> {
        self.sessions
            .write()
            .await
            .insert(user_id.to_string(), messages.to_vec());
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> BackendResult<()> {
        self.sessions.write().await.remove(user_id);
        Ok(())
    }

    async fn flush(&self) -> BackendResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_user_is_empty() {
        let backend = TransientBackend::new();
        let messages = backend.load("nobody").await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_load_preserves_order() {
        let backend = TransientBackend::new();
        backend.append("u1", &Message::user("first")).await.unwrap();
        backend
            .append("u1", &Message::assistant("second"))
            .await
            .unwrap();

        let messages = backend.load("u1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let backend = TransientBackend::new();
        backend.append("u1", &Message::user("hi")).await.unwrap();

        assert!(backend.load("u2").await.unwrap().is_empty());
        assert_eq!(backend.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_replace_overwrites_history() {
        let backend = TransientBackend::new();
        backend.append("u1", &Message::user("old")).await.unwrap();

        let replacement = vec![Message::assistant("summary"), Message::user("recent")];
        backend.replace("u1", &replacement).await.unwrap();

        let messages = backend.load("u1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "summary");
    }

    #[tokio::test]
    async fn test_clear_removes_session() {
        let backend = TransientBackend::new();
        backend.append("u1", &Message::user("hi")).await.unwrap();
        backend.clear("u1").await.unwrap();

        assert!(backend.load("u1").await.unwrap().is_empty());
        assert_eq!(backend.session_count().await, 0);
    }
}
