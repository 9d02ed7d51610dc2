//! Conversation memory manager
//!
//! Durable-when-possible, always-available storage of per-user conversation
//! history. Backend failures are absorbed: the manager degrades to the
//! transient store for the rest of its lifetime and reports it once, never
//! to the caller. Only invalid user ids surface as errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use goalgetter_core::bus::{EventBus, MemoryEvent};

use crate::backend::{BackendError, BackendResult, MemoryBackend};
use crate::durable::DurableBackend;
use crate::summarizer::Summarizer;
use crate::transient::TransientBackend;
use crate::trim::TrimPolicy;
use crate::types::{ConversationSession, Message};

const MAX_USER_ID_LEN: usize = 256;

/// Error surfaced to callers of the memory manager
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
}

pub type MemoryResult<T> = Result<T, MemoryError>;

/// Owns persistence of per-user conversation history
pub struct MemoryManager {
    durable: Option<Arc<dyn MemoryBackend>>,
    transient: Arc<TransientBackend>,
    degraded: AtomicBool,
    policy: TrimPolicy,
    summarizer: Option<Arc<dyn Summarizer>>,
    bus: Option<EventBus>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryManager {
    /// Create a manager over an optional durable store
    pub fn new(durable: Option<Arc<dyn MemoryBackend>>, policy: TrimPolicy) -> Self {
        Self {
            durable,
            transient: Arc::new(TransientBackend::new()),
            degraded: AtomicBool::new(false),
            policy,
            summarizer: None,
            bus: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a manager with no durable store
    pub fn transient_only(policy: TrimPolicy) -> Self {
        Self::new(None, policy)
    }

    /// Connect the durable store, degrading to transient-only on failure.
    ///
    /// Apply after `with_event_bus` so a startup failure is published like
    /// any other degradation. The failure is not retried for the lifetime
    /// of this manager.
    pub async fn connect_durable(mut self, url: &str) -> Self {
        match DurableBackend::connect(url).await {
            Ok(backend) => {
                self.durable = Some(Arc::new(backend));
            }
            Err(err) => {
                self.degrade("connect", &err);
            }
        }
        self
    }

    /// Attach the summarization collaborator used by trimming
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Attach an event bus for degradation and trim notifications
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Whether the manager has fallen back to transient storage
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Load a user's conversation history, most-recent-last.
    ///
    /// Never hard-fails on store unavailability; a degraded manager serves
    /// from the transient store, which may be empty.
    pub async fn load(&self, user_id: &str) -> MemoryResult<Vec<Message>> {
        validate_user_id(user_id)?;

        if let Some(durable) = self.active_durable() {
            match durable.load(user_id).await {
                Ok(messages) => return Ok(messages),
                Err(err) => self.degrade("load", &err),
            }
        }

        Ok(self.transient.load(user_id).await.unwrap_or_default())
    }

    /// Load a user's history as a session
    pub async fn session(&self, user_id: &str) -> MemoryResult<ConversationSession> {
        let messages = self.load(user_id).await?;
        Ok(ConversationSession::with_messages(user_id, messages))
    }

    /// Append a message to a user's history, trimming on overflow.
    ///
    /// Appends for the same user are serialized; interleaved callers never
    /// corrupt message order.
    pub async fn append(&self, user_id: &str, message: Message) -> MemoryResult<()> {
        validate_user_id(user_id)?;
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        if let Some(durable) = self.active_durable() {
            match self.append_and_trim(durable.as_ref(), user_id, &message).await {
                Ok(()) => return Ok(()),
                Err(err) => self.degrade("append", &err),
            }
        }

        if let Err(err) = self
            .append_and_trim(self.transient.as_ref(), user_id, &message)
            .await
        {
            // transient storage does not fail in practice
            warn!(user_id, error = %err, "transient append failed");
        }
        Ok(())
    }

    /// Force a durable flush for a user's session.
    ///
    /// No-op when serving from transient storage.
    pub async fn checkpoint(&self, user_id: &str) -> MemoryResult<()> {
        validate_user_id(user_id)?;

        if let Some(durable) = self.active_durable() {
            if let Err(err) = durable.flush().await {
                self.degrade("checkpoint", &err);
            }
        }
        Ok(())
    }

    /// Delete a user's conversation history
    pub async fn delete(&self, user_id: &str) -> MemoryResult<()> {
        validate_user_id(user_id)?;
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        if let Some(durable) = self.active_durable() {
            match durable.clear(user_id).await {
                Ok(()) => return Ok(()),
                Err(err) => self.degrade("delete", &err),
            }
        }

        if let Err(err) = self.transient.clear(user_id).await {
            warn!(user_id, error = %err, "transient clear failed");
        }
        Ok(())
    }

    async fn append_and_trim(
        &self,
        backend: &dyn MemoryBackend,
        user_id: &str,
        message: &Message,
    ) -> BackendResult<()> {
        backend.append(user_id, message).await?;

        let messages = backend.load(user_id).await?;
        let Some(keep_from) = self.policy.plan(&messages) else {
            return Ok(());
        };
        if keep_from == 0 {
            return Ok(());
        }

        let (dropped, retained) = messages.split_at(keep_from);
        let mut trimmed = Vec::with_capacity(retained.len() + 1);

        let summarized = match self.summarize(user_id, dropped).await {
            Some(summary) => {
                trimmed.push(summary);
                true
            }
            None => false,
        };
        trimmed.extend_from_slice(retained);

        backend.replace(user_id, &trimmed).await?;
        debug!(
            user_id,
            dropped = dropped.len(),
            retained = retained.len(),
            summarized,
            "trimmed conversation history"
        );
        self.emit(MemoryEvent::trimmed(
            user_id,
            dropped.len(),
            retained.len(),
            summarized,
        ));
        Ok(())
    }

    /// Summarize the dropped prefix, or `None` to fall back to truncation
    async fn summarize(&self, user_id: &str, dropped: &[Message]) -> Option<Message> {
        let summarizer = self.summarizer.as_ref()?;
        match summarizer.summarize(dropped).await {
            Ok(text) if !text.trim().is_empty() => Some(Message::assistant(format!(
                "Summary of earlier conversation: {}",
                text.trim()
            ))),
            Ok(_) => {
                self.emit(MemoryEvent::summary_fallback(user_id, "empty summary"));
                None
            }
            Err(err) => {
                warn!(user_id, error = %err, "summarization failed, truncating history instead");
                self.emit(MemoryEvent::summary_fallback(user_id, err.to_string()));
                None
            }
        }
    }

    fn active_durable(&self) -> Option<Arc<dyn MemoryBackend>> {
        if self.degraded.load(Ordering::SeqCst) {
            None
        } else {
            self.durable.clone()
        }
    }

    /// Sticky fallback: reported once, then the durable store is never
    /// touched again by this manager instance
    fn degrade(&self, operation: &str, err: &BackendError) {
        if self.degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            operation,
            error = %err,
            "durable store unavailable, serving conversations from transient memory"
        );
        self.emit(MemoryEvent::degraded(format!("{operation}: {err}")));
    }

    fn emit(&self, event: MemoryEvent) {
        if let Some(bus) = &self.bus {
            if let Err(err) = bus.publish(event) {
                debug!(error = %err, "event bus closed");
            }
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn validate_user_id(user_id: &str) -> MemoryResult<()> {
    if user_id.trim().is_empty() {
        return Err(MemoryError::InvalidUserId("must not be empty".to_string()));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(MemoryError::InvalidUserId(format!(
            "longer than {MAX_USER_ID_LEN} bytes"
        )));
    }
    if user_id.chars().any(|c| c.is_control()) {
        return Err(MemoryError::InvalidUserId(
            "contains control characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::{SummarizeError, SummarizeResult};
    use async_trait::async_trait;

    struct FailingBackend;

    #[async_trait]
    impl MemoryBackend for FailingBackend {
        async fn load(&self, _user_id: &str) -> BackendResult<Vec<Message>> {
            Err(BackendError::Connectivity("simulated outage".to_string()))
        }
        async fn append(&self, _user_id: &str, _message: &Message) -> BackendResult<()> {
            Err(BackendError::Connectivity("simulated outage".to_string()))
        }
        async fn replace(&self, _user_id: &str, _messages: &[Message]) -> BackendResult<()> {
            Err(BackendError::Connectivity("simulated outage".to_string()))
        }
        async fn clear(&self, _user_id: &str) -> BackendResult<()> {
            Err(BackendError::Connectivity("simulated outage".to_string()))
        }
        async fn flush(&self) -> BackendResult<()> {
            Err(BackendError::Connectivity("simulated outage".to_string()))
        }
    }

    struct StaticSummarizer(&'static str);

    #[async_trait]
    impl Summarizer for StaticSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> SummarizeResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> SummarizeResult<String> {
            Err(SummarizeError::Api("summarizer down".to_string()))
        }
    }

    fn loose_policy() -> TrimPolicy {
        TrimPolicy::new(1_000_000, 0)
    }

    #[tokio::test]
    async fn test_append_then_load_preserves_order() {
        let manager = MemoryManager::transient_only(loose_policy());

        for i in 0..5 {
            manager
                .append("u1", Message::user(format!("message {i}")))
                .await
                .unwrap();
        }

        let messages = manager.load("u1").await.unwrap();
        assert_eq!(messages.len(), 5);
        for (i, msg) in messages.iter().enumerate() {
            assert_eq!(msg.content, format!("message {i}"));
        }
    }

    #[tokio::test]
    async fn test_invalid_user_ids_are_rejected() {
        let manager = MemoryManager::transient_only(loose_policy());

        assert!(matches!(
            manager.load("").await,
            Err(MemoryError::InvalidUserId(_))
        ));
        assert!(matches!(
            manager.append("  ", Message::user("hi")).await,
            Err(MemoryError::InvalidUserId(_))
        ));
        assert!(matches!(
            manager.load("user\nid").await,
            Err(MemoryError::InvalidUserId(_))
        ));
        assert!(matches!(
            manager.load(&"x".repeat(300)).await,
            Err(MemoryError::InvalidUserId(_))
        ));
    }

    #[tokio::test]
    async fn test_trim_keeps_most_recent_and_inserts_summary() {
        let manager = MemoryManager::transient_only(TrimPolicy::new(3000, 0))
            .with_summarizer(Arc::new(StaticSummarizer("user worked through a backlog")));

        for i in 0..50 {
            manager
                .append(
                    "u1",
                    Message::user(format!("message {i}")).with_token_estimate(100),
                )
                .await
                .unwrap();
        }

        let messages = manager.load("u1").await.unwrap();
        let session = ConversationSession::with_messages("u1", messages.clone());

        assert!(messages.len() <= 31);
        assert_eq!(
            messages.first().map(|m| m.role),
            Some(crate::types::Role::Assistant)
        );
        assert!(messages[0]
            .content
            .starts_with("Summary of earlier conversation:"));
        assert_eq!(session.last().unwrap().content, "message 49");
    }

    #[tokio::test]
    async fn test_trimmed_session_is_stable_under_small_appends() {
        let manager = MemoryManager::transient_only(TrimPolicy::new(3000, 256))
            .with_summarizer(Arc::new(StaticSummarizer("earlier discussion")));

        for i in 0..40 {
            manager
                .append(
                    "u1",
                    Message::user(format!("message {i}")).with_token_estimate(100),
                )
                .await
                .unwrap();
        }

        let before = manager.load("u1").await.unwrap();
        manager
            .append("u1", Message::user("tiny").with_token_estimate(1))
            .await
            .unwrap();
        let after = manager.load("u1").await.unwrap();

        // under threshold again, so the small append must not re-trim
        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(after[0].id, before[0].id);
    }

    #[tokio::test]
    async fn test_summarizer_failure_falls_back_to_truncation() {
        let bus = EventBus::new();
        let mut rx = bus.take_receiver().await.unwrap();
        let manager = MemoryManager::transient_only(TrimPolicy::new(500, 0))
            .with_summarizer(Arc::new(FailingSummarizer))
            .with_event_bus(bus);

        for i in 0..10 {
            manager
                .append(
                    "u1",
                    Message::user(format!("message {i}")).with_token_estimate(100),
                )
                .await
                .unwrap();
        }

        let messages = manager.load("u1").await.unwrap();
        // no synthetic summary at the head, just the retained suffix
        assert!(!messages[0].content.starts_with("Summary of earlier"));
        assert_eq!(messages.last().unwrap().content, "message 9");

        let mut saw_fallback = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, MemoryEvent::SummaryFallback { .. }) {
                saw_fallback = true;
            }
        }
        assert!(saw_fallback);
    }

    #[tokio::test]
    async fn test_no_summarizer_truncates_silently() {
        let manager = MemoryManager::transient_only(TrimPolicy::new(500, 0));

        for i in 0..10 {
            manager
                .append(
                    "u1",
                    Message::user(format!("message {i}")).with_token_estimate(100),
                )
                .await
                .unwrap();
        }

        let messages = manager.load("u1").await.unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages.last().unwrap().content, "message 9");
    }

    #[tokio::test]
    async fn test_oversized_newest_message_is_never_dropped() {
        let manager = MemoryManager::transient_only(TrimPolicy::new(300, 0));

        manager
            .append("u1", Message::user("huge").with_token_estimate(5000))
            .await
            .unwrap();

        let messages = manager.load("u1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "huge");
    }

    #[tokio::test]
    async fn test_durable_failure_degrades_once_and_serves_transient() {
        let bus = EventBus::new();
        let mut rx = bus.take_receiver().await.unwrap();
        let manager = MemoryManager::new(Some(Arc::new(FailingBackend)), loose_policy())
            .with_event_bus(bus);

        assert!(!manager.is_degraded());
        manager.append("u1", Message::user("hello")).await.unwrap();
        assert!(manager.is_degraded());

        // served from the transient store from now on, without new events
        manager.append("u1", Message::user("again")).await.unwrap();
        let messages = manager.load("u1").await.unwrap();
        assert_eq!(messages.len(), 2);

        let mut degraded_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, MemoryEvent::DegradedToTransient { .. }) {
                degraded_events += 1;
            }
        }
        assert_eq!(degraded_events, 1);
    }

    #[tokio::test]
    async fn test_load_after_degradation_does_not_raise() {
        let manager = MemoryManager::new(Some(Arc::new(FailingBackend)), loose_policy());

        // first load trips the fallback and returns the (empty) transient view
        let messages = manager.load("u1").await.unwrap();
        assert!(messages.is_empty());
        assert!(manager.is_degraded());
    }

    #[tokio::test]
    async fn test_connect_failure_starts_degraded() {
        let manager = MemoryManager::transient_only(loose_policy())
            .connect_durable("sqlite:///no/such/dir/db.sqlite")
            .await;
        assert!(manager.is_degraded());

        manager.append("u1", Message::user("hi")).await.unwrap();
        assert_eq!(manager.load("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_publishes_degraded_event() {
        let bus = EventBus::new();
        let mut rx = bus.take_receiver().await.unwrap();

        let manager = MemoryManager::transient_only(loose_policy())
            .with_event_bus(bus)
            .connect_durable("sqlite:///no/such/dir/db.sqlite")
            .await;
        assert!(manager.is_degraded());

        // later traffic must not re-emit
        manager.append("u1", Message::user("hi")).await.unwrap();
        manager.load("u1").await.unwrap();

        let mut degraded_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, MemoryEvent::DegradedToTransient { .. }) {
                degraded_events += 1;
            }
        }
        assert_eq!(degraded_events, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_for_same_user_lose_nothing() {
        let manager = Arc::new(MemoryManager::transient_only(loose_policy()));

        let a = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.append("u1", Message::user("from a")).await })
        };
        let b = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.append("u1", Message::user("from b")).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let contents: Vec<String> = manager
            .load("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents.len(), 2);
        assert!(contents.contains(&"from a".to_string()));
        assert!(contents.contains(&"from b".to_string()));
    }

    #[tokio::test]
    async fn test_checkpoint_is_noop_on_transient() {
        let manager = MemoryManager::transient_only(loose_policy());
        manager.append("u1", Message::user("hi")).await.unwrap();
        manager.checkpoint("u1").await.unwrap();
        assert!(!manager.is_degraded());
    }

    #[tokio::test]
    async fn test_delete_removes_history() {
        let manager = MemoryManager::transient_only(loose_policy());
        manager.append("u1", Message::user("hi")).await.unwrap();
        manager.delete("u1").await.unwrap();
        assert!(manager.load("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_wraps_loaded_history() {
        let manager = MemoryManager::transient_only(loose_policy());
        manager.append("u1", Message::user("hello")).await.unwrap();

        let session = manager.session("u1").await.unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.len(), 1);
    }
}
