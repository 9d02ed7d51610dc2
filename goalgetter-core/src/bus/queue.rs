//! Async event queue implementation

use super::events::MemoryEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Type alias for event channel endpoints
pub type EventSender = mpsc::UnboundedSender<MemoryEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<MemoryEvent>;

type EventCallback = Arc<
    dyn Fn(MemoryEvent) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

/// Async event bus that decouples the memory manager from its observers
///
/// The manager publishes events; observers either take the raw receiver or
/// register async callbacks and let the dispatch loop fan events out.
#[derive(Clone)]
pub struct EventBus {
    tx: EventSender,
    rx: Arc<RwLock<Option<EventReceiver>>>,
    subscribers: Arc<RwLock<Vec<EventCallback>>>,
    running: Arc<RwLock<bool>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            tx,
            rx: Arc::new(RwLock::new(Some(rx))),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Take the receiver (can only be called once)
    pub async fn take_receiver(&self) -> Option<EventReceiver> {
        self.rx.write().await.take()
    }

    /// Publish an event to the bus
    pub fn publish(&self, event: MemoryEvent) -> crate::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| crate::Error::Bus("Event channel closed".to_string()))
    }

    /// Subscribe to events with an async callback
    pub async fn subscribe<F, Fut>(&self, callback: F)
    where
        F: Fn(MemoryEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let wrapped: EventCallback = Arc::new(move |event| Box::pin(callback(event)));
        self.subscribers.write().await.push(wrapped);
    }

    /// Dispatch events to subscribers
    /// Run this as a background task
    pub async fn dispatch_loop(&self) {
        let mut rx = match self.take_receiver().await {
            Some(rx) => rx,
            None => {
                debug!("Event receiver already taken");
                return;
            }
        };

        *self.running.write().await = true;
        debug!("Starting event dispatcher");

        while *self.running.read().await {
            tokio::select! {
                Some(event) = rx.recv() => {
                    let subscribers = self.subscribers.read().await;
                    for callback in subscribers.iter() {
                        let future = callback(event.clone());
                        // Spawn to avoid blocking the dispatch loop
                        tokio::spawn(async move {
                            future.await;
                        });
                    }
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(100)) => {
                    // Check running state periodically
                    continue;
                }
            }
        }

        debug!("Event dispatcher stopped");
    }

    /// Stop the dispatch loop
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Check if the bus is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
