//! Event bus for memory subsystem notifications
//!
//! The bus decouples the memory manager from whatever is observing it:
//! degradation and trim activity are published as events, and an embedding
//! service subscribes without the manager knowing about it.

pub mod events;
pub mod queue;

pub use events::MemoryEvent;
pub use queue::EventBus;
