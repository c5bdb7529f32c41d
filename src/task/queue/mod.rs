//! Ordered message queues backing task input and output.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::{InMemoryMessageQueue, InMemoryQueueFactory};
#[cfg(feature = "redis")]
pub use self::redis::{RedisQueueFactory, RedisStreamMessageQueue};

/// Id that sorts before every entry; reading after it starts at the head.
pub const QUEUE_START: &str = "0";

/// One queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: String,
    pub payload: String,
}

/// Append-only ordered log with non-destructive reads and an exclusive pop.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append `payload`, returning the new entry's id.
    async fn put(&self, payload: String) -> Result<String>;

    /// First entry after `start_id` (the head when `None`).
    ///
    /// With `block_ms`, waits up to that long for an entry to arrive; `0`
    /// waits indefinitely. Returns `None` on timeout.
    async fn get(&self, start_id: Option<&str>, block_ms: Option<u64>) -> Result<Option<QueueEntry>>;

    /// Remove and return the earliest entry.
    ///
    /// At most one concurrent caller receives any given entry. Returns
    /// `None` when the queue is empty or the pop lock could not be taken.
    async fn pop(&self) -> Result<Option<QueueEntry>>;

    async fn clear(&self) -> Result<()>;

    async fn size(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }

    /// Delete one entry by id. Returns whether it existed.
    async fn delete_message(&self, id: &str) -> Result<bool>;
}

/// Creates named queues for new tasks.
pub trait QueueFactory: Send + Sync {
    fn create(&self, name: &str) -> Result<Arc<dyn MessageQueue>>;
}
