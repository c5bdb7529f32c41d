//! Background tasks: queued input, streamed output, cooperative cancellation.

pub mod queue;
mod registry;
mod runner;
#[allow(clippy::module_inception)]
mod task;

pub use queue::{InMemoryMessageQueue, InMemoryQueueFactory, MessageQueue, QueueEntry, QueueFactory, QUEUE_START};
#[cfg(feature = "redis")]
pub use queue::{RedisQueueFactory, RedisStreamMessageQueue};
pub use registry::TaskRegistry;
pub use runner::AgentTaskRunner;
pub use task::{Task, TaskRunner};
