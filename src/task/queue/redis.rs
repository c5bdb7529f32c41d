//! Redis Streams queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, warn};

use super::{MessageQueue, QueueEntry, QueueFactory, QUEUE_START};
use crate::error::{Result, StrideError};

const PAYLOAD_FIELD: &str = "data";
const LOCK_LEASE_MS: u64 = 10_000;
const LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(100);

/// Deletes the lock only while it still holds our token.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Queue stored as one Redis stream, with entries under the `data` field.
///
/// `pop` is guarded by a lease lock at `<stream>.pop`.
#[derive(Debug, Clone)]
pub struct RedisStreamMessageQueue {
    client: redis::Client,
    stream: String,
    lock_key: String,
}

impl RedisStreamMessageQueue {
    pub fn new(client: redis::Client, stream: impl Into<String>) -> Self {
        let stream = stream.into();
        Self {
            client,
            lock_key: format!("{stream}.pop"),
            stream,
        }
    }

    /// Open a client for `url` and bind it to `stream`.
    pub fn open(url: &str, stream: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StrideError::Queue(format!("invalid redis url: {e}")))?;
        Ok(Self::new(client, stream))
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StrideError::Queue(format!("redis connection failed: {e}")))
    }

    /// Take the pop lock, spinning until [`LOCK_WAIT`] runs out.
    async fn acquire_lock(&self, conn: &mut redis::aio::MultiplexedConnection, token: &str) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + LOCK_WAIT;
        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&self.lock_key)
                .arg(token)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_LEASE_MS)
                .query_async(conn)
                .await?;
            if acquired.is_some() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
    }

    async fn release_lock(&self, conn: &mut redis::aio::MultiplexedConnection, token: &str) -> Result<()> {
        let released: i64 = redis::Script::new(RELEASE_LOCK_SCRIPT)
            .key(&self.lock_key)
            .arg(token)
            .invoke_async(conn)
            .await?;
        if released == 0 {
            warn!(lock = %self.lock_key, "pop lock expired before release");
        }
        Ok(())
    }

    async fn take_head(&self, conn: &mut redis::aio::MultiplexedConnection) -> Result<Option<QueueEntry>> {
        let reply: StreamRangeReply = conn.xrange_count(&self.stream, "-", "+", 1).await?;
        let Some(head) = reply.ids.into_iter().next() else {
            return Ok(None);
        };
        let payload: String = head.get(PAYLOAD_FIELD).unwrap_or_default();
        let _: usize = conn.xdel(&self.stream, &[&head.id]).await?;
        Ok(Some(QueueEntry { id: head.id, payload }))
    }
}

#[async_trait]
impl MessageQueue for RedisStreamMessageQueue {
    async fn put(&self, payload: String) -> Result<String> {
        let mut conn = self.connection().await?;
        let id: String = conn.xadd(&self.stream, "*", &[(PAYLOAD_FIELD, payload)]).await?;
        Ok(id)
    }

    async fn get(&self, start_id: Option<&str>, block_ms: Option<u64>) -> Result<Option<QueueEntry>> {
        let mut conn = self.connection().await?;
        let mut options = StreamReadOptions::default().count(1);
        if let Some(block_ms) = block_ms {
            options = options.block(block_ms as usize);
        }
        let start = start_id.unwrap_or(QUEUE_START);

        let reply: Option<StreamReadReply> = conn.xread_options(&[&self.stream], &[start], &options).await?;
        let entry = reply
            .and_then(|reply| reply.keys.into_iter().next())
            .and_then(|key| key.ids.into_iter().next())
            .map(|entry| QueueEntry {
                payload: entry.get(PAYLOAD_FIELD).unwrap_or_default(),
                id: entry.id,
            });
        Ok(entry)
    }

    async fn pop(&self) -> Result<Option<QueueEntry>> {
        let mut conn = self.connection().await?;
        let token = uuid::Uuid::new_v4().to_string();
        if !self.acquire_lock(&mut conn, &token).await? {
            debug!(stream = %self.stream, "pop lock busy");
            return Ok(None);
        }

        let taken = self.take_head(&mut conn).await;
        self.release_lock(&mut conn, &token).await?;
        taken
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: usize = conn.del(&self.stream).await?;
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        let mut conn = self.connection().await?;
        Ok(conn.xlen(&self.stream).await?)
    }

    async fn delete_message(&self, id: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let deleted: usize = conn.xdel(&self.stream, &[id]).await?;
        Ok(deleted > 0)
    }
}

/// Factory binding queues to one Redis server.
#[derive(Debug, Clone)]
pub struct RedisQueueFactory {
    client: redis::Client,
}

impl RedisQueueFactory {
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| StrideError::Queue(format!("invalid redis url: {e}")))?;
        Ok(Self { client })
    }
}

impl QueueFactory for RedisQueueFactory {
    fn create(&self, name: &str) -> Result<Arc<dyn MessageQueue>> {
        Ok(Arc::new(RedisStreamMessageQueue::new(self.client.clone(), name)))
    }
}
