use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{MessageQueue, QueueEntry, QueueFactory};
use crate::error::{Result, StrideError};

#[derive(Debug, Default)]
struct Log {
    entries: VecDeque<(u64, String)>,
    last_seq: u64,
}

/// Process-local queue with the same ordering and blocking semantics as the
/// Redis stream queue. Ids look like `"<seq>-0"`.
#[derive(Debug, Default)]
pub struct InMemoryMessageQueue {
    log: Mutex<Log>,
    appended: Notify,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn first_after(&self, after: u64) -> Option<QueueEntry> {
        self.log()
            .entries
            .iter()
            .find(|(seq, _)| *seq > after)
            .map(|(seq, payload)| QueueEntry {
                id: format_id(*seq),
                payload: payload.clone(),
            })
    }
}

fn format_id(seq: u64) -> String {
    format!("{seq}-0")
}

fn parse_id(id: &str) -> Result<u64> {
    let seq = id.split('-').next().unwrap_or(id);
    seq.parse()
        .map_err(|_| StrideError::InvalidArgument(format!("invalid queue id '{id}'")))
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn put(&self, payload: String) -> Result<String> {
        let id = {
            let mut log = self.log();
            log.last_seq += 1;
            let seq = log.last_seq;
            log.entries.push_back((seq, payload));
            format_id(seq)
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn get(&self, start_id: Option<&str>, block_ms: Option<u64>) -> Result<Option<QueueEntry>> {
        let after = start_id.map(parse_id).transpose()?.unwrap_or(0);

        let Some(block_ms) = block_ms else {
            return Ok(self.first_after(after));
        };
        let deadline = (block_ms > 0).then(|| tokio::time::Instant::now() + Duration::from_millis(block_ms));

        loop {
            let appended = self.appended.notified();
            if let Some(entry) = self.first_after(after) {
                return Ok(Some(entry));
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, appended).await.is_err() {
                        return Ok(self.first_after(after));
                    }
                }
                None => appended.await,
            }
        }
    }

    async fn pop(&self) -> Result<Option<QueueEntry>> {
        Ok(self.log().entries.pop_front().map(|(seq, payload)| QueueEntry {
            id: format_id(seq),
            payload,
        }))
    }

    async fn clear(&self) -> Result<()> {
        self.log().entries.clear();
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.log().entries.len())
    }

    async fn delete_message(&self, id: &str) -> Result<bool> {
        let seq = parse_id(id)?;
        let mut log = self.log();
        let before = log.entries.len();
        log.entries.retain(|(s, _)| *s != seq);
        Ok(log.entries.len() != before)
    }
}

/// Factory handing out fresh in-memory queues.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryQueueFactory;

impl QueueFactory for InMemoryQueueFactory {
    fn create(&self, _name: &str) -> Result<Arc<dyn MessageQueue>> {
        Ok(Arc::new(InMemoryMessageQueue::new()))
    }
}
