//! In-process event source.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use vedit_models::JobEvent;

use crate::error::{QueueError, QueueResult};
use crate::source::{EventPublisher, EventSource, RawEvent};

/// Event source backed by a queue of pre-loaded batches.
///
/// Polling an empty source sleeps for the idle delay and returns an empty
/// batch, like a broker poll timing out.
pub struct MemoryEventSource {
    batches: Mutex<VecDeque<QueueResult<Vec<RawEvent>>>>,
    committed: Mutex<Vec<String>>,
    next_id: AtomicU64,
    idle_delay: Duration,
}

impl Default for MemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            committed: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            idle_delay: Duration::from_millis(10),
        }
    }

    /// Set how long an empty poll waits.
    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Queue a batch returned by a single poll.
    pub fn push_batch(&self, batch: Vec<RawEvent>) {
        lock(&self.batches).push_back(Ok(batch));
    }

    /// Queue a failing poll.
    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.batches).push_back(Err(QueueError::poll_failed(message)));
    }

    /// Number of polls still queued.
    pub fn pending_batches(&self) -> usize {
        lock(&self.batches).len()
    }

    /// IDs committed so far, in commit order.
    pub fn committed(&self) -> Vec<String> {
        lock(&self.committed).clone()
    }

    fn next_id(&self) -> String {
        format!("{}-0", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn poll(&self) -> QueueResult<Vec<RawEvent>> {
        let next = lock(&self.batches).pop_front();
        match next {
            Some(batch) => batch,
            None => {
                tokio::time::sleep(self.idle_delay).await;
                Ok(Vec::new())
            }
        }
    }

    async fn commit(&self, event_id: &str) -> QueueResult<()> {
        lock(&self.committed).push(event_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for MemoryEventSource {
    async fn publish(&self, event: &JobEvent) -> QueueResult<String> {
        let id = self.next_id();
        let payload = serde_json::to_vec(event)?;
        self.push_batch(vec![RawEvent::new(id.clone(), payload)]);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::JobRequest;

    #[tokio::test]
    async fn test_batches_are_returned_in_order() {
        let source = MemoryEventSource::new();
        source.push_batch(vec![RawEvent::new("1-0", "a"), RawEvent::new("2-0", "b")]);
        source.push_failure("broker down");
        source.push_batch(vec![RawEvent::new("3-0", "c")]);

        assert_eq!(source.poll().await.unwrap().len(), 2);
        assert!(source.poll().await.is_err());
        assert_eq!(source.poll().await.unwrap()[0].id, "3-0");
        assert!(source.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_round_trips_through_poll() {
        let source = MemoryEventSource::new();
        let event = JobEvent::new(JobRequest::new("in.mp4", "out.jpg"));

        let id = source.publish(&event).await.unwrap();
        let batch = source.poll().await.unwrap();

        assert_eq!(batch[0].id, id);
        assert_eq!(JobEvent::decode(&batch[0].payload).unwrap(), event);

        source.commit(&id).await.unwrap();
        assert_eq!(source.committed(), vec![id]);
    }
}
