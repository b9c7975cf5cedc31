//! Event source and publisher seams.

use async_trait::async_trait;
use vedit_models::JobEvent;

use crate::error::QueueResult;

/// An undecoded message as delivered by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Source-specific message ID, used to commit
    pub id: String,
    /// Serialized `JobEvent`
    pub payload: Vec<u8>,
}

impl RawEvent {
    pub fn new(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text, for logging.
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Pull-based source of job events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch the next batch. May block up to the source's own poll timeout
    /// and may return an empty batch.
    async fn poll(&self) -> QueueResult<Vec<RawEvent>>;

    /// Mark a message as consumed so it is not delivered again.
    async fn commit(&self, event_id: &str) -> QueueResult<()>;
}

/// Sink for job events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event, returning its message ID.
    async fn publish(&self, event: &JobEvent) -> QueueResult<String>;
}
