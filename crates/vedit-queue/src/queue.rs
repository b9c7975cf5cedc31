//! Job event stream using Redis Streams consumer groups.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use vedit_models::JobEvent;

use crate::error::{QueueError, QueueResult};
use crate::source::{EventPublisher, EventSource, RawEvent};

/// Stream entry field holding the serialized event.
pub const PAYLOAD_FIELD: &str = "job";

/// Where a newly created consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetPolicy {
    /// Everything still retained in the stream
    Earliest,
    /// Only messages added after the group is created
    #[default]
    Latest,
}

impl OffsetPolicy {
    /// Stream ID passed to `XGROUP CREATE`.
    pub fn start_id(&self) -> &'static str {
        match self {
            OffsetPolicy::Earliest => "0",
            OffsetPolicy::Latest => "$",
        }
    }
}

impl FromStr for OffsetPolicy {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earliest" | "beginning" | "start" => Ok(OffsetPolicy::Earliest),
            "latest" | "end" | "" => Ok(OffsetPolicy::Latest),
            other => Err(QueueError::invalid_config(format!(
                "unknown offset policy '{}', expected 'earliest' or 'latest'",
                other
            ))),
        }
    }
}

impl fmt::Display for OffsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetPolicy::Earliest => write!(f, "earliest"),
            OffsetPolicy::Latest => write!(f, "latest"),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// This consumer's name within the group
    pub consumer_name: String,
    /// Start position for a new consumer group
    pub offset: OffsetPolicy,
    /// How long a poll blocks waiting for messages
    pub block_ms: u64,
    /// Max messages per poll
    pub batch_size: usize,
    /// Pending entries idle at least this long are taken over by this consumer
    pub claim_min_idle_ms: u64,
    /// Minimum gap between two reclaim passes
    pub claim_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vedit:jobs".to_string(),
            consumer_group: "vedit:workers".to_string(),
            consumer_name: default_consumer_name(),
            offset: OffsetPolicy::default(),
            block_ms: 1000,
            batch_size: 10,
            claim_min_idle_ms: 300_000,
            claim_interval_ms: 30_000,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let offset = match std::env::var("QUEUE_OFFSET") {
            Ok(value) => value.parse()?,
            Err(_) => OffsetPolicy::default(),
        };

        Ok(Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "vedit:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vedit:workers".to_string()),
            consumer_name: std::env::var("QUEUE_CONSUMER_NAME")
                .unwrap_or_else(|_| default_consumer_name()),
            offset,
            block_ms: std::env::var("QUEUE_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            batch_size: std::env::var("QUEUE_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(10),
            claim_min_idle_ms: std::env::var("QUEUE_CLAIM_IDLE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300_000),
            claim_interval_ms: std::env::var("QUEUE_CLAIM_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30_000),
        })
    }
}

fn default_consumer_name() -> String {
    format!("worker-{}", Uuid::new_v4())
}

/// Redis Streams client owned by a worker or API instance.
///
/// Entries a consumer read but never acknowledged stay in the group's
/// pending list. `poll` periodically takes over the ones idle longer than
/// `claim_min_idle_ms`, so a crashed or canceled job is retried by whichever
/// instance is still running.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    last_claim: Mutex<Option<Instant>>,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self {
            client,
            config,
            last_claim: Mutex::new(None),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env()?)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Initialize the queue (create consumer group if not exists).
    ///
    /// The offset policy only applies when the group is created; an existing
    /// group keeps its position.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(self.config.offset.start_id())
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!(
                "Created consumer group {} on {} at {}",
                self.config.consumer_group, self.config.stream_name, self.config.offset
            ),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Take over pending entries that have been idle too long.
    pub async fn claim_stale(&self) -> QueueResult<Vec<RawEvent>> {
        let mut conn = self.connection().await?;

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(self.config.claim_min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(self.config.batch_size)
            .query_async(&mut conn)
            .await?;

        let events: Vec<RawEvent> = reply.claimed.into_iter().map(raw_event).collect();
        if !events.is_empty() {
            info!(
                "Reclaimed {} pending events from {} as {}",
                events.len(),
                self.config.stream_name,
                self.config.consumer_name
            );
        }
        Ok(events)
    }

    /// Whether a reclaim pass is due, marking it as started if so.
    fn claim_due(&self) -> bool {
        let interval = Duration::from_millis(self.config.claim_interval_ms);
        let mut last = self.last_claim.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(at) if at.elapsed() < interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}

fn raw_event(entry: redis::streams::StreamId) -> RawEvent {
    // A missing or non-binary field decodes as an empty payload and is
    // rejected by the consumer.
    let payload = entry
        .map
        .get(PAYLOAD_FIELD)
        .and_then(|v| redis::from_redis_value::<Vec<u8>>(v).ok())
        .unwrap_or_default();
    RawEvent::new(entry.id, payload)
}

#[async_trait]
impl EventSource for JobQueue {
    async fn poll(&self) -> QueueResult<Vec<RawEvent>> {
        if self.claim_due() {
            let reclaimed = self.claim_stale().await?;
            if !reclaimed.is_empty() {
                return Ok(reclaimed);
            }
        }

        let mut conn = self.connection().await?;

        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("BLOCK")
            .arg(self.config.block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let events: Vec<RawEvent> = reply
            .map(|r| r.keys)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|key| key.ids)
            .map(raw_event)
            .collect();

        if !events.is_empty() {
            debug!("Polled {} events from {}", events.len(), self.config.stream_name);
        }
        Ok(events)
    }

    async fn commit(&self, event_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(event_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Committed event {}", event_id);
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for JobQueue {
    async fn publish(&self, event: &JobEvent) -> QueueResult<String> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(event)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!(
            "Published job {} with message ID {}",
            event.id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            message_id
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_policy_parsing() {
        assert_eq!("earliest".parse::<OffsetPolicy>().unwrap(), OffsetPolicy::Earliest);
        assert_eq!("LATEST".parse::<OffsetPolicy>().unwrap(), OffsetPolicy::Latest);
        assert!("middle".parse::<OffsetPolicy>().is_err());
    }

    #[test]
    fn test_offset_start_ids() {
        assert_eq!(OffsetPolicy::Earliest.start_id(), "0");
        assert_eq!(OffsetPolicy::Latest.start_id(), "$");
    }

    #[test]
    fn test_default_consumer_names_are_unique() {
        assert_ne!(QueueConfig::default().consumer_name, QueueConfig::default().consumer_name);
    }

    #[test]
    fn test_claim_pass_is_rate_limited() {
        let queue = JobQueue::new(QueueConfig {
            claim_interval_ms: 60_000,
            ..QueueConfig::default()
        })
        .unwrap();

        assert!(queue.claim_due());
        assert!(!queue.claim_due());
    }

    #[test]
    fn test_zero_claim_interval_claims_every_poll() {
        let queue = JobQueue::new(QueueConfig {
            claim_interval_ms: 0,
            ..QueueConfig::default()
        })
        .unwrap();

        assert!(queue.claim_due());
        assert!(queue.claim_due());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_unacked_event_is_reclaimed_by_another_consumer() {
        use vedit_models::JobRequest;

        dotenvy::dotenv().ok();

        let base = QueueConfig {
            stream_name: format!("vedit:test:{}", Uuid::new_v4()),
            offset: OffsetPolicy::Earliest,
            claim_min_idle_ms: 0,
            claim_interval_ms: 0,
            ..QueueConfig::from_env().expect("queue config")
        };
        let crashed = JobQueue::new(QueueConfig {
            consumer_name: "worker-crashed".to_string(),
            ..base.clone()
        })
        .expect("Failed to create queue");
        let survivor = JobQueue::new(QueueConfig {
            consumer_name: "worker-survivor".to_string(),
            ..base
        })
        .expect("Failed to create queue");
        crashed.init().await.expect("Failed to initialize queue");

        let event = JobEvent::new(JobRequest::new("in.mp4", "out.jpg"));
        let message_id = crashed.publish(&event).await.expect("Failed to publish");

        // Delivered to the first consumer, which never acknowledges it.
        let first = crashed.poll().await.expect("Failed to poll");
        assert_eq!(first.len(), 1);

        let reclaimed = survivor.poll().await.expect("Failed to poll");
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, message_id);
        assert_eq!(JobEvent::decode(&reclaimed[0].payload).unwrap(), event);

        survivor.commit(&message_id).await.expect("Failed to commit");
        assert!(survivor.claim_stale().await.expect("Failed to claim").is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_publish_poll_commit() {
        use vedit_models::JobRequest;

        dotenvy::dotenv().ok();

        let config = QueueConfig {
            stream_name: format!("vedit:test:{}", Uuid::new_v4()),
            offset: OffsetPolicy::Earliest,
            ..QueueConfig::from_env().expect("queue config")
        };
        let queue = JobQueue::new(config).expect("Failed to create queue");
        queue.init().await.expect("Failed to initialize queue");

        let event = JobEvent::new(JobRequest::new("in.mp4", "out.jpg"));
        let message_id = queue.publish(&event).await.expect("Failed to publish");

        let events = queue.poll().await.expect("Failed to poll");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, message_id);
        assert_eq!(JobEvent::decode(&events[0].payload).unwrap(), event);

        queue.commit(&message_id).await.expect("Failed to commit");
    }
}
