//! Job event intake over Redis Streams.
//!
//! This crate provides:
//! - The `EventSource` / `EventPublisher` seams used by the worker and API
//! - A Redis Streams consumer-group implementation
//! - An in-memory implementation for tests and embedding

pub mod error;
pub mod memory;
pub mod queue;
pub mod source;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryEventSource;
pub use queue::{JobQueue, OffsetPolicy, QueueConfig};
pub use source::{EventPublisher, EventSource, RawEvent};
