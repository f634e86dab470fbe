//! Event producer (C6).
//!
//! Appends a [`ChatEvent`] to the ordered, partitioned `chat-events` stream.
//! Partition key is `scope_key(scope_type, scope_id)` (see `chatify-core`);
//! two events produced sequentially from the same process for the same scope
//! land in the same partition in call order because they're published to the
//! same per-partition subject and JetStream preserves publish order within a
//! subject. The call only returns after JetStream acknowledges the durable
//! write — no partial success is observable by the caller.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_nats::jetstream::{
    self,
    stream::{RetentionPolicy, StorageType, Stream},
};
use async_trait::async_trait;
use chatify_core::{scope_key, ChatEvent, DEFAULT_TOPIC};
use tokio::sync::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum ProducerError {
    #[error("failed to serialize chat event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to publish chat event: {0}")]
    Publish(#[source] anyhow::Error),
    #[error("failed to confirm durable write: {0}")]
    Ack(#[source] anyhow::Error),
}

/// Position an [`ChatEvent`] landed at on the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn produce(&self, event: &ChatEvent) -> Result<LogPosition, ProducerError>;
}

pub type SharedEventProducer = Arc<dyn EventProducer>;

/// Computes the deterministic partition for a scope key. Uses a fixed-seed
/// hasher so the same scope always maps to the same partition on every
/// replica, independent of process startup order.
pub fn partition_for_scope(key: &str, partitions: u32) -> i32 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as i32
}

fn partition_subject(topic: &str, partition: i32) -> String {
    format!("{topic}.{partition}")
}

/// JetStream-backed producer. `ensure_stream` provisions the stream with
/// `partitions` subjects (`{topic}.0` .. `{topic}.{partitions-1}`) so each
/// partition is an independently ordered JetStream subject.
pub struct JetStreamEventProducer {
    js: jetstream::Context,
    topic: String,
    partitions: u32,
}

impl JetStreamEventProducer {
    pub fn new(js: jetstream::Context, topic: impl Into<String>, partitions: u32) -> Self {
        Self {
            js,
            topic: topic.into(),
            partitions,
        }
    }

    /// Creates the stream if absent, or returns the existing one.
    pub async fn ensure_stream(&self) -> Result<Stream, ProducerError> {
        let subjects = (0..self.partitions)
            .map(|p| partition_subject(&self.topic, p as i32))
            .collect();
        self.js
            .get_or_create_stream(jetstream::stream::Config {
                name: self.topic.clone(),
                subjects,
                retention: RetentionPolicy::Limits,
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|err| ProducerError::Publish(anyhow::Error::new(err)))
    }
}

#[async_trait]
impl EventProducer for JetStreamEventProducer {
    async fn produce(&self, event: &ChatEvent) -> Result<LogPosition, ProducerError> {
        let key = scope_key(event.scope_type, &event.scope_id);
        let partition = partition_for_scope(&key, self.partitions);
        let subject = partition_subject(&self.topic, partition);
        let payload = serde_json::to_vec(event)?;

        let ack_future = self
            .js
            .publish(subject, payload.into())
            .await
            .map_err(|err| ProducerError::Publish(anyhow::Error::new(err)))?;
        let ack = ack_future
            .await
            .map_err(|err| ProducerError::Ack(anyhow::Error::new(err)))?;

        metrics::counter!("chatify_events_produced_total", "partition" => partition.to_string())
            .increment(1);

        Ok(LogPosition {
            partition,
            offset: ack.sequence as i64,
        })
    }
}

/// In-memory producer for tests: preserves per-scope order and assigns
/// monotonically increasing offsets per partition, without any I/O.
#[derive(Default)]
pub struct InMemoryEventProducer {
    partitions: u32,
    published: Mutex<Vec<ChatEvent>>,
    next_offset: Mutex<std::collections::HashMap<i32, i64>>,
}

impl InMemoryEventProducer {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions,
            published: Mutex::new(Vec::new()),
            next_offset: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub async fn published(&self) -> Vec<ChatEvent> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventProducer for InMemoryEventProducer {
    async fn produce(&self, event: &ChatEvent) -> Result<LogPosition, ProducerError> {
        let key = scope_key(event.scope_type, &event.scope_id);
        let partition = partition_for_scope(&key, self.partitions.max(1));
        let mut offsets = self.next_offset.lock().await;
        let offset = offsets.entry(partition).or_insert(0);
        let position = LogPosition {
            partition,
            offset: *offset,
        };
        *offset += 1;
        drop(offsets);
        self.published.lock().await.push(event.clone());
        Ok(position)
    }
}
