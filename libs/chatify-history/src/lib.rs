//! History store (C11): time-bucketed append-only conversation store.
//!
//! Schema (see `chatify-migrate` for the DDL that provisions this):
//!
//! ```text
//! table chat_messages
//!   partition key: scope_id (serialized "type:id")
//!   clustering:   created_at_utc ASC, message_id ASC
//!   columns:      sender_id, text, origin_replica_id,
//!                 broker_partition, broker_offset
//! ```
//!
//! Writes are `INSERT ... IF NOT EXISTS` on the clustering tuple so the
//! rebroadcast case (a replica restarting after producing but before
//! persisting) is a no-op rather than a duplicate row.

mod memory;
#[cfg(feature = "scylla-store")]
mod scylla_store;

use std::sync::Arc;

use async_trait::async_trait;
use chatify_core::{ChatEvent, ScopeType};
use time::OffsetDateTime;
use uuid::Uuid;

pub use memory::MemoryHistoryStore;
#[cfg(feature = "scylla-store")]
pub use scylla_store::ScyllaHistoryStore;

/// Persisted projection of an event, as returned by `fetch`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub message_id: Uuid,
    pub scope_type: ScopeType,
    pub scope_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at_utc: OffsetDateTime,
    pub origin_replica_id: String,
    pub broker_partition: i32,
    pub broker_offset: i64,
}

impl HistoryRow {
    pub fn from_event(event: &ChatEvent, broker_partition: i32, broker_offset: i64) -> Self {
        Self {
            message_id: event.message_id,
            scope_type: event.scope_type,
            scope_id: event.scope_id.clone(),
            sender_id: event.sender_id.clone(),
            text: event.text.clone(),
            created_at_utc: event.created_at_utc,
            origin_replica_id: event.origin_pod_id.clone(),
            broker_partition,
            broker_offset,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("transient history store error: {0}")]
    Transient(#[source] anyhow::Error),
    #[error("permanent history store error: {0}")]
    Permanent(#[source] anyhow::Error),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Idempotent append keyed on `(created_at_utc, message_id)`.
    async fn append(
        &self,
        event: &ChatEvent,
        broker_partition: i32,
        broker_offset: i64,
    ) -> Result<(), HistoryError>;

    /// Returns rows for `scope_id` in ascending time order, optionally
    /// bounded by `[from_utc, to_utc)` and always bounded by `limit`.
    async fn fetch(
        &self,
        scope_type: ScopeType,
        scope_id: &str,
        from_utc: Option<OffsetDateTime>,
        to_utc: Option<OffsetDateTime>,
        limit: u32,
    ) -> Result<Vec<HistoryRow>, HistoryError>;
}

pub type SharedHistoryStore = Arc<dyn HistoryStore>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chatify_core::scope_key;

    pub(crate) fn sample_event(scope_id: &str, text: &str) -> ChatEvent {
        ChatEvent {
            message_id: Uuid::new_v4(),
            scope_type: ScopeType::Channel,
            scope_id: scope_id.into(),
            sender_id: "u-1".into(),
            text: text.into(),
            created_at_utc: OffsetDateTime::now_utc(),
            origin_pod_id: "replica-a".into(),
        }
    }

    #[test]
    fn scope_key_matches_history_row_partition_key_shape() {
        let event = sample_event("general", "hi");
        assert_eq!(scope_key(event.scope_type, &event.scope_id), "0:general");
    }
}
