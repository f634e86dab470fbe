use async_trait::async_trait;
use chatify_core::{scope_key, ChatEvent, ScopeType};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::{HistoryError, HistoryRow, HistoryStore};

/// In-memory history store for tests and single-replica deployments.
/// Rows are keyed by `(created_at_utc, message_id)` within each scope's
/// `BTreeMap` so ordering and idempotent-insert both fall out of the map.
#[derive(Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<std::collections::HashMap<String, BTreeMap<(i128, uuid::Uuid), HistoryRow>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(
        &self,
        event: &ChatEvent,
        broker_partition: i32,
        broker_offset: i64,
    ) -> Result<(), HistoryError> {
        let key = scope_key(event.scope_type, &event.scope_id);
        let row = HistoryRow::from_event(event, broker_partition, broker_offset);
        let clustering = (event.created_at_utc.unix_timestamp_nanos(), event.message_id);
        let mut rows = self.rows.lock().await;
        rows.entry(key).or_default().insert(clustering, row);
        Ok(())
    }

    async fn fetch(
        &self,
        scope_type: ScopeType,
        scope_id: &str,
        from_utc: Option<time::OffsetDateTime>,
        to_utc: Option<time::OffsetDateTime>,
        limit: u32,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let key = scope_key(scope_type, scope_id);
        let rows = self.rows.lock().await;
        let Some(scoped) = rows.get(&key) else {
            return Ok(Vec::new());
        };
        let result = scoped
            .values()
            .filter(|row| from_utc.map(|f| row.created_at_utc >= f).unwrap_or(true))
            .filter(|row| to_utc.map(|t| row.created_at_utc < t).unwrap_or(true))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_event;

    #[tokio::test]
    async fn append_then_fetch_returns_in_ascending_time_order() {
        let store = MemoryHistoryStore::new();
        let first = sample_event("general", "a");
        std::thread::sleep(std::time::Duration::from_millis(1));
        let second = sample_event("general", "b");
        store.append(&second, 0, 1).await.unwrap();
        store.append(&first, 0, 0).await.unwrap();

        let rows = store
            .fetch(ScopeType::Channel, "general", None, None, 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text, "a");
        assert_eq!(rows[1].text, "b");
    }

    #[tokio::test]
    async fn appending_same_event_twice_is_idempotent() {
        let store = MemoryHistoryStore::new();
        let event = sample_event("general", "hi");
        store.append(&event, 0, 5).await.unwrap();
        store.append(&event, 0, 5).await.unwrap();

        let rows = store
            .fetch(ScopeType::Channel, "general", None, None, 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn fetch_respects_limit() {
        let store = MemoryHistoryStore::new();
        for i in 0..5 {
            let event = sample_event("general", &format!("msg-{i}"));
            store.append(&event, 0, i).await.unwrap();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let rows = store
            .fetch(ScopeType::Channel, "general", None, None, 3)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn fetch_on_unknown_scope_returns_empty() {
        let store = MemoryHistoryStore::new();
        let rows = store
            .fetch(ScopeType::Channel, "nope", None, None, 10)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
