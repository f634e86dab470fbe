//! Subscription registry (C9).
//!
//! In-process mapping `scopeKey -> set<sink>` used by the broadcast consumer
//! to fan events out to locally connected clients. `subscribe`/`unsubscribe`
//! are idempotent; `deliver` never blocks on a slow subscriber — a
//! backpressured sink has its event dropped and the drop is logged, the sink
//! itself stays subscribed.

use std::collections::HashSet;

use chatify_core::{ChatEvent, ConnectionId};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Bound on each subscriber's outbound channel. A connection that can't keep
/// up with its scope's event rate starts losing events rather than
/// backpressuring the whole broadcast consumer loop.
pub const SINK_CAPACITY: usize = 256;

pub fn new_sink() -> (mpsc::Sender<ChatEvent>, mpsc::Receiver<ChatEvent>) {
    mpsc::channel(SINK_CAPACITY)
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    by_scope: DashMap<String, DashMap<ConnectionId, mpsc::Sender<ChatEvent>>>,
    by_connection: DashMap<ConnectionId, HashSet<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sink` as a subscriber of `scope_key` for `connection_id`.
    /// Re-subscribing the same connection to the same scope replaces its
    /// sink and is otherwise a no-op.
    pub fn subscribe(
        &self,
        connection_id: ConnectionId,
        scope_key: &str,
        sink: mpsc::Sender<ChatEvent>,
    ) {
        self.by_scope
            .entry(scope_key.to_string())
            .or_default()
            .insert(connection_id.clone(), sink);
        self.by_connection
            .entry(connection_id)
            .or_default()
            .insert(scope_key.to_string());
    }

    /// Removes `connection_id` from `scope_key`'s subscriber set. Idempotent.
    pub fn unsubscribe(&self, connection_id: &ConnectionId, scope_key: &str) {
        if let Some(scope_subs) = self.by_scope.get(scope_key) {
            scope_subs.remove(connection_id);
            if scope_subs.is_empty() {
                drop(scope_subs);
                self.by_scope.remove(scope_key);
            }
        }
        if let Some(mut scopes) = self.by_connection.get_mut(connection_id) {
            scopes.remove(scope_key);
        }
    }

    /// Removes `connection_id` from every scope it was subscribed to.
    pub fn drop_connection(&self, connection_id: &ConnectionId) {
        if let Some((_, scopes)) = self.by_connection.remove(connection_id) {
            for scope_key in scopes {
                if let Some(scope_subs) = self.by_scope.get(&scope_key) {
                    scope_subs.remove(connection_id);
                    let empty = scope_subs.is_empty();
                    drop(scope_subs);
                    if empty {
                        self.by_scope.remove(&scope_key);
                    }
                }
            }
        }
    }

    /// Delivers `event` to every live subscriber of `scope_key`. Returns the
    /// number of subscribers the event was successfully enqueued to.
    pub fn deliver(&self, scope_key: &str, event: &ChatEvent) -> usize {
        let Some(scope_subs) = self.by_scope.get(scope_key) else {
            return 0;
        };
        let mut delivered = 0;
        for entry in scope_subs.iter() {
            match entry.value().try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection_id = %entry.key(), scope_key, "dropping event, subscriber sink full");
                    metrics::counter!("chatify_broadcast_dropped_total").increment(1);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    metrics::counter!("chatify_broadcast_dropped_total").increment(1);
                }
            }
        }
        if delivered > 0 {
            metrics::counter!("chatify_broadcast_delivered_total").increment(delivered as u64);
        }
        delivered
    }

    pub fn subscriber_count(&self, scope_key: &str) -> usize {
        self.by_scope.get(scope_key).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatify_core::ScopeType;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn sample_event(scope_id: &str) -> ChatEvent {
        ChatEvent {
            message_id: Uuid::new_v4(),
            scope_type: ScopeType::Channel,
            scope_id: scope_id.into(),
            sender_id: "u-1".into(),
            text: "hi".into(),
            created_at_utc: OffsetDateTime::now_utc(),
            origin_pod_id: "replica-a".into(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_event_for_its_scope_only() {
        let registry = SubscriptionRegistry::new();
        let (tx_a, mut rx_a) = new_sink();
        let (tx_b, mut rx_b) = new_sink();
        registry.subscribe(ConnectionId("conn-a".into()), "0:s1", tx_a);
        registry.subscribe(ConnectionId("conn-b".into()), "0:s2", tx_b);

        let delivered = registry.deliver("0:s1", &sample_event("s1"));
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_deliveries() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = new_sink();
        let conn = ConnectionId("conn-a".into());
        registry.subscribe(conn.clone(), "0:s1", tx);
        registry.unsubscribe(&conn, "0:s1");

        registry.deliver("0:s1", &sample_event("s1"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drop_connection_removes_all_its_subscriptions() {
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = new_sink();
        let conn = ConnectionId("conn-a".into());
        registry.subscribe(conn.clone(), "0:s1", tx.clone());
        registry.subscribe(conn.clone(), "0:s2", tx);
        registry.drop_connection(&conn);

        assert_eq!(registry.subscriber_count("0:s1"), 0);
        assert_eq!(registry.subscriber_count("0:s2"), 0);
    }

    #[tokio::test]
    async fn resubscribing_same_connection_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let (tx1, _rx1) = new_sink();
        let (tx2, mut rx2) = new_sink();
        let conn = ConnectionId("conn-a".into());
        registry.subscribe(conn.clone(), "0:s1", tx1);
        registry.subscribe(conn.clone(), "0:s1", tx2);

        assert_eq!(registry.subscriber_count("0:s1"), 1);
        registry.deliver("0:s1", &sample_event("s1"));
        assert!(rx2.try_recv().is_ok());
    }
}
