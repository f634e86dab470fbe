//! Broadcast consumer (C8): one JetStream push consumer per replica, fed by
//! every partition subject, fanning decoded events out through the
//! [`SubscriptionRegistry`]. Unlike the persister's shared consumer group,
//! this replica's group id is unique (see `chatify_core::broadcast_group_id`)
//! so every replica observes every event and can serve whichever subscribers
//! happen to be connected to it.
//!
//! A message that fails to decode is a poison message: it is logged and
//! acked without being delivered (skip-by-committing), since no retry will
//! make invalid JSON valid.

use std::sync::Arc;

use anyhow::Result;
use async_nats::jetstream::{
    self,
    consumer::{push::Config as PushConfig, AckPolicy},
};
use chatify_backoff::{Backoff, BackoffConfig};
use chatify_core::{broadcast_group_id, scope_key, ChatEvent};
use chatify_subscriptions::SubscriptionRegistry;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::BroadcastConfig;

pub async fn run(
    config: &BroadcastConfig,
    registry: Arc<SubscriptionRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    let client = async_nats::connect(&config.nats_url).await?;
    let js = jetstream::new(client);

    let stream = js.get_stream(&config.topic_name).await?;

    let group_id = broadcast_group_id(&config.broadcast_group_prefix, &config.replica_id);
    let deliver_subject = format!("deliver.{group_id}");
    let filter_subject = format!("{}.*", config.topic_name);
    let consumer = stream
        .get_or_create_consumer(
            &group_id,
            PushConfig {
                durable_name: Some(group_id.clone()),
                deliver_subject,
                deliver_group: Some(group_id.clone()),
                filter_subject,
                ack_policy: AckPolicy::Explicit,
                max_ack_pending: 512,
                ..Default::default()
            },
        )
        .await?;

    info!(consumer = %group_id, topic = %config.topic_name, "broadcast consumer listening");

    let mut messages = consumer.messages().await?;
    let mut backoff = Backoff::new(BackoffConfig {
        initial: Duration::from_millis(config.consumer_backoff_initial_ms),
        max: Duration::from_millis(config.consumer_backoff_max_ms),
        ..Default::default()
    });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(consumer = %group_id, "broadcast consumer shutting down");
                break;
            }
            next = messages.next() => {
                match next {
                    Some(Ok(message)) => {
                        deliver_message(&registry, &message, config.max_payload_log_bytes);
                        if let Err(err) = message.ack().await {
                            warn!(error = %err, "failed to ack broadcast delivery");
                        }
                        backoff.reset();
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "missing message from JetStream, retrying");
                        backoff.sleep_next().await;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

fn deliver_message(registry: &SubscriptionRegistry, message: &jetstream::Message, max_payload_log_bytes: usize) {
    let event: ChatEvent = match serde_json::from_slice(&message.payload) {
        Ok(event) => event,
        Err(err) => {
            let preview_len = message.payload.len().min(max_payload_log_bytes);
            let preview: String = String::from_utf8_lossy(&message.payload[..preview_len]).into();
            error!(error = %err, preview, "skipping undecodable broadcast payload");
            return;
        }
    };

    let key = scope_key(event.scope_type, &event.scope_id);
    let delivered = registry.deliver(&key, &event);
    info!(
        message_id = %event.message_id,
        scope_id = %event.scope_id,
        delivered,
        "fanned out chat event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatify_core::ScopeType;
    use chatify_subscriptions::new_sink;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn event(scope_id: &str) -> ChatEvent {
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
    async fn delivers_decoded_event_to_matching_scope() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = new_sink();
        registry.subscribe(
            chatify_core::ConnectionId("conn-a".into()),
            "0:general",
            tx,
        );

        let delivered = registry.deliver(&scope_key(ScopeType::Channel, "general"), &event("general"));
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
    }
}
