//! Persister consumer (C10): shared consumer group across every replica,
//! writing each decoded event into the history store (C11) exactly once.
//!
//! Two-level error isolation per message (see the module-level write path in
//! `write_with_retry`):
//! - Inner: a malformed payload, a validation failure, or a permanent store
//!   error is poison — logged and committed so it can never stall the
//!   partition.
//! - Outer: a transient store error retries up to `retry_max_attempts` with
//!   backoff+jitter and a circuit breaker guarding the store; exhausting
//!   retries leaves the record uncommitted so it redelivers after the outer
//!   loop's own backoff sleep.

use std::sync::Arc;

use anyhow::Result;
use async_nats::jetstream::{
    self,
    consumer::{push::Config as PushConfig, AckPolicy},
};
use chatify_backoff::circuit::{CircuitBreaker, CircuitLabels, CircuitSettings};
use chatify_backoff::{Backoff, BackoffConfig};
use chatify_core::{validate_id, ChatEvent};
use chatify_history::{HistoryError, SharedHistoryStore};
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::PersisterConfig;

pub async fn run(
    config: &PersisterConfig,
    history: SharedHistoryStore,
    shutdown: CancellationToken,
) -> Result<()> {
    let client = async_nats::connect(&config.nats_url).await?;
    let js = jetstream::new(client);
    let stream = js.get_stream(&config.topic_name).await?;

    let deliver_subject = format!("deliver.{}", config.shared_group_id);
    let filter_subject = format!("{}.*", config.topic_name);
    let consumer = stream
        .get_or_create_consumer(
            &config.shared_group_id,
            PushConfig {
                durable_name: Some(config.shared_group_id.clone()),
                deliver_subject,
                deliver_group: Some(config.shared_group_id.clone()),
                filter_subject,
                ack_policy: AckPolicy::Explicit,
                max_ack_pending: 512,
                ..Default::default()
            },
        )
        .await?;

    info!(
        consumer = %config.shared_group_id,
        topic = %config.topic_name,
        "persister consumer listening"
    );

    let mut messages = consumer.messages().await?;
    let mut outer_backoff = Backoff::new(BackoffConfig {
        initial: Duration::from_millis(config.consumer_backoff_initial_ms),
        max: Duration::from_millis(config.consumer_backoff_max_ms),
        ..Default::default()
    });
    let mut circuit = CircuitBreaker::new(
        CircuitSettings::default(),
        CircuitLabels::new("persister_consumer", config.replica_id.clone()),
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(consumer = %config.shared_group_id, "persister consumer shutting down");
                break;
            }
            next = messages.next() => {
                match next {
                    Some(Ok(message)) => {
                        match process_one(&message, history.as_ref(), config, &mut circuit).await {
                            Outcome::Commit => {
                                if let Err(err) = message.ack().await {
                                    warn!(error = %err, "failed to ack persister delivery");
                                }
                                outer_backoff.reset();
                            }
                            Outcome::Retry => {
                                outer_backoff.sleep_next().await;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "missing message from JetStream, retrying");
                        outer_backoff.sleep_next().await;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

enum Outcome {
    Commit,
    Retry,
}

async fn process_one(
    message: &jetstream::Message,
    history: &dyn chatify_history::HistoryStore,
    config: &PersisterConfig,
    circuit: &mut CircuitBreaker,
) -> Outcome {
    let event: ChatEvent = match serde_json::from_slice(&message.payload) {
        Ok(event) => event,
        Err(err) => {
            let preview_len = message.payload.len().min(config.max_payload_log_bytes);
            let preview: String = String::from_utf8_lossy(&message.payload[..preview_len]).into();
            error!(error = %err, preview, "skipping undecodable persister payload");
            return Outcome::Commit;
        }
    };

    if let Err(err) = validate_id("scopeId", &event.scope_id) {
        warn!(error = %err, message_id = %event.message_id, "skipping event with invalid scope");
        return Outcome::Commit;
    }

    // The broker-level partition/offset are JetStream implementation details
    // the history row carries for diagnostics only; derive them from the
    // delivered subject rather than trusting caller-supplied values.
    let broker_partition = message
        .subject
        .rsplit('.')
        .next()
        .and_then(|s| s.parse::<i32>().ok())
        .unwrap_or(0);
    let broker_offset = message.info().map(|info| info.stream_sequence as i64).unwrap_or(0);

    write_with_retry(history, &event, broker_partition, broker_offset, config, circuit).await
}

async fn write_with_retry(
    history: &dyn chatify_history::HistoryStore,
    event: &ChatEvent,
    broker_partition: i32,
    broker_offset: i64,
    config: &PersisterConfig,
    circuit: &mut CircuitBreaker,
) -> Outcome {
    let mut retry = Backoff::new(BackoffConfig {
        initial: Duration::from_millis(config.retry_base_ms),
        max: Duration::from_millis(config.retry_max_ms),
        ..Default::default()
    });

    for attempt in 1..=config.retry_max_attempts {
        circuit.before_request().await;
        match history.append(event, broker_partition, broker_offset).await {
            Ok(()) => {
                circuit.on_success();
                metrics::counter!("chatify_persister_writes_total").increment(1);
                return Outcome::Commit;
            }
            Err(HistoryError::Permanent(err)) => {
                circuit.on_success();
                error!(error = %err, message_id = %event.message_id, "permanent history store error, skipping");
                return Outcome::Commit;
            }
            Err(HistoryError::Transient(err)) => {
                circuit.on_failure();
                metrics::counter!("chatify_persister_retries_total").increment(1);
                warn!(
                    error = %err,
                    attempt,
                    message_id = %event.message_id,
                    "transient history store error, retrying"
                );
                if attempt < config.retry_max_attempts {
                    retry.sleep_next().await;
                }
            }
        }
    }

    Outcome::Retry
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatify_core::ScopeType;
    use chatify_history::MemoryHistoryStore;
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

    fn config() -> PersisterConfig {
        PersisterConfig {
            nats_url: "nats://127.0.0.1:4222".into(),
            topic_name: "chat-events".into(),
            shared_group_id: "chat-persister".into(),
            replica_id: "persister-0".into(),
            store_contact_points: vec!["127.0.0.1:9042".into()],
            store_keyspace: "chatify".into(),
            retry_max_attempts: 3,
            retry_base_ms: 1,
            retry_max_ms: 5,
            consumer_backoff_initial_ms: 1,
            consumer_backoff_max_ms: 5,
            schema_apply_on_startup: true,
            schema_fail_fast: true,
            schema_migration_table: "schema_migrations".into(),
            max_payload_log_bytes: 256,
        }
    }

    #[tokio::test]
    async fn writes_event_on_first_attempt() {
        let history = MemoryHistoryStore::new();
        let mut circuit = CircuitBreaker::new(
            CircuitSettings::default(),
            CircuitLabels::new("persister_consumer", "test"),
        );
        let outcome = write_with_retry(&history, &event("general"), 0, 0, &config(), &mut circuit).await;
        assert!(matches!(outcome, Outcome::Commit));

        let rows = history
            .fetch(ScopeType::Channel, "general", None, None, 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn appending_same_event_twice_stays_idempotent() {
        let history = MemoryHistoryStore::new();
        let mut circuit = CircuitBreaker::new(
            CircuitSettings::default(),
            CircuitLabels::new("persister_consumer", "test"),
        );
        let ev = event("general");
        write_with_retry(&history, &ev, 0, 0, &config(), &mut circuit).await;
        write_with_retry(&history, &ev, 0, 0, &config(), &mut circuit).await;

        let rows = history
            .fetch(ScopeType::Channel, "general", None, None, 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
