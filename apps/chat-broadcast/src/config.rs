use std::net::SocketAddr;

use anyhow::{Context, Result};
use chatify_core::validate_id;

/// Flat, case-insensitive env-var configuration for the broadcast service,
/// read with plain `std::env::var` and typed defaults (see `chat-gateway`'s
/// `GatewayConfig::from_env()` for the pattern this follows).
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub nats_url: String,
    pub addr: SocketAddr,
    pub topic_name: String,
    pub partitions: u32,
    pub broadcast_group_prefix: String,
    pub replica_id: String,

    pub consumer_backoff_initial_ms: u64,
    pub consumer_backoff_max_ms: u64,

    pub max_payload_log_bytes: usize,
}

impl BroadcastConfig {
    pub fn from_env() -> Result<Self> {
        let nats_url =
            std::env::var("LOG_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "nats://127.0.0.1:4222".into());
        let addr: SocketAddr = std::env::var("BROADCAST_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8081".into())
            .parse()
            .context("invalid BROADCAST_ADDR")?;
        let topic_name = std::env::var("LOG_TOPIC_NAME").unwrap_or_else(|_| "chat-events".into());
        let partitions = std::env::var("LOG_PARTITIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let broadcast_group_prefix =
            std::env::var("LOG_BROADCAST_GROUP_PREFIX").unwrap_or_else(|_| "chat-broadcast".into());
        let replica_id = std::env::var("ENV_REPLICA_ID").unwrap_or_else(|_| "broadcast-0".into());
        validate_id("Env.ReplicaId", &replica_id).map_err(|err| anyhow::anyhow!("{err}"))?;

        let consumer_backoff_initial_ms = std::env::var("BROADCAST_CONSUMER_BACKOFF_INITIAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(200);
        let consumer_backoff_max_ms = std::env::var("BROADCAST_CONSUMER_BACKOFF_MAX_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000);

        let max_payload_log_bytes = std::env::var("BROADCAST_MAX_PAYLOAD_LOG_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(256);

        Ok(Self {
            nats_url,
            addr,
            topic_name,
            partitions,
            broadcast_group_prefix,
            replica_id,
            consumer_backoff_initial_ms,
            consumer_backoff_max_ms,
            max_payload_log_bytes,
        })
    }
}
