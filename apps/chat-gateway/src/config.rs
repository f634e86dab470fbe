use std::net::SocketAddr;

use anyhow::{Context, Result};
use chatify_core::validate_id;

/// Flat, case-insensitive env-var configuration for the gateway, read with
/// plain `std::env::var` and typed defaults (see `apps/messaging-egress`'s
/// `EgressConfig::from_env()` for the pattern this follows).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub nats_url: String,
    pub addr: SocketAddr,
    pub topic_name: String,
    pub partitions: u32,
    pub replica_id: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let nats_url =
            std::env::var("LOG_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "nats://127.0.0.1:4222".into());
        let addr: SocketAddr = std::env::var("GATEWAY_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".into())
            .parse()
            .context("invalid GATEWAY_ADDR")?;
        let topic_name = std::env::var("LOG_TOPIC_NAME").unwrap_or_else(|_| "chat-events".into());
        let partitions = std::env::var("LOG_PARTITIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let replica_id = std::env::var("ENV_REPLICA_ID").unwrap_or_else(|_| "gateway-0".into());
        validate_id("Env.ReplicaId", &replica_id)
            .map_err(|err| anyhow::anyhow!("{err}"))?;

        Ok(Self {
            nats_url,
            addr,
            topic_name,
            partitions,
            replica_id,
        })
    }
}
