use anyhow::{Context, Result};
use chatify_core::validate_id;

/// Flat, case-insensitive env-var configuration for the persister, read with
/// plain `std::env::var` and typed defaults (see `chat-gateway`'s
/// `GatewayConfig::from_env()` for the pattern this follows).
#[derive(Debug, Clone)]
pub struct PersisterConfig {
    pub nats_url: String,
    pub topic_name: String,
    pub shared_group_id: String,
    pub replica_id: String,

    pub store_contact_points: Vec<String>,
    pub store_keyspace: String,

    pub retry_max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub consumer_backoff_initial_ms: u64,
    pub consumer_backoff_max_ms: u64,

    pub schema_apply_on_startup: bool,
    pub schema_fail_fast: bool,
    pub schema_migration_table: String,

    pub max_payload_log_bytes: usize,
}

impl PersisterConfig {
    pub fn from_env() -> Result<Self> {
        let nats_url =
            std::env::var("LOG_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "nats://127.0.0.1:4222".into());
        let topic_name = std::env::var("LOG_TOPIC_NAME").unwrap_or_else(|_| "chat-events".into());
        let shared_group_id =
            std::env::var("PERSISTER_SHARED_GROUP_ID").unwrap_or_else(|_| "chat-persister".into());
        let replica_id = std::env::var("ENV_REPLICA_ID").unwrap_or_else(|_| "persister-0".into());
        validate_id("Env.ReplicaId", &replica_id).map_err(|err| anyhow::anyhow!("{err}"))?;

        let store_contact_points = std::env::var("STORE_CONTACT_POINTS")
            .unwrap_or_else(|_| "127.0.0.1:9042".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let store_keyspace = std::env::var("STORE_KEYSPACE").unwrap_or_else(|_| "chatify".into());

        let retry_max_attempts = env_u32("PERSISTER_RETRY_MAX_ATTEMPTS", 5)?;
        let retry_base_ms = env_u64("PERSISTER_RETRY_BASE_MS", 200)?;
        let retry_max_ms = env_u64("PERSISTER_RETRY_MAX_MS", 30_000)?;
        let consumer_backoff_initial_ms = env_u64("PERSISTER_CONSUMER_BACKOFF_INITIAL_MS", 200)?;
        let consumer_backoff_max_ms = env_u64("PERSISTER_CONSUMER_BACKOFF_MAX_MS", 30_000)?;

        let schema_apply_on_startup = env_bool("SCHEMA_APPLY_ON_STARTUP", true)?;
        let schema_fail_fast = env_bool("SCHEMA_FAIL_FAST", true)?;
        let schema_migration_table =
            std::env::var("SCHEMA_MIGRATION_TABLE").unwrap_or_else(|_| "schema_migrations".into());

        let max_payload_log_bytes = env_usize("PERSISTER_MAX_PAYLOAD_LOG_BYTES", 256)?;

        Ok(Self {
            nats_url,
            topic_name,
            shared_group_id,
            replica_id,
            store_contact_points,
            store_keyspace,
            retry_max_attempts,
            retry_base_ms,
            retry_max_ms,
            consumer_backoff_initial_ms,
            consumer_backoff_max_ms,
            schema_apply_on_startup,
            schema_fail_fast,
            schema_migration_table,
            max_payload_log_bytes,
        })
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}
