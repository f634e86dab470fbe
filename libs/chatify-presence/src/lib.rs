//! Presence store (C4): `UserId -> set<ConnectionId>`, TTL = 60s refreshed on
//! heartbeat. Best-effort: failures are logged and swallowed on the
//! connect/disconnect paths so presence bookkeeping never fails a user
//! action — stale records age out of the TTL on their own.

mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

use std::{env, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryPresenceStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisPresenceStore;

/// Shared presence store handle used across replicas.
pub type SharedPresenceStore = Arc<dyn PresenceStore>;

/// TTL applied to a connection's presence entry; refreshed by `heartbeat`.
pub const PRESENCE_TTL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Records that `connection_id` (owned by `replica_id`) belongs to `user_id`.
    async fn set_online(&self, user_id: &str, connection_id: &str, replica_id: &str) -> Result<()>;

    /// Removes `connection_id` from `user_id`'s presence set.
    async fn set_offline(&self, user_id: &str, connection_id: &str) -> Result<()>;

    /// Refreshes the TTL on `connection_id` without changing its membership.
    async fn heartbeat(&self, user_id: &str, connection_id: &str) -> Result<()>;

    /// Returns the set of connection ids currently online for `user_id`.
    async fn connections_for_user(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Returns an in-memory presence store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedPresenceStore {
    Arc::new(MemoryPresenceStore::new())
}

/// Builds a presence store from environment variables.
///
/// If `CACHE_CONNECTION_STRING` is present and the `redis-store` feature is
/// enabled, a Redis-backed store is created. Otherwise falls back to the
/// in-memory implementation (suitable for single-replica deployments and tests).
pub async fn store_from_env() -> Result<SharedPresenceStore> {
    match env::var("CACHE_CONNECTION_STRING") {
        Ok(url) => build_redis_store(&url).await,
        Err(_) => Ok(shared_memory_store()),
    }
}

#[cfg(feature = "redis-store")]
async fn build_redis_store(url: &str) -> Result<SharedPresenceStore> {
    let store = RedisPresenceStore::connect(url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-store"))]
async fn build_redis_store(_url: &str) -> Result<SharedPresenceStore> {
    tracing::warn!("redis-store feature disabled; using in-memory presence store");
    Ok(shared_memory_store())
}
