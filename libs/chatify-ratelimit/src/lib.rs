//! Rate limiter (C5): fixed-window per-sender admission control.
//!
//! `check_and_increment` atomically increments a per-sender counter and sets
//! its expiry on first increment (lazy-started fixed window, approximating a
//! sliding window). Once the counter exceeds `limit_per_window` the sender is
//! denied with the remaining TTL as `retry_after`.

use std::{
    collections::HashMap,
    env,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::time::Instant;

/// Outcome of a [`RateLimiter::check_and_increment`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Per-sender limit: at most `limit_per_window` admissions per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub limit_per_window: u32,
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            limit_per_window: 20,
            window: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantRateLimit {
    limit_per_window: u32,
    window_secs: u64,
}

/// Default plus per-sender-prefix overrides, loaded from `TENANT_RATE_LIMITS`
/// (a JSON object of `{ "<prefix>": { "limitPerWindow": N, "windowSecs": N } }`).
#[derive(Debug, Clone, Default)]
pub struct RateLimits {
    pub default: RateLimit,
    pub overrides: HashMap<String, RateLimit>,
}

impl RateLimits {
    pub fn from_env() -> Self {
        let default = RateLimit {
            limit_per_window: env::var("RATE_LIMIT_PER_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            window: Duration::from_secs(
                env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1),
            ),
        };
        let overrides = env::var("TENANT_RATE_LIMITS")
            .ok()
            .and_then(|raw| serde_json::from_str::<HashMap<String, TenantRateLimit>>(&raw).ok())
            .map(|m| {
                m.into_iter()
                    .map(|(k, v)| {
                        (
                            k,
                            RateLimit {
                                limit_per_window: v.limit_per_window,
                                window: Duration::from_secs(v.window_secs),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { default, overrides }
    }

    fn for_sender(&self, sender_id: &str) -> RateLimit {
        for (prefix, limit) in &self.overrides {
            if sender_id.starts_with(prefix.as_str()) {
                return *limit;
            }
        }
        self.default
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_and_increment(&self, sender_id: &str) -> Result<Decision>;
}

/// Shared rate limiter handle.
pub type SharedRateLimiter = Arc<dyn RateLimiter>;

struct Bucket {
    count: u32,
    window_started_at: Instant,
}

/// In-process fixed-window limiter. Accurate only within a single replica;
/// used standalone for tests and single-replica deployments, and as the
/// fallback arm of [`HybridRateLimiter`].
pub struct LocalRateLimiter {
    limits: RateLimits,
    buckets: DashMap<String, Bucket>,
}

impl LocalRateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            buckets: DashMap::new(),
        }
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn check_and_increment(&self, sender_id: &str) -> Result<Decision> {
        let limit = self.limits.for_sender(sender_id);
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(sender_id.to_string())
            .or_insert_with(|| Bucket {
                count: 0,
                window_started_at: now,
            });

        if now.duration_since(bucket.window_started_at) >= limit.window {
            bucket.count = 0;
            bucket.window_started_at = now;
        }

        bucket.count += 1;
        if bucket.count > limit.limit_per_window {
            let elapsed = now.duration_since(bucket.window_started_at);
            let retry_after = limit.window.saturating_sub(elapsed);
            return Ok(Decision::Denied { retry_after });
        }
        Ok(Decision::Allowed)
    }
}

/// Redis-backed fixed-window limiter shared across replicas: `INCR
/// rate:{sender}`, with `EXPIRE` set only on the first increment of a window.
#[cfg(feature = "redis-store")]
pub struct RedisRateLimiter {
    limits: RateLimits,
    connection: tokio::sync::Mutex<redis::aio::ConnectionManager>,
}

#[cfg(feature = "redis-store")]
impl RedisRateLimiter {
    pub async fn connect(url: &str, limits: RateLimits) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            limits,
            connection: tokio::sync::Mutex::new(manager),
        })
    }

    fn key(sender_id: &str) -> String {
        format!("rate:{sender_id}")
    }
}

#[cfg(feature = "redis-store")]
#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_and_increment(&self, sender_id: &str) -> Result<Decision> {
        use redis::AsyncCommands;

        let limit = self.limits.for_sender(sender_id);
        let key = Self::key(sender_id);
        let mut conn = self.connection.lock().await;
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&key, limit.window.as_secs() as i64).await?;
        }
        if count as u32 > limit.limit_per_window {
            let ttl: i64 = conn.ttl(&key).await?;
            let retry_after = Duration::from_secs(ttl.max(0) as u64);
            return Ok(Decision::Denied { retry_after });
        }
        Ok(Decision::Allowed)
    }
}

/// Tries the remote limiter first; falls back to a local limiter when the
/// remote store is unreachable, so a cache outage degrades admission control
/// to per-replica accuracy instead of failing every send.
#[cfg(feature = "redis-store")]
pub struct HybridRateLimiter {
    remote: RedisRateLimiter,
    local: LocalRateLimiter,
    remote_failed: AtomicBool,
}

#[cfg(feature = "redis-store")]
impl HybridRateLimiter {
    pub fn new(remote: RedisRateLimiter, local: LocalRateLimiter) -> Self {
        Self {
            remote,
            local,
            remote_failed: AtomicBool::new(false),
        }
    }
}

#[cfg(feature = "redis-store")]
#[async_trait]
impl RateLimiter for HybridRateLimiter {
    async fn check_and_increment(&self, sender_id: &str) -> Result<Decision> {
        match self.remote.check_and_increment(sender_id).await {
            Ok(decision) => {
                self.remote_failed.store(false, Ordering::Relaxed);
                Ok(decision)
            }
            Err(err) => {
                tracing::warn!(error = %err, "remote rate limiter unavailable, using local fallback");
                self.remote_failed.store(true, Ordering::Relaxed);
                self.local.check_and_increment(sender_id).await
            }
        }
    }
}

/// Builds a rate limiter from environment variables: `CACHE_CONNECTION_STRING`
/// selects the Redis-backed limiter when the `redis-store` feature is
/// enabled; otherwise falls back to the in-process limiter.
pub async fn limiter_from_env() -> Result<SharedRateLimiter> {
    let limits = RateLimits::from_env();
    #[cfg(feature = "redis-store")]
    {
        if let Ok(url) = env::var("CACHE_CONNECTION_STRING") {
            let remote = RedisRateLimiter::connect(&url, limits.clone()).await?;
            let local = LocalRateLimiter::new(limits);
            return Ok(Arc::new(HybridRateLimiter::new(remote, local)));
        }
    }
    Ok(Arc::new(LocalRateLimiter::new(limits)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_limits(limit_per_window: u32, window: Duration) -> RateLimits {
        RateLimits {
            default: RateLimit {
                limit_per_window,
                window,
            },
            overrides: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn allows_up_to_the_limit_then_denies() {
        let limiter = LocalRateLimiter::new(test_limits(5, Duration::from_secs(10)));
        for _ in 0..5 {
            assert!(limiter.check_and_increment("u-2").await.unwrap().is_allowed());
        }
        let decision = limiter.check_and_increment("u-2").await.unwrap();
        assert!(matches!(decision, Decision::Denied { .. }));
    }

    #[tokio::test]
    async fn senders_are_independent() {
        let limiter = LocalRateLimiter::new(test_limits(1, Duration::from_secs(10)));
        assert!(limiter.check_and_increment("a").await.unwrap().is_allowed());
        assert!(limiter.check_and_increment("b").await.unwrap().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_elapsed_duration() {
        let limiter = LocalRateLimiter::new(test_limits(1, Duration::from_millis(50)));
        assert!(limiter.check_and_increment("u-3").await.unwrap().is_allowed());
        assert!(!limiter.check_and_increment("u-3").await.unwrap().is_allowed());
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(limiter.check_and_increment("u-3").await.unwrap().is_allowed());
    }

    #[test]
    fn tenant_overrides_parse_from_env_json() {
        // SAFETY: test runs single-threaded w.r.t. this env var.
        unsafe {
            std::env::set_var(
                "TENANT_RATE_LIMITS",
                r#"{"bot-": {"limitPerWindow": 100, "windowSecs": 1}}"#,
            );
        }
        let limits = RateLimits::from_env();
        unsafe {
            std::env::remove_var("TENANT_RATE_LIMITS");
        }
        let over = limits.for_sender("bot-42");
        assert_eq!(over.limit_per_window, 100);
    }
}
