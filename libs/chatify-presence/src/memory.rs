use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Instant;

use crate::{PresenceStore, PRESENCE_TTL};

struct ConnectionEntry {
    expires_at: Instant,
}

/// In-memory presence store for single-replica deployments and tests.
/// TTL expiry is evaluated lazily on read, matching how the Redis-backed
/// implementation relies on the cache's own key expiry.
#[derive(Default)]
pub struct MemoryPresenceStore {
    by_user: DashMap<String, HashSet<String>>,
    connections: DashMap<String, ConnectionEntry>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self {
            by_user: DashMap::new(),
            connections: DashMap::new(),
        }
    }

    fn is_live(&self, connection_id: &str) -> bool {
        self.connections
            .get(connection_id)
            .map(|e| e.expires_at > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn set_online(
        &self,
        user_id: &str,
        connection_id: &str,
        _replica_id: &str,
    ) -> Result<()> {
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        self.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                expires_at: Instant::now() + PRESENCE_TTL,
            },
        );
        Ok(())
    }

    async fn set_offline(&self, user_id: &str, connection_id: &str) -> Result<()> {
        self.connections.remove(connection_id);
        if let Some(mut set) = self.by_user.get_mut(user_id) {
            set.remove(connection_id);
            if set.is_empty() {
                drop(set);
                self.by_user.remove(user_id);
            }
        }
        Ok(())
    }

    async fn heartbeat(&self, _user_id: &str, connection_id: &str) -> Result<()> {
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.expires_at = Instant::now() + PRESENCE_TTL;
        }
        Ok(())
    }

    async fn connections_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        let Some(set) = self.by_user.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(set
            .iter()
            .filter(|conn| self.is_live(conn))
            .cloned()
            .collect())
    }
}
