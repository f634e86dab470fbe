use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::{PresenceStore, PRESENCE_TTL};

pub struct RedisPresenceStore {
    connection: Mutex<redis::aio::ConnectionManager>,
}

impl RedisPresenceStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            connection: Mutex::new(manager),
        })
    }

    fn presence_key(user_id: &str) -> String {
        format!("presence:{user_id}")
    }

    fn connection_key(connection_id: &str) -> String {
        format!("conn:{connection_id}")
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn set_online(
        &self,
        user_id: &str,
        connection_id: &str,
        replica_id: &str,
    ) -> Result<()> {
        let presence_key = Self::presence_key(user_id);
        let connection_key = Self::connection_key(connection_id);
        let mut conn = self.connection.lock().await;
        redis::pipe()
            .cmd("SADD")
            .arg(&presence_key)
            .arg(connection_id)
            .ignore()
            .cmd("SET")
            .arg(&connection_key)
            .arg(replica_id)
            .arg("EX")
            .arg(PRESENCE_TTL.as_secs())
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn set_offline(&self, user_id: &str, connection_id: &str) -> Result<()> {
        let presence_key = Self::presence_key(user_id);
        let connection_key = Self::connection_key(connection_id);
        let mut conn = self.connection.lock().await;
        redis::pipe()
            .cmd("SREM")
            .arg(&presence_key)
            .arg(connection_id)
            .ignore()
            .cmd("DEL")
            .arg(&connection_key)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn heartbeat(&self, _user_id: &str, connection_id: &str) -> Result<()> {
        let connection_key = Self::connection_key(connection_id);
        let mut conn = self.connection.lock().await;
        let _: () = conn.expire(connection_key, PRESENCE_TTL.as_secs() as i64).await?;
        Ok(())
    }

    async fn connections_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        let presence_key = Self::presence_key(user_id);
        let mut conn = self.connection.lock().await;
        let members: Vec<String> = conn.smembers(&presence_key).await?;
        if members.is_empty() {
            return Ok(members);
        }
        let keys: Vec<String> = members.iter().map(|m| Self::connection_key(m)).collect();
        let alive: Vec<bool> = conn.exists(&keys).await?;
        let mut live = Vec::new();
        let mut stale = Vec::new();
        for (member, is_alive) in members.into_iter().zip(alive) {
            if is_alive {
                live.push(member);
            } else {
                stale.push(member);
            }
        }
        if !stale.is_empty() {
            let _: () = conn.srem(&presence_key, stale).await?;
        }
        Ok(live)
    }
}
