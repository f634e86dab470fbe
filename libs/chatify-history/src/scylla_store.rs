use async_trait::async_trait;
use chatify_core::{ChatEvent, ScopeType};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::prepared::PreparedStatement;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{HistoryError, HistoryRow, HistoryStore};

const INSERT_MESSAGE: &str = r#"
    INSERT INTO chat_messages
        (scope_id, created_at_utc, message_id, sender_id, text,
         origin_replica_id, broker_partition, broker_offset)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    IF NOT EXISTS
"#;

const SELECT_MESSAGES: &str = r#"
    SELECT scope_id, created_at_utc, message_id, sender_id, text,
           origin_replica_id, broker_partition, broker_offset
    FROM chat_messages
    WHERE scope_id = ? AND created_at_utc >= ? AND created_at_utc < ?
    ORDER BY created_at_utc ASC
    LIMIT ?
"#;

pub struct ScyllaHistoryStore {
    session: Session,
    insert: PreparedStatement,
    select: PreparedStatement,
}

impl ScyllaHistoryStore {
    pub async fn connect(contact_points: &[String], keyspace: &str) -> anyhow::Result<Self> {
        let session = SessionBuilder::new()
            .known_nodes(contact_points)
            .use_keyspace(keyspace, false)
            .build()
            .await?;
        let insert = session.prepare(INSERT_MESSAGE).await?;
        let select = session.prepare(SELECT_MESSAGES).await?;
        Ok(Self {
            session,
            insert,
            select,
        })
    }
}

#[async_trait]
impl HistoryStore for ScyllaHistoryStore {
    async fn append(
        &self,
        event: &ChatEvent,
        broker_partition: i32,
        broker_offset: i64,
    ) -> Result<(), HistoryError> {
        let scope_key = chatify_core::scope_key(event.scope_type, &event.scope_id);
        self.session
            .execute_unpaged(
                &self.insert,
                (
                    scope_key,
                    event.created_at_utc,
                    event.message_id,
                    event.sender_id.clone(),
                    event.text.clone(),
                    event.origin_pod_id.clone(),
                    broker_partition,
                    broker_offset,
                ),
            )
            .await
            .map_err(|err| classify(anyhow::Error::new(err)))?;
        Ok(())
    }

    async fn fetch(
        &self,
        scope_type: ScopeType,
        scope_id: &str,
        from_utc: Option<OffsetDateTime>,
        to_utc: Option<OffsetDateTime>,
        limit: u32,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let scope_key = chatify_core::scope_key(scope_type, scope_id);
        let from = from_utc.unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let to = to_utc.unwrap_or_else(|| OffsetDateTime::now_utc() + time::Duration::days(365));
        let result = self
            .session
            .execute_unpaged(&self.select, (scope_key, from, to, limit as i32))
            .await
            .map_err(|err| classify(anyhow::Error::new(err)))?;

        let rows = result
            .into_rows_result()
            .map_err(|err| classify(anyhow::Error::new(err)))?;
        let mut out = Vec::new();
        for row in rows
            .rows::<(
                String,
                OffsetDateTime,
                Uuid,
                String,
                String,
                String,
                i32,
                i64,
            )>()
            .map_err(|err| classify(anyhow::Error::new(err)))?
        {
            let (_scope_key, created_at_utc, message_id, sender_id, text, origin_replica_id, broker_partition, broker_offset) =
                row.map_err(|err| classify(anyhow::Error::new(err)))?;
            out.push(HistoryRow {
                message_id,
                scope_type,
                scope_id: scope_id.to_string(),
                sender_id,
                text,
                created_at_utc,
                origin_replica_id,
                broker_partition,
                broker_offset,
            });
        }
        Ok(out)
    }
}

/// Classifies a driver error as transient (retryable with backoff) or
/// permanent (poison, safe to skip). Connection/timeout/availability errors
/// are transient; everything else is treated as permanent since Scylla's
/// driver surfaces schema/type mismatches as generic query errors too.
fn classify(err: anyhow::Error) -> HistoryError {
    let message = err.to_string().to_lowercase();
    let transient = message.contains("timeout")
        || message.contains("unavailable")
        || message.contains("connection")
        || message.contains("no connections")
        || message.contains("io error");
    if transient {
        HistoryError::Transient(err)
    } else {
        HistoryError::Permanent(err)
    }
}
