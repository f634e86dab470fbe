//! Schema migration runner (C13).
//!
//! A one-shot startup step: connect, ensure the keyspace and the ledger
//! table (`Schema.MigrationTable`, default `schema_migrations`) exist, list
//! what's already applied, apply whatever's missing in declared order,
//! record each success. Whether a failed migration aborts the remaining set
//! is governed by `fail_fast`.

#[cfg(feature = "scylla-store")]
mod scylla_runner;

use async_trait::async_trait;

#[cfg(feature = "scylla-store")]
pub use scylla_runner::ScyllaMigrationRunner;

/// One migration, keyed by the stable `(module, id)` pair used for the
/// ledger's primary key. `apply` must be idempotent on its own even though
/// the ledger also guards against re-applying it.
pub struct Migration {
    pub module: &'static str,
    pub id: &'static str,
    pub ddl: &'static str,
}

#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub module: String,
    pub id: String,
    pub applied_at_utc: time::OffsetDateTime,
    pub applied_by: String,
}

#[derive(thiserror::Error, Debug)]
pub enum MigrationError {
    #[error("failed to connect to schema store: {0}")]
    Connect(#[source] anyhow::Error),
    #[error("migration {module}/{id} failed: {source}")]
    Apply {
        module: String,
        id: String,
        #[source]
        source: anyhow::Error,
    },
}

#[async_trait]
pub trait MigrationRunner: Send + Sync {
    async fn applied(&self) -> Result<Vec<MigrationRecord>, MigrationError>;
    async fn apply(&self, migration: &Migration, applied_by: &str) -> Result<(), MigrationError>;
}

/// Declared migrations, in the order they must apply. Chatify's own schema
/// lives here; a deployment embedding this crate can extend the list.
///
/// The ledger table itself (`Schema.MigrationTable`) is bootstrapped
/// separately by the runner, under its own configurable name, since it must
/// exist before `applied()` can even be queried to compute this list's
/// pending set.
pub fn chatify_migrations() -> Vec<Migration> {
    vec![Migration {
        module: "chatify",
        id: "0001_chat_messages",
        ddl: r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                scope_id text,
                created_at_utc timestamp,
                message_id uuid,
                sender_id text,
                text text,
                origin_replica_id text,
                broker_partition int,
                broker_offset bigint,
                PRIMARY KEY (scope_id, created_at_utc, message_id)
            ) WITH CLUSTERING ORDER BY (created_at_utc ASC, message_id ASC)
        "#,
    }]
}

/// Applies every migration from `chatify_migrations()` (or `migrations`, for
/// callers embedding additional ones) that isn't already in the runner's
/// ledger, in declared order. `fail_fast = true` stops at the first failure;
/// otherwise every remaining migration is still attempted and the first
/// error encountered is returned once the pass completes.
pub async fn run_pending(
    runner: &dyn MigrationRunner,
    migrations: &[Migration],
    applied_by: &str,
    fail_fast: bool,
) -> Result<usize, MigrationError> {
    let applied = runner.applied().await?;
    let is_applied = |m: &Migration| {
        applied
            .iter()
            .any(|rec| rec.module == m.module && rec.id == m.id)
    };

    let mut applied_count = 0;
    let mut first_error = None;
    for migration in migrations.iter().filter(|m| !is_applied(m)) {
        match runner.apply(migration, applied_by).await {
            Ok(()) => {
                tracing::info!(module = migration.module, id = migration.id, "migration applied");
                applied_count += 1;
            }
            Err(err) => {
                tracing::error!(module = migration.module, id = migration.id, error = %err, "migration failed");
                if fail_fast {
                    return Err(err);
                }
                first_error.get_or_insert(err);
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }
    Ok(applied_count)
}
