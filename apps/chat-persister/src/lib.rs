pub mod config;
pub mod consumer;

use anyhow::Result;
use chatify_history::{HistoryStore, ScyllaHistoryStore, SharedHistoryStore};
use chatify_migrate::{chatify_migrations, run_pending, ScyllaMigrationRunner};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::PersisterConfig;

/// Applies pending schema migrations (if configured to) and connects the
/// history store.
pub async fn build_history_store(config: &PersisterConfig) -> Result<SharedHistoryStore> {
    if config.schema_apply_on_startup {
        let runner = ScyllaMigrationRunner::connect(
            &config.store_contact_points,
            &config.store_keyspace,
            &config.schema_migration_table,
        )
        .await?;
        run_pending(&runner, &chatify_migrations(), &config.replica_id, config.schema_fail_fast).await?;
    }

    let store = ScyllaHistoryStore::connect(&config.store_contact_points, &config.store_keyspace).await?;
    let shared: SharedHistoryStore = Arc::new(store);
    Ok(shared)
}

/// Runs the persister consumer loop until `shutdown` is cancelled.
pub async fn run(
    config: &PersisterConfig,
    history: Arc<dyn HistoryStore>,
    shutdown: CancellationToken,
) -> Result<()> {
    consumer::run(config, history, shutdown).await
}
