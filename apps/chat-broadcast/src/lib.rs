pub mod config;
pub mod consumer;
pub mod ws;

use std::sync::Arc;

use anyhow::Result;
use chatify_presence::store_from_env;
use chatify_subscriptions::SubscriptionRegistry;
use tokio_util::sync::CancellationToken;

use crate::config::BroadcastConfig;
use crate::ws::BroadcastState;

/// Builds the subscription hub's router and the registry handle needed to
/// drive the consumer loop alongside it.
pub async fn build(config: &BroadcastConfig) -> Result<(axum::Router, Arc<SubscriptionRegistry>)> {
    let registry = Arc::new(SubscriptionRegistry::new());
    let presence = store_from_env().await?;

    let state = BroadcastState {
        registry: registry.clone(),
        presence,
        replica_id: config.replica_id.clone(),
    };
    Ok((ws::build_router(state), registry))
}

/// Runs the broadcast consumer loop until `shutdown` is cancelled.
pub async fn run_consumer(
    config: &BroadcastConfig,
    registry: Arc<SubscriptionRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    consumer::run(config, registry, shutdown).await
}
