pub mod config;
pub mod http;

use std::sync::Arc;

use anyhow::Result;
use async_nats::jetstream;
use chatify_core::SystemClock;
use chatify_producer::{JetStreamEventProducer, SharedEventProducer};
use chatify_ratelimit::limiter_from_env;

use crate::config::GatewayConfig;
use crate::http::GatewayState;

/// Connects to the log and builds the gateway's router, ready to be served.
pub async fn build_router(config: &GatewayConfig) -> Result<axum::Router> {
    let client = async_nats::connect(&config.nats_url).await?;
    let js = jetstream::new(client);
    let producer = JetStreamEventProducer::new(js, config.topic_name.clone(), config.partitions);
    producer.ensure_stream().await?;
    let shared_producer: SharedEventProducer = Arc::new(producer);
    let rate_limiter = limiter_from_env().await?;

    let state = GatewayState {
        producer: shared_producer,
        rate_limiter,
        clock: Arc::new(SystemClock),
        replica_id: config.replica_id.clone(),
    };
    Ok(http::build_router(state))
}
