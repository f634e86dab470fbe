use anyhow::Result;
use chat_persister::config::PersisterConfig;
use chatify_telemetry::{init_telemetry, TelemetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_cfg = TelemetryConfig::from_env("chat-persister", env!("CARGO_PKG_VERSION"));
    init_telemetry(telemetry_cfg)?;

    let config = PersisterConfig::from_env()?;
    info!(replica_id = %config.replica_id, keyspace = %config.store_keyspace, "chat-persister starting");

    let history = chat_persister::build_history_store(&config).await?;

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        signal_shutdown.cancel();
    });

    chat_persister::run(&config, history, shutdown).await
}
