use anyhow::Result;
use axum::serve;
use chat_broadcast::config::BroadcastConfig;
use chatify_telemetry::{init_telemetry, TelemetryConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_cfg = TelemetryConfig::from_env("chat-broadcast", env!("CARGO_PKG_VERSION"));
    init_telemetry(telemetry_cfg)?;

    let config = BroadcastConfig::from_env()?;
    let (router, registry) = chat_broadcast::build(&config).await?;
    let listener = TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "chat-broadcast listening");

    let shutdown = CancellationToken::new();

    let consumer_shutdown = shutdown.clone();
    let consumer_config = config.clone();
    let consumer_task = tokio::spawn(async move {
        if let Err(err) = chat_broadcast::run_consumer(&consumer_config, registry, consumer_shutdown).await {
            tracing::error!(error = %err, "broadcast consumer loop exited with error");
        }
    });

    let server_shutdown = shutdown.clone();
    serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    consumer_task.await.ok();

    Ok(())
}
