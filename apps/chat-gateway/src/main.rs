use anyhow::Result;
use axum::serve;
use chat_gateway::config::GatewayConfig;
use chatify_telemetry::{init_telemetry, TelemetryConfig};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_cfg = TelemetryConfig::from_env("chat-gateway", env!("CARGO_PKG_VERSION"));
    init_telemetry(telemetry_cfg)?;

    let config = GatewayConfig::from_env()?;
    let router = chat_gateway::build_router(&config).await?;
    let listener = TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "chat-gateway listening");

    serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
