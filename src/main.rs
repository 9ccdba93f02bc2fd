use std::time::Duration;

use tracing_subscriber::EnvFilter;

use primed::server::{PrimeServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("primed=info".parse()?))
        .init();

    tracing::info!("primed starting...");

    let config = ServerConfig {
        host: std::env::var("PRIMED_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        port: std::env::var("PRIMED_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4711),
    };

    let partition_size = std::env::var("PRIMED_PARTITION_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8);

    let delay = std::env::var("PRIMED_DELAY_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO);

    let server = PrimeServer::new(config, partition_size)?;
    let addr = server.start(delay).await?;
    tracing::info!(
        partition_size,
        delay_ms = delay.as_millis() as u64,
        "accepting connections on {}",
        addr
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining sessions");
    server.stop().await?;

    Ok(())
}
