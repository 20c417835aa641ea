use std::sync::Arc;

use otlp_http_probe::config::{CollectorConfig, ProbeConfig};
use otlp_http_probe::probe::Probe;
use otlp_http_probe::telemetry::Telemetry;
use otlp_http_probe::transport::HyperTransport;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let telemetry = Arc::new(Telemetry::init(&CollectorConfig::from_env())?);
    let probe = Probe::new(
        telemetry.clone(),
        Arc::new(HyperTransport::new()),
        ProbeConfig::default(),
    );

    let cancel = CancellationToken::new();
    let probe_loop = tokio::spawn({
        let cancel = cancel.clone();
        async move { probe.run(cancel).await }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    cancel.cancel();
    probe_loop.await?;

    // Flush buffered spans and metrics before the process exits.
    telemetry.shutdown()?;
    Ok(())
}
