use std::sync::Arc;

use anyhow::Context;
use collector_http::{router, CollectorConfig};
use report_engine::ReportEngine;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = CollectorConfig::from_env()?;
    let engine: Arc<ReportEngine> =
        ReportEngine::new(&config.data_root, config.engine_config())
            .context("failed to initialize report engine")?;

    let stats = engine.recover().await.context("startup recovery failed")?;
    tracing::info!(
        resumed = stats.resumed,
        lost = stats.lost,
        orphaned = stats.orphaned,
        "collector state recovered"
    );

    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    tracing::info!(
        addr = %config.http_addr,
        data_root = %config.data_root.display(),
        "collector listening"
    );
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
