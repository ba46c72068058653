use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gpumesh_core::{
    build_adapter, HttpClient, NoopHttpClient, ReliabilityConfig, ReqwestHttpClient,
    SourceConfig, SourceId, SourceRegistry, SyncScheduler,
};
use gpumesh_web::create_router;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let reliability = ReliabilityConfig::from_env()?;
    let registry = Arc::new(SourceRegistry::new(reliability.clone()));

    let mock_mode = std::env::var("MOCK_MODE")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
    let shared_client = ReqwestHttpClient::new();

    for source in SourceId::ALL {
        let config = SourceConfig::from_env(source)?;
        if !config.enabled {
            info!(source = %source, "source disabled, skipping registration");
            continue;
        }
        let client = transport_for(&config, mock_mode, &shared_client);
        registry.register(build_adapter(config, &reliability, client));
    }

    let scheduler = SyncScheduler::spawn(Arc::clone(&registry), reliability.sync_interval);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| String::from("0.0.0.0:8080"));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "gpumesh listening");

    let app = create_router(registry);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    scheduler.shutdown().await;
    Ok(())
}

/// Sources that require an API key fall back to the mock transport when no
/// key is configured, so the service stays runnable out of the box.
fn transport_for(
    config: &SourceConfig,
    mock_mode: bool,
    shared: &ReqwestHttpClient,
) -> Arc<dyn HttpClient> {
    if mock_mode {
        return Arc::new(NoopHttpClient);
    }
    let needs_key = config.source != SourceId::Akash;
    if needs_key && config.api_key.is_none() {
        warn!(source = %config.source, "no API key configured, serving sample data");
        return Arc::new(NoopHttpClient);
    }
    Arc::new(shared.clone())
}
