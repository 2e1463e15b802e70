use anyhow::Context;
use pipeline::{AppConfig, AppState, router};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ROLEWATCH_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let coordinator = config
        .coordinator()
        .await
        .context("Failed to build run coordinator")?;
    let store = config.registry_store();

    info!(
        collectors = ?coordinator.collector_labels(),
        registry = %store.log_path().display(),
        "Coordinator ready"
    );

    let app = router(AppState::new(coordinator, store));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!("Server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
