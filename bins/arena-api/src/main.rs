mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use arena_common::Config;
use arena_judge::{
    DisplayConfig, EngineRuntime, ExpiringCache, HarnessGenerator, LanguageRegistry, PistonClient,
    RunnerOptions, TestRunner,
};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub config: Config,
    pub registry: Arc<LanguageRegistry>,
    pub harness: Arc<HarnessGenerator>,
    pub runner: TestRunner,
    pub engine: PistonClient,
    pub runtimes: ExpiringCache<Vec<EngineRuntime>>,
    pub display: DisplayConfig,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn display_config() -> DisplayConfig {
    match std::env::var("DISPLAY_MODE").as_deref() {
        Ok("development") => DisplayConfig::development(),
        _ => DisplayConfig::production(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Arena API booting...");

    let config = Config::from_env();

    metrics::init_metrics()?;
    info!("Metrics registry initialized");

    let registry = Arc::new(
        LanguageRegistry::load_or_builtin(Path::new(&config.language_config_path))
            .with_context(|| {
                format!(
                    "Failed to load language configuration from {}",
                    config.language_config_path
                )
            })?,
    );
    info!(languages = ?registry.names(), "Language registry ready");

    let engine = PistonClient::new(config.engine_url.clone())
        .context("Failed to create execution engine client")?;
    info!(engine_url = %config.engine_url, "Execution engine configured");

    let harness = Arc::new(HarnessGenerator::with_default_strategies());
    let runner = TestRunner::new(
        registry.clone(),
        harness.clone(),
        Arc::new(engine.clone()),
        RunnerOptions::from_config(&config),
    );

    let state = Arc::new(AppState {
        runtimes: ExpiringCache::with_system_clock(chrono::Duration::seconds(
            config.runtimes_cache_ttl_secs as i64,
        )),
        registry,
        harness,
        runner,
        engine,
        display: display_config(),
        config: config.clone(),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
