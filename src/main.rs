use anyhow::Context;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sysmon_agent::api;
use sysmon_agent::collector::spawn_collector;
use sysmon_agent::config::{self, Config};
use sysmon_agent::state::AppState;
use sysmon_agent::store::MetricsStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = Config::from_env();
    config.port = config::parse_port(std::env::args(), config.port);

    let store = MetricsStore::open(&config.db_path)
        .with_context(|| format!("opening metrics store at {}", config.db_path))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(
        %addr,
        interval_secs = config.sample_interval.as_secs(),
        top_n = config.top_n,
        "starting sysmon agent"
    );

    let state = AppState::new(store, config);
    let _collector = spawn_collector(state.clone());

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
