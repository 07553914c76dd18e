use std::sync::Arc;
use std::time::Duration;

use gridbite::{
    config::AppConfig,
    db::{Db, seed},
    logger::init_tracing,
    metrics::counters::Counters,
    server::{AppState, build_router},
    sim::engine::{EngineConfig, SimulationEngine},
    store::repository::DeliveryRepository,
    store::repository_sqlx::SqlxDeliveryRepository,
};

/// Initializes the database, runs migrations, constructs the repository,
/// and loads the town map and fleet if the store is empty.
async fn init_store(cfg: &AppConfig) -> anyhow::Result<Arc<SqlxDeliveryRepository>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let repo = Arc::new(SqlxDeliveryRepository::new(db.pool.clone()));
    seed::load_initial_data(repo.as_ref(), cfg).await?;

    Ok(repo)
}

/// Starts the background tick driver. Each firing runs at most one tick;
/// the engine itself refuses to advance while the simulation is stopped,
/// and the manual step endpoint shares the same writer lock.
fn start_tick_loop(engine: Arc<SimulationEngine>, interval_ms: u64) {
    if interval_ms == 0 {
        tracing::info!("tick loop disabled; only the step endpoint advances the clock");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            if let Err(e) = engine.run_tick().await {
                tracing::error!(error = ?e, "tick failed; clock not advanced");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting gridbite backend...");

    let cfg = AppConfig::from_env();

    let repo = init_store(&cfg).await?;
    let repo: Arc<dyn DeliveryRepository> = repo;

    let engine = Arc::new(
        SimulationEngine::bootstrap(
            repo.clone(),
            EngineConfig::from_app(&cfg),
            Counters::default(),
        )
        .await?,
    );

    start_tick_loop(engine.clone(), cfg.tick_interval_ms);

    let state = AppState { engine, repo };
    let app = build_router(state, &cfg.allowed_origins);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "HTTP API listening");

    axum::serve(listener, app).await?;

    Ok(())
}
