//! Reconciliation service binary: loads settings, prepares storage and
//! serves the sync trigger API.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ledgersync_clients::{RubicClient, TripletexClientFactory};
use ledgersync_core::settings::SyncSettings;
use ledgersync_core::sync::{SyncOrchestrator, SyncStateStore};
use ledgersync_storage_sqlite::{create_pool, init, run_migrations, spawn_writer, SqliteSyncStore};

mod api;
mod error;
mod state;

use state::AppState;

const DATA_DIR_VAR: &str = "LEDGERSYNC_DATA_DIR";
const PORT_VAR: &str = "PORT";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = SyncSettings::from_env()?;

    let data_dir = std::env::var(DATA_DIR_VAR).unwrap_or_else(|_| "data".to_string());
    let db_path = init(&data_dir)?;
    run_migrations(&db_path)?;
    let pool = create_pool(&db_path)?;
    let writer = spawn_writer(pool.as_ref().clone());
    let store: Arc<dyn SyncStateStore> = Arc::new(SqliteSyncStore::new(pool, writer));

    let source = Arc::new(RubicClient::new(&settings.source)?);
    let factory = Arc::new(TripletexClientFactory::new());

    let environment_ids: Vec<String> = settings
        .enabled_environments()
        .map(|e| e.id.clone())
        .collect();
    info!(
        environments = environment_ids.len(),
        "Configured target environments"
    );

    let orchestrator = SyncOrchestrator::new(
        settings.environments.clone(),
        source,
        factory,
        Arc::clone(&store),
    );

    let state = Arc::new(AppState {
        orchestrator,
        store,
        environment_ids,
        trigger_secret: settings.trigger_secret.clone(),
    });

    let port: u16 = std::env::var(PORT_VAR)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on port {}", port);

    axum::serve(listener, api::router().with_state(state)).await?;
    Ok(())
}
