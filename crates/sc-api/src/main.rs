//! Contract Processing API entrypoint

use sc_api::db::PgContractStore;
use sc_api::{build_router, AppConfig, AppState};
use sc_core::{ContractPipeline, ContractStore, MemoryStore};
use sc_llm::HttpReasoningClient;
use sc_solc::SolcCompiler;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sc_api=debug,sc_core=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Contract Processing API Server");

    let config = AppConfig::default();

    // Connect to the datastore
    let store: Arc<dyn ContractStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("Failed to connect to database");

            info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            info!("Database migrations complete");

            Arc::new(PgContractStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, history records will not survive restarts");
            Arc::new(MemoryStore::new())
        }
    };

    // Wire up the pipeline
    let compiler = Arc::new(SolcCompiler::new(config.solc_config()));
    if !compiler.is_available() {
        warn!("solc not found in PATH, compilation will be skipped");
    }
    let ai = Arc::new(HttpReasoningClient::new(config.llm_config()));
    let pipeline = ContractPipeline::new(compiler, ai, store.clone());

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        pipeline,
        store,
        config,
    });

    let app = build_router(state);

    info!("Listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app).await.expect("Server error");
}
