//! Contract Processing API Server
//!
//! Thin axum layer over the core pipeline: request validation, the three
//! contract operations, and the history aggregator endpoints.

pub mod db;
pub mod routes;

use axum::{
    routing::{delete, get, post},
    Router,
};
use sc_core::{ContractPipeline, ContractStore};
use sc_llm::LlmConfig;
use sc_solc::SolcConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: ContractPipeline,
    pub store: Arc<dyn ContractStore>,
    pub config: AppConfig,
}

/// Application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub solc_path: Option<PathBuf>,
    pub solc_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            llm_api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            llm_timeout_secs: env_u64("LLM_TIMEOUT_SECS", 45),
            solc_path: std::env::var("SOLC_PATH").ok().map(PathBuf::from),
            solc_timeout_secs: env_u64("SOLC_TIMEOUT_SECS", 15),
        }
    }
}

impl AppConfig {
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_url: self.llm_api_url.clone(),
            api_key: self.llm_api_key.clone(),
            model: self.llm_model.clone(),
            timeout_secs: self.llm_timeout_secs,
            ..Default::default()
        }
    }

    pub fn solc_config(&self) -> SolcConfig {
        SolcConfig {
            solc_path: self.solc_path.clone(),
            timeout_secs: self.solc_timeout_secs,
            ..Default::default()
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(routes::health_check))

        // Contract operations
        .route("/contracts/analyze", post(routes::contracts::analyze))
        .route("/contracts/rewrite", post(routes::contracts::rewrite))
        .route("/contracts/generate", post(routes::contracts::generate))

        // History
        .route("/contracts/history", get(routes::history::list_history))
        .route("/contracts/history/:id", delete(routes::history::delete_history))
        .route("/contracts/stats", get(routes::history::get_stats))

        // CORS
        .layer(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any))

        // Tracing
        .layer(TraceLayer::new_for_http())

        // State
        .with_state(state)
}
