//! Contract operation routes

use super::ApiError;
use crate::AppState;
use axum::{extract::State, Json};
use sc_core::{AnalyzeRequest, ContractOutput, GenerateRequest, RewriteRequest};
use std::sync::Arc;

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<ContractOutput>, ApiError> {
    let output = state.pipeline.analyze(payload).await?;
    Ok(Json(output))
}

pub async fn rewrite(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RewriteRequest>,
) -> Result<Json<ContractOutput>, ApiError> {
    let output = state.pipeline.rewrite(payload).await?;
    Ok(Json(output))
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<ContractOutput>, ApiError> {
    let output = state.pipeline.generate(payload).await?;
    Ok(Json(output))
}
