//! History aggregator routes

use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sc_core::{HistoryItem, StoreCounts};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryItem>>, StatusCode> {
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    let records = state.store.list(skip, limit).await.map_err(|e| {
        error!(error = %e, "failed to read history");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(records.iter().map(|r| r.to_history_item()).collect()))
}

pub async fn delete_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    match state.store.delete(id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, %id, "failed to delete history record");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StoreCounts>, StatusCode> {
    let counts = state.store.counts().await.map_err(|e| {
        error!(error = %e, "failed to read stats");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(counts))
}
