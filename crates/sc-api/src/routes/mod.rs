//! API routes

pub mod contracts;
pub mod history;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sc_core::{CoreError, FieldError};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Field-level validation body returned with 422
#[derive(Serialize)]
pub struct ValidationBody {
    pub error: &'static str,
    pub fields: BTreeMap<&'static str, String>,
}

/// Error type for contract operation handlers
pub enum ApiError {
    Validation(Vec<FieldError>),
    Internal,
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(fields) => ApiError::Validation(fields),
            other => {
                tracing::error!(error = %other, "pipeline failure");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                let mut fields = BTreeMap::new();
                for e in errors {
                    fields.insert(e.field, e.message);
                }
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ValidationBody {
                        error: "validation",
                        fields,
                    }),
                )
                    .into_response()
            }
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
