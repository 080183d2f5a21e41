//! Tracked-symbol management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::error::AppError;
use crate::types::SymbolStatus;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub symbol: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_symbols).post(register_symbol))
        .route("/:symbol", delete(deregister_symbol))
}

/// List tracked symbols with their loop status.
async fn list_symbols(State(state): State<AppState>) -> Json<ApiResponse<Vec<SymbolStatus>>> {
    Json(ApiResponse::new(
        state.scheduler.statuses(),
        state.clock.now_millis(),
    ))
}

/// Start tracking a symbol.
async fn register_symbol(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let symbol = state.scheduler.register(&request.symbol)?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { symbol })))
}

/// Stop tracking a symbol and drop its record.
async fn deregister_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<StatusCode, AppError> {
    state.scheduler.deregister(&symbol).await?;
    Ok(StatusCode::NO_CONTENT)
}
