//! Signal API endpoints.
//!
//! Thin wrappers over the query facade; nothing here can trigger a fetch.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::ApiResponse;
use crate::error::AppError;
use crate::types::{normalize_symbol, SnapshotLookup};
use crate::AppState;

/// Query parameters for the batch endpoint.
#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    /// Comma-separated symbols. Defaults to every tracked symbol.
    pub symbols: Option<String>,
}

/// Create the signals router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_signals))
        .route("/:symbol", get(get_signal))
}

/// Get the latest record for one symbol.
async fn get_signal(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Response, AppError> {
    if normalize_symbol(&symbol).is_none() {
        return Err(AppError::BadRequest("Symbol must not be empty".to_string()));
    }

    let lookup = state.query.get_single(&symbol);
    let response = match lookup {
        SnapshotLookup::Available(snapshot) => {
            Json(ApiResponse::new(snapshot, state.clock.now_millis())).into_response()
        }
        absent @ SnapshotLookup::NotAvailable { .. } => {
            (StatusCode::NOT_FOUND, Json(absent)).into_response()
        }
    };
    Ok(response)
}

/// Get the latest records for several symbols, in request order.
async fn get_signals(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> Result<Json<ApiResponse<Vec<SnapshotLookup>>>, AppError> {
    let symbols: Vec<String> = match query.symbols.as_deref() {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => state.scheduler.tracked(),
    };

    if query.symbols.is_some() && symbols.is_empty() {
        return Err(AppError::BadRequest("No symbols requested".to_string()));
    }

    Ok(Json(ApiResponse::new(
        state.query.get_multi(&symbols),
        state.clock.now_millis(),
    )))
}
