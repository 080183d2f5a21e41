pub mod health;
pub mod signals;
pub mod symbols;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub meta: ApiMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMeta {
    /// Unix timestamp (milliseconds) at which the response was assembled.
    pub served_at: i64,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, served_at: i64) -> Self {
        Self {
            data,
            meta: ApiMeta { served_at },
        }
    }
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/signals", signals::router())
        .nest("/api/symbols", symbols::router())
}
