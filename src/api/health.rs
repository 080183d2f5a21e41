use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    tracked_symbols: usize,
    published_symbols: usize,
    refresh_interval_ms: u64,
    rationale_enabled: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tracked_symbols: state.scheduler.tracked().len(),
        published_symbols: state.store.len(),
        refresh_interval_ms: state.config.scheduler.refresh_interval_ms,
        rationale_enabled: state.config.rationale.enabled(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok",
            version: "1.0.0",
            tracked_symbols: 3,
            published_symbols: 2,
            refresh_interval_ms: 5_000,
            rationale_enabled: false,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"version\":\"1.0.0\""));
        assert!(json.contains("\"trackedSymbols\":3"));
        assert!(json.contains("\"publishedSymbols\":2"));
        assert!(json.contains("\"refreshIntervalMs\":5000"));
    }
}
