use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Market-data fetch failures. All of them are transient from the
/// scheduler's point of view.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("Fetch timed out after {0}ms")]
    Timeout(u64),

    #[error("No bars returned for {0}")]
    Empty(String),

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Source task failed: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Rationale service failures. Never visible to readers.
#[derive(Error, Debug)]
pub enum RationaleError {
    #[error("Rationale request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rationale service error: {0}")]
    Service(String),

    #[error("Invalid rationale response: {0}")]
    InvalidResponse(String),

    #[error("Rationale timed out after {0}ms")]
    Timeout(u64),

    #[error("Rationale task failed: {0}")]
    Aborted(String),
}

/// Invalid configuration. Fatal at startup.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Unparseable value for {name}: {value:?}")]
    Unparseable { name: &'static str, value: String },
}

/// Symbol registration errors.
#[derive(Error, Debug, PartialEq)]
pub enum SchedulerError {
    #[error("Symbol must not be empty")]
    EmptySymbol,

    #[error("Symbol already tracked: {0}")]
    AlreadyTracked(String),

    #[error("Symbol not tracked: {0}")]
    NotTracked(String),
}

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<SchedulerError> for AppError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::EmptySymbol => AppError::BadRequest(e.to_string()),
            SchedulerError::AlreadyTracked(_) => AppError::Conflict(e.to_string()),
            SchedulerError::NotTracked(_) => AppError::NotFound(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
