use serde::{Deserialize, Serialize};

/// Phase of a symbol's refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Idle,
    Fetching,
    Computing,
    Publishing,
}

/// Operational view of one symbol's refresh loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolStatus {
    pub symbol: String,
    pub state: LoopState,
    /// Failed fetches since the last successful publish.
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Unix timestamp (milliseconds) of the last successful publish.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<i64>,
    /// Delay before the next cycle starts (milliseconds).
    pub next_delay_ms: u64,
}

impl SymbolStatus {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            state: LoopState::Idle,
            consecutive_failures: 0,
            last_error: None,
            last_success: None,
            next_delay_ms: 0,
        }
    }
}
