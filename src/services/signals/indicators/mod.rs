//! Technical indicator implementations.

pub mod rsi;
pub mod sma;

pub use rsi::Rsi;
pub use sma::Sma;
