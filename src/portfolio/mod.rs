// Risk management: the daily loss cap, concurrency gates, and
// reverse-Fibonacci per-trade budget the runner checks before every entry.

pub mod risk;

pub use risk::{RiskManager, RiskManagerConfig};
