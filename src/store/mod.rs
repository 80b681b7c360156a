// Trade log persistence: one SQLite file per trading day.
// Grounded in `sqlx`-backed persistence style seen across the wider example
// pack (query binding, pooled connections, async save/update methods).

pub mod trade_log;

pub use trade_log::{DailySummary, TradeLogStore, TradeRecord};
