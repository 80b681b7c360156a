// Open position lifecycle, after `Position`'s entry/exit price + pnl
// bookkeeping, narrowed to an immutable-order-plus-mutable-lifecycle shape.

use chrono::{DateTime, Utc};

use crate::backtesting::fill::ExitReason;
use crate::strategies::spreads::SpreadOrder;

#[derive(Debug, Clone, Copy)]
pub struct OpenPosition {
    pub order: SpreadOrder,
    /// Per-share credit received after entry slippage. Invariant: `>= one_tick`.
    pub entry_price: f64,
    pub entry_ts: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_ts: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub closed: bool,
}

impl OpenPosition {
    pub fn new(order: SpreadOrder, entry_price: f64, entry_ts: DateTime<Utc>, tick: f64) -> Self {
        assert!(entry_price >= tick, "OpenPosition entry_price {entry_price} below one tick {tick}");
        Self { order, entry_price, entry_ts, exit_price: None, exit_ts: None, exit_reason: None, closed: false }
    }

    pub fn close(&mut self, exit_price: f64, exit_ts: DateTime<Utc>, reason: ExitReason) {
        self.exit_price = Some(exit_price);
        self.exit_ts = Some(exit_ts);
        self.exit_reason = Some(reason);
        self.closed = true;
    }

    /// `(entry - exit) * 100 - fees`: realized P&L is defined only once closed.
    pub fn realized_pnl(&self, fees: f64) -> Option<f64> {
        self.exit_price.map(|exit| (self.entry_price - exit) * 100.0 - fees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::option_math::Right;
    use crate::strategies::spreads::{Decision, SpreadLeg};
    use chrono::TimeZone;

    fn order() -> SpreadOrder {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap();
        SpreadOrder {
            timestamp: ts,
            decision: Decision::SingleSidePut,
            leg: SpreadLeg { right: Right::Put, short_strike: 100.0, long_strike: 99.0, expiry: ts.date_naive() },
            credit: 0.30,
            condor: None,
        }
    }

    #[test]
    #[should_panic(expected = "below one tick")]
    fn entry_price_below_tick_panics() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap();
        OpenPosition::new(order(), 0.0, ts, 0.05);
    }

    #[test]
    fn close_sets_all_exit_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap();
        let mut pos = OpenPosition::new(order(), 0.28, ts, 0.05);
        let exit_ts = Utc.with_ymd_and_hms(2024, 2, 1, 16, 0, 0).unwrap();
        pos.close(0.10, exit_ts, ExitReason::CreditMultipleStop);
        assert!(pos.closed);
        assert_eq!(pos.realized_pnl(2.0), Some((0.28 - 0.10) * 100.0 - 2.0));
    }
}
