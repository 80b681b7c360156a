// Immutable option quote snapshot: bid/ask/mid plus the fields the
// synthesizer needs — delta, iv, and a `Right` instead of a separate
// `OptionType`.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::option_math::Right;

pub const TICK: f64 = 0.05;

/// Immutable snapshot of one synthesized option quote.
///
/// Invariants (enforced at construction): `0 < bid <= mid <= ask`,
/// `ask - bid` is a positive multiple of `TICK`, `|delta| <= 1`,
/// `iv` in `[0.05, 1.0]`, `mid == (bid + ask) / 2`.
#[derive(Debug, Clone, Copy)]
pub struct OptionQuote {
    pub timestamp: DateTime<Utc>,
    pub expiry: NaiveDate,
    pub strike: f64,
    pub right: Right,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub delta: f64,
    pub iv: f64,
}

impl OptionQuote {
    /// Construct and check every invariant above. Violations are a programmer
    /// error (the quote synthesizer builds bid/ask from a policy that should
    /// always satisfy these) so this panics with context rather than
    /// returning a `Result` — see `errors::BacktestError::Invariant`.
    pub fn new(
        timestamp: DateTime<Utc>,
        expiry: NaiveDate,
        strike: f64,
        right: Right,
        bid: f64,
        ask: f64,
        delta: f64,
        iv: f64,
    ) -> Self {
        let mid = (bid + ask) / 2.0;
        let quote = Self { timestamp, expiry, strike, right, bid, ask, mid, delta, iv };
        quote.check_invariants();
        quote
    }

    fn check_invariants(&self) {
        assert!(self.bid >= TICK - 1e-9, "bid {} below tick floor", self.bid);
        assert!(self.bid <= self.mid + 1e-9, "bid {} exceeds mid {}", self.bid, self.mid);
        assert!(self.mid <= self.ask + 1e-9, "mid {} exceeds ask {}", self.mid, self.ask);
        let spread = self.ask - self.bid;
        let ticks = spread / TICK;
        assert!(
            (ticks - ticks.round()).abs() < 1e-6 && spread > 0.0,
            "ask-bid spread {} is not a positive multiple of tick {}",
            spread,
            TICK
        );
        assert!((self.mid - (self.bid + self.ask) / 2.0).abs() < 1e-9);
        assert!(self.delta.abs() <= 1.0 + 1e-9, "delta {} out of bounds", self.delta);
        assert!(
            (0.05 - 1e-9..=1.0 + 1e-9).contains(&self.iv),
            "iv {} out of bounds",
            self.iv
        );
    }

    pub fn spread(&self) -> f64 {
        (self.ask - self.bid).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap()
    }

    #[test]
    fn valid_quote_constructs() {
        let q = OptionQuote::new(ts(), ts().date_naive(), 100.0, Right::Call, 0.95, 1.05, 0.4, 0.2);
        assert!((q.mid - 1.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "not a positive multiple")]
    fn non_tick_spread_panics() {
        OptionQuote::new(ts(), ts().date_naive(), 100.0, Right::Call, 1.00, 1.03, 0.4, 0.2);
    }

    #[test]
    #[should_panic(expected = "exceeds mid")]
    fn inverted_bid_ask_panics() {
        OptionQuote::new(ts(), ts().date_naive(), 100.0, Right::Call, 1.10, 1.05, 0.4, 0.2);
    }
}
