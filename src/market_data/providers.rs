// Data model and provider traits.
//
// Bars and calendar events are read-only views owned by their provider for
// the run's lifetime. The traits are object-safe so the backtest loop can
// hold `&dyn BarProvider` etc.; vtable dispatch is acceptable here, generics
// are preferred when the concrete type is known at the call site.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::quote::OptionQuote;

/// One ordered bar. Invariant (checked by providers, not re-validated here):
/// bars are strictly non-decreasing in timestamp after load,
/// `high >= max(open, close, low)`, `low <= min(open, close, high)`,
/// `volume >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.open.max(self.close).max(self.low)
            && self.low <= self.open.min(self.close).min(self.high)
            && self.volume >= 0.0
    }
}

/// Immutable, timestamp-ordered economic calendar entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EconEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
}

/// Underlying bar series + the technical aggregates the regime scorer needs.
pub trait BarProvider {
    /// Bars in `[start, end]`, inclusive, ascending timestamp order.
    fn bars(&self, start: NaiveDate, end: NaiveDate) -> Vec<Bar>;

    /// Nominal spacing between consecutive bars.
    fn bar_interval(&self) -> chrono::Duration;

    /// 20-period rolling Average True Range as of `ts`.
    fn atr_20(&self, ts: DateTime<Utc>) -> f64;

    /// Volume-weighted average price over `window` ending at `ts`.
    fn vwap(&self, ts: DateTime<Utc>, window: chrono::Duration) -> f64;

    /// Spot price at `ts`. Returns `<= 0.0` when no data is available, which
    /// callers (the quote synthesizer) treat as "no quotes".
    fn spot(&self, ts: DateTime<Utc>) -> f64;
}

/// Economic-calendar view.
pub trait CalendarProvider {
    /// The next event strictly after `ts`, if any.
    fn next_event_after(&self, ts: DateTime<Utc>) -> Option<EconEvent>;

    /// All events in `[start, end]`.
    fn events(&self, start: NaiveDate, end: NaiveDate) -> Vec<EconEvent>;
}

/// Synthetic same-day option chain view.
pub trait OptionsProvider {
    /// Finite lazy sequence of quotes for the same-day expiry at `ts`.
    fn quotes_at(&self, ts: DateTime<Utc>) -> Box<dyn Iterator<Item = OptionQuote> + '_>;

    /// Same-day expiry date for a decision made at `ts`.
    fn today_expiry(&self, ts: DateTime<Utc>) -> NaiveDate;

    /// `(short_iv, thirty_iv)` proxies for `ts`'s date, most-recent-on-or-before.
    fn iv_proxies(&self, ts: DateTime<Utc>) -> (f64, f64);
}
