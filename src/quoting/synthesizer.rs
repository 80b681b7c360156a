// `quotes_at(ts)` builds the same-day option chain. Spot comes from a `BarProvider`; IV
// proxies come from an `IvProxySeries`; everything else (skew, tick
// alignment, time-to-close widening) is pure arithmetic.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::market_data::providers::{BarProvider, OptionsProvider};
use crate::models::option_math::{self, Right};
use crate::models::quote::{OptionQuote, TICK};
use crate::quoting::iv_proxy::IvProxySeries;

#[derive(Debug, Clone)]
pub struct QuoteSynthesizerConfig {
    /// Strike offsets around the rounded ATM strike, inclusive both ends.
    pub strike_offset_range: std::ops::RangeInclusive<i64>,
    /// Settlement hour/minute in UTC (21:00 = 16:00 ET).
    pub settlement_hour_utc: u32,
    pub settlement_minute_utc: u32,
    /// Spot above this threshold is treated as an SPX-like underlying and
    /// divided by 10 (the SPX->XSP scaling heuristic).
    pub spx_scale_threshold: f64,
    /// Minutes-to-settlement below which the spread widens.
    pub late_session_minutes: i64,
    pub late_session_multiplier: f64,
}

impl Default for QuoteSynthesizerConfig {
    fn default() -> Self {
        Self {
            strike_offset_range: -15..=15,
            settlement_hour_utc: 21,
            settlement_minute_utc: 0,
            spx_scale_threshold: 1000.0,
            late_session_minutes: 40,
            late_session_multiplier: 1.5,
        }
    }
}

pub struct QuoteSynthesizer<'a, B: BarProvider> {
    bars: &'a B,
    iv_proxies: IvProxySeries,
    config: QuoteSynthesizerConfig,
}

impl<'a, B: BarProvider> QuoteSynthesizer<'a, B> {
    pub fn new(bars: &'a B, iv_proxies: IvProxySeries, config: QuoteSynthesizerConfig) -> Self {
        Self { bars, iv_proxies, config }
    }

    fn settlement(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &ts.date_naive()
                .and_hms_opt(self.config.settlement_hour_utc, self.config.settlement_minute_utc, 0)
                .unwrap(),
        )
    }

    fn spread_pct(&self, mid: f64, minutes_to_settle: f64) -> f64 {
        let mut pct = if mid >= 1.00 {
            0.05
        } else if mid >= 0.25 {
            0.10
        } else {
            0.20
        };
        if minutes_to_settle < self.config.late_session_minutes as f64 {
            pct *= self.config.late_session_multiplier;
        }
        pct
    }

    fn build_bid_ask(&self, mid: f64, minutes_to_settle: f64) -> (f64, f64) {
        let spread_pct = self.spread_pct(mid, minutes_to_settle);
        let half = mid * spread_pct / 2.0;
        let bid = (((mid - half) / TICK).floor() * TICK).max(TICK);
        let ask = (((mid + half) / TICK).ceil() * TICK).max(bid + TICK);
        (bid, ask)
    }
}

impl<'a, B: BarProvider> OptionsProvider for QuoteSynthesizer<'a, B> {
    fn quotes_at(&self, ts: DateTime<Utc>) -> Box<dyn Iterator<Item = OptionQuote> + '_> {
        let raw_spot = self.bars.spot(ts);
        if raw_spot <= 0.0 {
            return Box::new(std::iter::empty());
        }
        let spot = if raw_spot > self.config.spx_scale_threshold {
            raw_spot / 10.0
        } else {
            raw_spot
        };

        let settle = self.settlement(ts);
        let t = ((settle - ts).num_seconds() as f64 / 86_400.0 / 365.0).max(option_math::MIN_TIME_TO_EXPIRY);
        let minutes_to_settle = (settle - ts).num_seconds() as f64 / 60.0;

        let (short_iv, _thirty_iv) = self.iv_proxies.lookup(ts.date_naive());
        let base_iv = (short_iv / 100.0).clamp(0.05, 0.80);

        let atm = spot.round() as i64;
        let expiry = self.today_expiry(ts);

        let iter = self
            .config
            .strike_offset_range
            .clone()
            .flat_map(|offset| [Right::Put, Right::Call].into_iter().map(move |right| (offset, right)))
            .filter_map(move |(offset, right)| {
                let strike = (atm + offset) as f64;
                if strike <= 0.0 {
                    return None;
                }
                let moneyness = (strike - spot).abs() / spot;
                let skew = match right {
                    Right::Put => 1.0 + 2.0 * moneyness,
                    Right::Call => 1.0 + moneyness,
                };
                let iv = (base_iv * skew).clamp(0.05, 1.0);

                let priced = option_math::price(spot, strike, t, iv, right);
                let (bid, ask) = self.build_bid_ask(priced.price, minutes_to_settle);

                Some(OptionQuote::new(ts, expiry, strike, right, bid, ask, priced.delta, iv))
            });

        Box::new(iter)
    }

    fn today_expiry(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.date_naive()
    }

    fn iv_proxies(&self, ts: DateTime<Utc>) -> (f64, f64) {
        self.iv_proxies.lookup(ts.date_naive())
    }
}

/// Minutes remaining in the trading session (to settlement), used by the
/// risk manager's gamma-hour gate and by the backtest loop's PM-settlement
/// window.
pub fn minutes_to_settlement(ts: DateTime<Utc>, settlement_hour_utc: u32) -> i64 {
    let settle = Utc
        .from_utc_datetime(&ts.date_naive().and_hms_opt(settlement_hour_utc, 0, 0).unwrap());
    (settle - ts).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::csv_loader::CsvBarProvider;
    use crate::market_data::providers::Bar;
    use chrono::TimeZone;

    fn flat_provider(spot: f64) -> CsvBarProvider {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap();
        CsvBarProvider::from_bars(vec![Bar {
            timestamp: ts,
            open: spot,
            high: spot + 0.5,
            low: spot - 0.5,
            close: spot,
            volume: 1000.0,
        }])
    }

    fn iv_series() -> IvProxySeries {
        let mut s = IvProxySeries::new();
        let d = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        s.insert_short(d, 16.0);
        s.insert_thirty(d, 15.0);
        s
    }

    #[test]
    fn zero_or_negative_spot_yields_empty_chain() {
        let bars = flat_provider(0.0);
        let synth = QuoteSynthesizer::new(&bars, iv_series(), QuoteSynthesizerConfig::default());
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap();
        assert_eq!(synth.quotes_at(ts).count(), 0);
    }

    #[test]
    fn every_synthesized_quote_satisfies_invariants() {
        let bars = flat_provider(100.0);
        let synth = QuoteSynthesizer::new(&bars, iv_series(), QuoteSynthesizerConfig::default());
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap();
        let quotes: Vec<_> = synth.quotes_at(ts).collect();
        assert!(!quotes.is_empty());
        for q in quotes {
            assert!(q.bid >= 0.05 - 1e-9);
            assert!(q.bid < q.ask);
            let ticks = (q.ask - q.bid) / TICK;
            assert!((ticks - ticks.round()).abs() < 1e-6);
            assert!(q.delta.abs() <= 1.0 + 1e-9);
            assert!((0.05..=1.0).contains(&q.iv));
        }
    }

    #[test]
    fn spx_scale_heuristic_divides_large_spot_by_ten() {
        let bars = flat_provider(4500.0);
        let synth = QuoteSynthesizer::new(&bars, iv_series(), QuoteSynthesizerConfig::default());
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap();
        let quotes: Vec<_> = synth.quotes_at(ts).collect();
        // Scaled spot ~450, so strikes should cluster around there, not 4500.
        let max_strike = quotes.iter().map(|q| q.strike).fold(0.0_f64, f64::max);
        assert!(max_strike < 500.0, "max_strike={max_strike}");
    }

    #[test]
    fn late_session_widens_spread() {
        let bars = flat_provider(100.0);
        let synth = QuoteSynthesizer::new(&bars, iv_series(), QuoteSynthesizerConfig::default());
        let early = Utc.with_ymd_and_hms(2024, 2, 1, 14, 30, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 2, 1, 20, 30, 0).unwrap();
        let early_spread: f64 = synth.quotes_at(early).map(|q| q.spread()).sum();
        let late_spread: f64 = synth.quotes_at(late).map(|q| q.spread()).sum();
        assert!(late_spread >= early_spread);
    }
}
