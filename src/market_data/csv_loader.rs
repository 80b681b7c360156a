// Reference CSV-backed `BarProvider`. Market-data ingestion is an external
// collaborator; this exists so the core can be exercised end-to-end
// in tests without a live feed. Follows `load_csv_closes`'s Yahoo-style
// CSV, flexible trimmed reader, skip-bad-rows policy, extended from
// close-only to full OHLCV bars.

use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use csv::ReaderBuilder;

use crate::errors::BacktestError;
use crate::market_data::providers::{Bar, BarProvider};

/// In-memory bar series loaded from a Yahoo-style CSV
/// (`Date,Open,High,Low,Close,Volume,...`), ascending by timestamp.
#[derive(Debug, Clone)]
pub struct CsvBarProvider {
    bars: Vec<Bar>,
}

impl CsvBarProvider {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BacktestError> {
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .has_headers(true)
            .from_path(path.as_ref())
            .map_err(|e| BacktestError::data(format!("cannot open CSV: {e}")))?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| BacktestError::data(format!("bad CSV row: {e}")))?;
            if record.len() < 6 {
                continue;
            }
            let date = match parse_date(record[0].trim()) {
                Some(d) => d,
                None => continue,
            };
            let parse = |s: &str| -> Option<f64> { s.trim().parse().ok() };
            let (open, high, low, close, volume) = match (
                parse(&record[1]),
                parse(&record[2]),
                parse(&record[3]),
                parse(&record[4]),
                parse(&record[5]),
            ) {
                (Some(o), Some(h), Some(l), Some(c), Some(v)) => (o, h, l, c, v),
                _ => continue,
            };

            // Same-day 0DTE bars carry the session timestamp (21:00 UTC close);
            // a real intraday feed supplies minute timestamps directly.
            let timestamp = Utc.from_utc_datetime(&date.and_hms_opt(21, 0, 0).unwrap());
            let bar = Bar { timestamp, open, high, low, close, volume };
            if bar.is_well_formed() {
                bars.push(bar);
            }
        }

        bars.sort_by_key(|b| b.timestamp);
        if bars.is_empty() {
            return Err(BacktestError::data("no valid bars parsed from CSV".to_string()));
        }
        Ok(Self { bars })
    }

    pub fn from_bars(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self { bars }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

impl BarProvider for CsvBarProvider {
    fn bars(&self, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
        self.bars
            .iter()
            .filter(|b| {
                let d = b.timestamp.date_naive();
                d >= start && d <= end
            })
            .copied()
            .collect()
    }

    fn bar_interval(&self) -> chrono::Duration {
        chrono::Duration::days(1)
    }

    fn atr_20(&self, ts: DateTime<Utc>) -> f64 {
        let idx = match self.bars.iter().rposition(|b| b.timestamp <= ts) {
            Some(i) => i,
            None => return 0.0,
        };
        let start = idx.saturating_sub(19);
        let window = &self.bars[start..=idx];
        if window.len() < 2 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 1..window.len() {
            let prev_close = window[i - 1].close;
            let tr = (window[i].high - window[i].low)
                .max((window[i].high - prev_close).abs())
                .max((window[i].low - prev_close).abs());
            sum += tr;
        }
        sum / (window.len() - 1) as f64
    }

    fn vwap(&self, ts: DateTime<Utc>, window: chrono::Duration) -> f64 {
        let start_ts = ts - window;
        let slice: Vec<&Bar> = self
            .bars
            .iter()
            .filter(|b| b.timestamp > start_ts && b.timestamp <= ts)
            .collect();
        if slice.is_empty() {
            return self.spot(ts);
        }
        let (pv, v): (f64, f64) = slice.iter().fold((0.0, 0.0), |(pv, v), b| {
            let typical = (b.high + b.low + b.close) / 3.0;
            (pv + typical * b.volume, v + b.volume)
        });
        if v > 0.0 {
            pv / v
        } else {
            slice.last().unwrap().close
        }
    }

    fn spot(&self, ts: DateTime<Utc>) -> f64 {
        match self.bars.iter().rposition(|b| b.timestamp <= ts) {
            Some(i) => self.bars[i].close,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(day: u32, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 2, day, 21, 0, 0).unwrap();
        Bar { timestamp: ts, open: close, high: close + 1.0, low: close - 1.0, close, volume: 1000.0 }
    }

    #[test]
    fn spot_returns_latest_close_on_or_before() {
        let provider = CsvBarProvider::from_bars(vec![bar(1, 100.0), bar(2, 105.0)]);
        let ts = Utc.with_ymd_and_hms(2024, 2, 2, 21, 0, 0).unwrap();
        assert_eq!(provider.spot(ts), 105.0);
    }

    #[test]
    fn spot_before_any_data_is_zero() {
        let provider = CsvBarProvider::from_bars(vec![bar(5, 100.0)]);
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(provider.spot(ts), 0.0);
    }

    #[test]
    fn atr_is_nonnegative_and_finite() {
        let bars: Vec<Bar> = (1..=25).map(|d| bar(d.min(28), 100.0 + d as f64)).collect();
        let provider = CsvBarProvider::from_bars(bars);
        let ts = Utc.with_ymd_and_hms(2024, 2, 25, 21, 0, 0).unwrap();
        let atr = provider.atr_20(ts);
        assert!(atr >= 0.0 && atr.is_finite());
    }
}
