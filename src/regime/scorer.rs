// Additive integer regime score + calm/trend flags. Weights are exposed as
// named, documented fields rather than hardcoded constants, since they're
// meant to be treated as tunable parameters.

use chrono::{DateTime, Duration, Utc};

use crate::market_data::providers::{BarProvider, CalendarProvider};

#[derive(Debug, Clone, Copy)]
pub struct RegimeWeights {
    /// Minutes before a scheduled event within which the blockout penalty applies.
    pub blockout_minutes: i64,
    /// Score penalty when inside the event blockout window.
    pub event_penalty: i32,
    /// `short_iv > thirty_iv * ratio` is treated as stress.
    pub iv_stress_ratio: f64,
    /// Score penalty under IV stress.
    pub iv_stress_penalty: i32,
    /// Score bonus when the `calm` flag is set.
    pub calm_bonus: i32,
    /// Score bonus when a trend flag (`up` or `dn`) is set.
    pub trend_bonus: i32,
    /// `calm` holds when the current bar's true range is no more than this
    /// multiple of ATR(20) — i.e. the recent move isn't outsized.
    pub calm_atr_ratio: f64,
    /// Window over which VWAP slope is evaluated.
    pub vwap_window: Duration,
    /// Minimum fractional distance from VWAP (of spot) to call a trend.
    pub vwap_epsilon_pct: f64,
}

impl Default for RegimeWeights {
    fn default() -> Self {
        Self {
            blockout_minutes: 60,
            event_penalty: -2,
            iv_stress_ratio: 1.1,
            iv_stress_penalty: -1,
            calm_bonus: 1,
            trend_bonus: 2,
            calm_atr_ratio: 1.0,
            vwap_window: Duration::minutes(30),
            vwap_epsilon_pct: 0.0005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeScore {
    pub score: i32,
    pub calm: bool,
    pub up: bool,
    pub dn: bool,
}

/// Aggregate technical/volatility/event signals at `ts` into an integer
/// score and boolean regime flags. Pure: no I/O beyond the read-only
/// provider views, no internal state.
pub fn score_at(
    ts: DateTime<Utc>,
    bars: &dyn BarProvider,
    calendar: &dyn CalendarProvider,
    short_iv: f64,
    thirty_iv: f64,
    weights: &RegimeWeights,
) -> RegimeScore {
    let mut score: i32 = 0;

    let atr20 = bars.atr_20(ts);
    let true_range = current_true_range(bars, ts);
    let calm = true_range <= atr20 * weights.calm_atr_ratio;

    let spot = bars.spot(ts);
    let vwap_now = bars.vwap(ts, weights.vwap_window);
    let vwap_prior = bars.vwap(ts - weights.vwap_window, weights.vwap_window);
    let slope = vwap_now - vwap_prior;
    let eps = spot.abs() * weights.vwap_epsilon_pct;

    let up = spot > vwap_now + eps && slope > 0.0;
    let dn = spot < vwap_now - eps && slope < 0.0;

    if let Some(event) = calendar.next_event_after(ts) {
        let minutes_until = (event.timestamp - ts).num_minutes();
        if minutes_until >= 0 && minutes_until <= weights.blockout_minutes {
            score += weights.event_penalty;
        }
    }

    if short_iv > thirty_iv * weights.iv_stress_ratio {
        score += weights.iv_stress_penalty;
    }

    if calm {
        score += weights.calm_bonus;
    }
    if up || dn {
        score += weights.trend_bonus;
    }

    RegimeScore { score, calm, up, dn }
}

fn current_true_range(bars: &dyn BarProvider, ts: DateTime<Utc>) -> f64 {
    let window = bars.bars(ts.date_naive(), ts.date_naive());
    match window.iter().rposition(|b| b.timestamp <= ts) {
        Some(idx) if idx > 0 => {
            let cur = window[idx];
            let prev_close = window[idx - 1].close;
            (cur.high - cur.low)
                .max((cur.high - prev_close).abs())
                .max((cur.low - prev_close).abs())
        }
        Some(idx) => window[idx].high - window[idx].low,
        None => 0.0,
    }
}
