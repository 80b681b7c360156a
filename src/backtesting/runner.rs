// The backtest loop: single-threaded, strictly sequential over bars, built
// around a fixed per-bar order of operations: update open positions -> PM
// settlement -> decision/entry.

use chrono::{DateTime, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use std::convert::TryFrom;

use crate::backtesting::fill::{self, ExitConfig, ExitReason, FillProfile, MarketState, Side};
use crate::backtesting::open_position::OpenPosition;
use crate::config::EngineConfig;
use crate::market_data::providers::{BarProvider, CalendarProvider, OptionsProvider};
use crate::models::option_math::Right;
use crate::models::quote::OptionQuote;
use crate::portfolio::risk::{RiskManager, RiskManagerConfig};
use crate::regime::{score_at, RegimeWeights};
use crate::strategies::spreads::{build_order, decide, Decision, SpreadBuilderConfig, SpreadLeg, SpreadOrder};
use crate::store::{TradeLogStore, TradeRecord};

/// One closed trade, carrying everything the trade-log store and the
/// run-report aggregation both need.
#[derive(Debug, Clone)]
pub struct TradeResult {
    pub order: SpreadOrder,
    pub entry_price: f64,
    pub entry_ts: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_ts: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub fees: f64,
    pub pnl: f64,
    pub market_regime: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub trades: Vec<TradeResult>,
    pub net_pnl: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub execution_by_day: std::collections::BTreeMap<chrono::NaiveDate, ExecutionMetrics>,
    pub errors: crate::errors::ErrorTally,
}

/// Running per-day execution-quality aggregation: every `simulate_fill`
/// call observed during the day folds into this, independent of whether the
/// child fill belonged to a winning or losing trade.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionMetrics {
    pub total_fills: u64,
    pub mid_or_better: u64,
    pub within_nbbo: u64,
    mean_latency_ms: f64,
    pub total_notional: f64,
}

impl ExecutionMetrics {
    fn record(&mut self, result: &fill::FillResult) {
        self.total_fills += 1;
        if result.mid_or_better {
            self.mid_or_better += 1;
        }
        if result.within_nbbo {
            self.within_nbbo += 1;
        }
        self.total_notional += result.price * result.quantity as f64;
        self.mean_latency_ms += (result.avg_latency_ms - self.mean_latency_ms) / self.total_fills as f64;
    }

    pub fn mean_latency_ms(&self) -> f64 {
        self.mean_latency_ms
    }

    pub fn within_nbbo_rate(&self) -> f64 {
        if self.total_fills == 0 {
            0.0
        } else {
            self.within_nbbo as f64 / self.total_fills as f64
        }
    }
}

const SESSION_START: NaiveTime = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
const SESSION_END: NaiveTime = NaiveTime::from_hms_opt(21, 0, 0).unwrap();

fn in_session(ts: DateTime<Utc>) -> bool {
    let t = ts.time();
    t >= SESSION_START && t <= SESSION_END
}

fn in_pm_settlement_window(ts: DateTime<Utc>) -> bool {
    let t = ts.time();
    t >= NaiveTime::from_hms_opt(20, 59, 0).unwrap() && t <= NaiveTime::from_hms_opt(21, 1, 0).unwrap()
}

/// Orchestrates one run of the per-bar loop over a stream of bar
/// timestamps. Day-boundary resets live entirely inside `RiskManager`, so
/// the same runner instance can be driven across a multi-day bar stream.
pub struct BacktestRunner<'a> {
    pub bar_provider: &'a dyn BarProvider,
    pub calendar: &'a dyn CalendarProvider,
    pub options: &'a dyn OptionsProvider,
    pub config: &'a EngineConfig,
    pub regime_weights: RegimeWeights,
    pub builder_config: SpreadBuilderConfig,
    pub exit_config: ExitConfig,
    pub fill_profile: FillProfile,
}

impl<'a> BacktestRunner<'a> {
    pub fn run(&self, bars_ts: &[DateTime<Utc>]) -> RunReport {
        let mut risk = RiskManager::new(RiskManagerConfig {
            daily_loss_stop: self.config.risk.daily_loss_stop,
            max_concurrent_per_side: self.config.risk.max_concurrent_per_side,
            no_new_risk_minutes_to_close: self.config.no_new_risk_minutes_to_close,
            settlement_hour_utc: 21,
        });
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut active: Vec<(OpenPosition, String)> = Vec::new();
        let mut results: Vec<TradeResult> = Vec::new();
        let mut last_decision: Option<DateTime<Utc>> = None;
        let mut execution_by_day: std::collections::BTreeMap<chrono::NaiveDate, ExecutionMetrics> =
            std::collections::BTreeMap::new();
        let mut errors = crate::errors::ErrorTally::default();

        for &ts in bars_ts.iter().filter(|ts| in_session(**ts)) {
            self.update_open_positions(ts, &mut active, &mut risk, &mut results, &mut errors);

            if in_pm_settlement_window(ts) {
                self.force_close_all(ts, &mut active, &mut risk, &mut results, 0.0, ExitReason::PmCashSettlement);
            }

            let due = match last_decision {
                None => true,
                Some(prev) => (ts - prev).num_seconds() >= self.config.cadence_seconds,
            };
            if due {
                last_decision = Some(ts);
                let (short_iv, thirty_iv) = self.options.iv_proxies(ts);
                let regime = score_at(ts, self.bar_provider, self.calendar, short_iv, thirty_iv, &self.regime_weights);
                let decision = decide(regime);
                if decision != Decision::NoGo && risk.can_add(ts, decision) {
                    if let Some(order) = build_order(decision, ts, self.options, &self.builder_config) {
                        if risk.can_add_order(&order) {
                            let day_metrics = execution_by_day.entry(ts.date_naive()).or_default();
                            if let Some(position) = self.try_enter(ts, order, &mut rng, day_metrics, &mut errors) {
                                active.push((position, regime_label(&regime)));
                                risk.register_open(decision);
                            }
                        }
                    }
                }
            }
        }

        if let Some(&last_ts) = bars_ts.last() {
            self.force_close_all(last_ts, &mut active, &mut risk, &mut results, 0.01, ExitReason::ForcedExpiry);
        }

        let mut report = aggregate_trades(results);
        report.execution_by_day = execution_by_day;
        report.errors = errors;
        report
    }

    /// Fills one leg (short + protective long) and returns its net credit.
    /// A Condor's put and call sides are each filled through here and summed
    /// into one combined entry price, per the single-correlation-id
    /// composite-order design (see `strategies::spreads::CondorLegs`).
    fn fill_leg(
        &self,
        leg: &SpreadLeg,
        quotes: &[OptionQuote],
        rng: &mut StdRng,
        day_metrics: &mut ExecutionMetrics,
        errors: &mut crate::errors::ErrorTally,
    ) -> Option<f64> {
        let Some(short_quote) = find_quote(quotes, leg.right, leg.short_strike, leg.expiry) else {
            errors.record(&crate::errors::BacktestError::data("missing short-leg quote for entry fill"));
            return None;
        };
        let Some(long_quote) = find_quote(quotes, leg.right, leg.long_strike, leg.expiry) else {
            errors.record(&crate::errors::BacktestError::data("missing long-leg quote for entry fill"));
            return None;
        };
        let market_state = MarketState { is_event_risk: false, stress_level: 0.1 };
        let short_fill = fill::simulate_fill(Side::Sell, short_quote, 1, 10, &self.fill_profile, &market_state, rng)?;
        let long_fill = fill::simulate_fill(Side::Buy, long_quote, 1, 10, &self.fill_profile, &market_state, rng)?;
        day_metrics.record(&short_fill);
        day_metrics.record(&long_fill);
        Some(short_fill.price - long_fill.price)
    }

    fn try_enter(
        &self,
        ts: DateTime<Utc>,
        order: SpreadOrder,
        rng: &mut StdRng,
        day_metrics: &mut ExecutionMetrics,
        errors: &mut crate::errors::ErrorTally,
    ) -> Option<OpenPosition> {
        let quotes: Vec<OptionQuote> = self.options.quotes_at(ts).collect();
        let entry_price = match &order.condor {
            Some(condor) => {
                let put_credit = self.fill_leg(&condor.put, &quotes, rng, day_metrics, errors)?;
                let call_credit = self.fill_leg(&condor.call, &quotes, rng, day_metrics, errors)?;
                put_credit + call_credit
            }
            None => self.fill_leg(&order.leg, &quotes, rng, day_metrics, errors)?,
        };
        if entry_price < self.config.slippage.tick_value {
            return None;
        }
        Some(OpenPosition::new(order, entry_price, ts, self.config.slippage.tick_value))
    }

    /// Current mark and worst-case short delta for a position, combining
    /// both wings when the position is a Condor.
    fn mark(&self, quotes: &[OptionQuote], order: &SpreadOrder) -> Option<(f64, f64)> {
        match &order.condor {
            Some(condor) => {
                let put_short = find_quote(quotes, condor.put.right, condor.put.short_strike, condor.put.expiry)?;
                let put_long = find_quote(quotes, condor.put.right, condor.put.long_strike, condor.put.expiry)?;
                let call_short = find_quote(quotes, condor.call.right, condor.call.short_strike, condor.call.expiry)?;
                let call_long = find_quote(quotes, condor.call.right, condor.call.long_strike, condor.call.expiry)?;
                let value = (put_short.mid - put_long.mid).max(0.0) + (call_short.mid - call_long.mid).max(0.0);
                let worst_delta = if put_short.delta.abs() >= call_short.delta.abs() { put_short.delta } else { call_short.delta };
                Some((value, worst_delta))
            }
            None => {
                let short_q = find_quote(quotes, order.leg.right, order.leg.short_strike, order.leg.expiry)?;
                let long_q = find_quote(quotes, order.leg.right, order.leg.long_strike, order.leg.expiry)?;
                Some(((short_q.mid - long_q.mid).max(0.0), short_q.delta))
            }
        }
    }

    fn update_open_positions(
        &self,
        ts: DateTime<Utc>,
        active: &mut Vec<(OpenPosition, String)>,
        risk: &mut RiskManager,
        results: &mut Vec<TradeResult>,
        errors: &mut crate::errors::ErrorTally,
    ) {
        let quotes: Vec<OptionQuote> = self.options.quotes_at(ts).collect();
        let mut still_active = Vec::with_capacity(active.len());
        for (mut position, regime_label) in active.drain(..) {
            let Some((spread_value, short_delta)) = self.mark(&quotes, &position.order) else {
                errors.record(&crate::errors::BacktestError::data("missing quote while marking an open position"));
                still_active.push((position, regime_label));
                continue;
            };
            if let Some((exit_price, reason)) =
                fill::check_spread_exit(position.entry_price, spread_value, short_delta, &self.exit_config)
            {
                let fees = self.config.fees.round_trip();
                position.close(exit_price, ts, reason);
                self.finish_close(position, regime_label, fees, risk, results);
                continue;
            }
            still_active.push((position, regime_label));
        }
        *active = still_active;
    }

    fn force_close_all(
        &self,
        ts: DateTime<Utc>,
        active: &mut Vec<(OpenPosition, String)>,
        risk: &mut RiskManager,
        results: &mut Vec<TradeResult>,
        exit_price: f64,
        reason: ExitReason,
    ) {
        let fees = match reason {
            ExitReason::PmCashSettlement => self.config.fees.half_round_trip(),
            _ => self.config.fees.round_trip(),
        };
        for (mut position, regime_label) in active.drain(..) {
            position.close(exit_price, ts, reason);
            self.finish_close(position, regime_label, fees, risk, results);
        }
    }

    fn finish_close(
        &self,
        position: OpenPosition,
        market_regime: String,
        fees: f64,
        risk: &mut RiskManager,
        results: &mut Vec<TradeResult>,
    ) {
        let exit_price = position.exit_price.expect("closed position has exit_price");
        let pnl = (position.entry_price - exit_price) * 100.0 - fees;
        risk.register_close(position.order.decision, pnl);
        results.push(TradeResult {
            order: position.order,
            entry_price: position.entry_price,
            entry_ts: position.entry_ts,
            exit_price,
            exit_ts: position.exit_ts.expect("closed position has exit_ts"),
            exit_reason: position.exit_reason.expect("closed position has exit_reason"),
            fees,
            pnl,
            market_regime,
        });
    }
}

fn regime_label(regime: &crate::regime::RegimeScore) -> String {
    match (regime.calm, regime.up, regime.dn) {
        (true, _, _) => "calm".to_string(),
        (false, true, _) => "up".to_string(),
        (false, _, true) => "down".to_string(),
        _ => "neutral".to_string(),
    }
}

fn find_quote(quotes: &[OptionQuote], right: Right, strike: f64, expiry: chrono::NaiveDate) -> Option<OptionQuote> {
    quotes.iter().find(|q| q.right == right && q.expiry == expiry && (q.strike - strike).abs() < 1e-9).copied()
}

/// Aggregates a set of closed trades into a `RunReport`: net/gross P&L,
/// fees, win rate, and the daily-grouped Sharpe/drawdown statistics.
pub fn aggregate_trades(results: Vec<TradeResult>) -> RunReport {
    if results.is_empty() {
        return RunReport::default();
    }
    let gross_pnl: f64 = results.iter().map(|r| r.pnl + r.fees).sum();
    let fees: f64 = results.iter().map(|r| r.fees).sum();
    let net_pnl: f64 = results.iter().map(|r| r.pnl).sum();

    let wins: Vec<f64> = results.iter().map(|r| r.pnl).filter(|&p| p > 0.0).collect();
    let losses: Vec<f64> = results.iter().map(|r| r.pnl).filter(|&p| p <= 0.0).collect();
    let win_rate = wins.len() as f64 / results.len() as f64;
    let avg_win = if wins.is_empty() { 0.0 } else { wins.iter().sum::<f64>() / wins.len() as f64 };
    let avg_loss = if losses.is_empty() { 0.0 } else { losses.iter().sum::<f64>() / losses.len() as f64 };

    let mut by_day: std::collections::BTreeMap<chrono::NaiveDate, f64> = std::collections::BTreeMap::new();
    for r in &results {
        *by_day.entry(r.exit_ts.date_naive()).or_insert(0.0) += r.pnl;
    }
    let daily: Vec<f64> = by_day.values().copied().collect();
    let sharpe = sharpe_ratio(&daily);
    let max_drawdown = max_drawdown_from_daily(&daily);

    RunReport {
        trades: results,
        net_pnl,
        gross_pnl,
        fees,
        max_drawdown,
        sharpe,
        win_rate,
        avg_win,
        avg_loss,
        ..Default::default()
    }
}

fn sharpe_ratio(daily_pnl: &[f64]) -> f64 {
    if daily_pnl.len() < 2 {
        return 0.0;
    }
    let mean = daily_pnl.iter().sum::<f64>() / daily_pnl.len() as f64;
    let variance = daily_pnl.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (daily_pnl.len() - 1) as f64;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return 0.0;
    }
    (mean / stddev) * (252.0_f64).sqrt()
}

fn max_drawdown_from_daily(daily_pnl: &[f64]) -> f64 {
    let mut equity = 0.0;
    let mut peak: f64 = 0.0;
    let mut worst = 0.0;
    for pnl in daily_pnl {
        equity += pnl;
        peak = peak.max(equity);
        worst = worst.min(equity - peak);
    }
    worst.abs()
}

/// Persists every closed trade in `trades` to the per-day store. A write
/// failure (after `TradeLogStore::append`'s own internal retry) is recorded
/// in `errors` and logged, not propagated — the run continues persisting
/// the remaining trades rather than aborting on the first bad write.
pub async fn persist_trades(
    store: &TradeLogStore,
    underlying: &str,
    trades: &[TradeResult],
    errors: &mut crate::errors::ErrorTally,
) {
    for trade in trades {
        let record = TradeRecord {
            timestamp: trade.order.timestamp,
            symbol: underlying.to_string(),
            expiry: trade.order.leg.expiry,
            right: format!("{:?}", trade.order.leg.right),
            strike: Decimal::try_from(trade.order.leg.short_strike).unwrap_or_default(),
            spread_type: format!("{:?}", trade.order.decision),
            max_loss: Decimal::try_from(trade.order.worst_case_loss()).unwrap_or_default(),
            exit_pnl: Decimal::try_from(trade.pnl).unwrap_or_default(),
            exit_reason: trade.exit_reason.label().to_string(),
            market_regime: trade.market_regime.clone(),
            json_data: "{}".to_string(),
        };
        if let Err(e) = store.append(&record).await {
            errors.record(&e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_predicate_matches_spec_window() {
        let day = Utc::now().date_naive();
        let before = day.and_hms_opt(14, 0, 0).unwrap().and_utc();
        let start = day.and_hms_opt(14, 30, 0).unwrap().and_utc();
        let end = day.and_hms_opt(21, 0, 0).unwrap().and_utc();
        let after = day.and_hms_opt(21, 1, 0).unwrap().and_utc();
        assert!(!in_session(before));
        assert!(in_session(start));
        assert!(in_session(end));
        assert!(!in_session(after));
    }

    #[test]
    fn pm_settlement_window_is_20_59_to_21_01() {
        let day = Utc::now().date_naive();
        let just_before = day.and_hms_opt(20, 58, 59).unwrap().and_utc();
        let inside = day.and_hms_opt(21, 0, 0).unwrap().and_utc();
        let just_after = day.and_hms_opt(21, 1, 1).unwrap().and_utc();
        assert!(!in_pm_settlement_window(just_before));
        assert!(in_pm_settlement_window(inside));
        assert!(!in_pm_settlement_window(just_after));
    }

    #[test]
    fn empty_results_yield_default_report() {
        let report = aggregate_trades(vec![]);
        assert_eq!(report.net_pnl, 0.0);
        assert_eq!(report.trades.len(), 0);
    }

    #[test]
    fn sharpe_is_zero_for_constant_pnl_series() {
        assert_eq!(sharpe_ratio(&[10.0, 10.0, 10.0]), 0.0);
    }
}
