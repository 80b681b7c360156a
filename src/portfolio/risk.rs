// Admission gates and the reverse-Fibonacci per-trade loss budget.
// Follows `risk_analytics::RiskAnalyzer`'s limit checks over a running
// portfolio state and `manager::PortfolioManager`'s day-scoped counters,
// generalized to the per-bar gate sequence the backtest loop consults
// before every entry.

use chrono::{DateTime, NaiveDate, Utc};

use crate::strategies::spreads::{Decision, SpreadOrder};

/// Reverse-Fibonacci per-trade loss budget, indexed by consecutive loss
/// days and clamped to the last element beyond index 5.
const REVERSE_FIBONACCI_BUDGET: [f64; 6] = [1200.0, 800.0, 500.0, 300.0, 150.0, 75.0];

#[derive(Debug, Clone, Copy)]
pub struct RiskManagerConfig {
    pub daily_loss_stop: f64,
    pub max_concurrent_per_side: u32,
    pub no_new_risk_minutes_to_close: i64,
    pub settlement_hour_utc: u32,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskManagerConfig,
    current_day: Option<NaiveDate>,
    daily_realized_pnl: f64,
    active_put: u32,
    active_call: u32,
    consecutive_loss_days: u32,
}

impl RiskManager {
    pub fn new(config: RiskManagerConfig) -> Self {
        Self {
            config,
            current_day: None,
            daily_realized_pnl: 0.0,
            active_put: 0,
            active_call: 0,
            consecutive_loss_days: 0,
        }
    }

    pub fn daily_realized_pnl(&self) -> f64 {
        self.daily_realized_pnl
    }

    pub fn consecutive_loss_days(&self) -> u32 {
        self.consecutive_loss_days
    }

    /// Day-boundary reset: if `ts`'s date differs from the tracked day,
    /// zero the daily counters and roll the loss streak. On the very first
    /// call this only sets `current_day`.
    fn roll_day(&mut self, ts: DateTime<Utc>) {
        let day = ts.date_naive();
        match self.current_day {
            None => self.current_day = Some(day),
            Some(prev) if prev != day => {
                if self.daily_realized_pnl < 0.0 {
                    self.consecutive_loss_days += 1;
                } else {
                    self.consecutive_loss_days = 0;
                }
                self.daily_realized_pnl = 0.0;
                self.active_put = 0;
                self.active_call = 0;
                self.current_day = Some(day);
            }
            Some(_) => {}
        }
    }

    /// All three admission gates: daily loss, gamma-hour, concurrency.
    pub fn can_add(&mut self, ts: DateTime<Utc>, decision: Decision) -> bool {
        self.roll_day(ts);

        if self.daily_realized_pnl <= -self.config.daily_loss_stop {
            return false;
        }

        let minutes_to_close =
            crate::quoting::synthesizer::minutes_to_settlement(ts, self.config.settlement_hour_utc);
        if minutes_to_close < self.config.no_new_risk_minutes_to_close {
            return false;
        }

        match decision {
            Decision::NoGo => false,
            Decision::Condor => {
                self.active_put < self.config.max_concurrent_per_side
                    && self.active_call < self.config.max_concurrent_per_side
            }
            Decision::SingleSidePut => self.active_put < self.config.max_concurrent_per_side,
            Decision::SingleSideCall => self.active_call < self.config.max_concurrent_per_side,
        }
    }

    /// Reverse-Fibonacci per-order worst-case-loss check.
    pub fn can_add_order(&self, order: &SpreadOrder) -> bool {
        let level_idx = (self.consecutive_loss_days as usize).min(REVERSE_FIBONACCI_BUDGET.len() - 1);
        let level = REVERSE_FIBONACCI_BUDGET[level_idx];
        let remaining = (level - self.daily_realized_pnl.abs()).max(0.0);
        order.worst_case_loss() <= remaining
    }

    pub fn register_open(&mut self, decision: Decision) {
        match decision {
            Decision::Condor => {
                self.active_put += 1;
                self.active_call += 1;
            }
            Decision::SingleSidePut => self.active_put += 1,
            Decision::SingleSideCall => self.active_call += 1,
            Decision::NoGo => {}
        }
    }

    pub fn register_close(&mut self, decision: Decision, pnl: f64) {
        match decision {
            Decision::Condor => {
                self.active_put = self.active_put.saturating_sub(1);
                self.active_call = self.active_call.saturating_sub(1);
            }
            Decision::SingleSidePut => self.active_put = self.active_put.saturating_sub(1),
            Decision::SingleSideCall => self.active_call = self.active_call.saturating_sub(1),
            Decision::NoGo => {}
        }
        self.daily_realized_pnl += pnl;
    }
}
