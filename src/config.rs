#![allow(dead_code)]
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::BacktestError;

/// Full engine configuration record. Loaded via `serde_json` off a file
/// path, with an explicit `validate()` step since a malformed range or
/// non-positive tick value must fail fast at startup, not mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub underlying: String,
    pub timezone: String,
    pub rth_only: bool,
    #[serde(default = "default_cadence_seconds")]
    pub cadence_seconds: i64,
    #[serde(default = "default_no_new_risk_minutes")]
    pub no_new_risk_minutes_to_close: i64,
    pub slippage: SlippageConfig,
    pub fees: FeesConfig,
    pub risk: RiskConfig,
    #[serde(default)]
    pub stops: StopsConfig,
    pub seed: u64,
}

fn default_cadence_seconds() -> i64 {
    3600
}

fn default_no_new_risk_minutes() -> i64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageConfig {
    pub entry_half_spread_ticks: f64,
    pub exit_half_spread_ticks: f64,
    pub tick_value: f64,
    pub late_session_extra_ticks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesConfig {
    pub commission_per_contract: f64,
    pub exchange_fees_per_contract: f64,
}

impl FeesConfig {
    /// Two-way round-trip fee total: `2·(commission + exchange_fees)`.
    pub fn round_trip(&self) -> f64 {
        2.0 * (self.commission_per_contract + self.exchange_fees_per_contract)
    }

    /// Half-round-trip, used by the PM-settlement forced close.
    pub fn half_round_trip(&self) -> f64 {
        self.commission_per_contract + self.exchange_fees_per_contract
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub daily_loss_stop: f64,
    pub max_concurrent_per_side: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopsConfig {
    #[serde(default = "default_credit_multiple")]
    pub credit_multiple: f64,
    #[serde(default = "default_delta_breach")]
    pub delta_breach: f64,
}

fn default_credit_multiple() -> f64 {
    2.2
}

fn default_delta_breach() -> f64 {
    0.33
}

impl Default for StopsConfig {
    fn default() -> Self {
        Self { credit_multiple: default_credit_multiple(), delta_breach: default_delta_breach() }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, BacktestError> {
        let content = fs::read_to_string(&path)
            .map_err(|e| BacktestError::config(format!("reading {}: {e}", path.as_ref().display())))?;
        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|e| BacktestError::config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.end < self.start {
            return Err(BacktestError::config("end date precedes start date"));
        }
        if self.cadence_seconds <= 0 {
            return Err(BacktestError::config("cadence_seconds must be positive"));
        }
        if self.no_new_risk_minutes_to_close < 0 {
            return Err(BacktestError::config("no_new_risk_minutes_to_close must be non-negative"));
        }
        if self.risk.daily_loss_stop <= 0.0 {
            return Err(BacktestError::config("risk.daily_loss_stop must be positive"));
        }
        if self.risk.max_concurrent_per_side == 0 {
            return Err(BacktestError::config("risk.max_concurrent_per_side must be at least 1"));
        }
        if self.slippage.tick_value <= 0.0 {
            return Err(BacktestError::config("slippage.tick_value must be positive"));
        }
        if self.stops.credit_multiple <= 1.0 {
            return Err(BacktestError::config("stops.credit_multiple must exceed 1.0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod engine_config_tests {
    use super::*;
    use chrono::NaiveDate;

    fn valid() -> EngineConfig {
        EngineConfig {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            underlying: "XSP".into(),
            timezone: "America/New_York".into(),
            rth_only: true,
            cadence_seconds: 3600,
            no_new_risk_minutes_to_close: 60,
            slippage: SlippageConfig {
                entry_half_spread_ticks: 1.0,
                exit_half_spread_ticks: 1.0,
                tick_value: 0.05,
                late_session_extra_ticks: 1.0,
            },
            fees: FeesConfig { commission_per_contract: 0.65, exchange_fees_per_contract: 0.10 },
            risk: RiskConfig { daily_loss_stop: 200.0, max_concurrent_per_side: 1 },
            stops: StopsConfig::default(),
            seed: 42,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut c = valid();
        c.end = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_daily_loss_stop_is_rejected() {
        let mut c = valid();
        c.risk.daily_loss_stop = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn fees_round_trip_doubles_half_round_trip() {
        let c = valid();
        assert!((c.fees.round_trip() - 2.0 * c.fees.half_round_trip()).abs() < 1e-9);
    }
}