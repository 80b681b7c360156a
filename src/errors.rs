// Error taxonomy for the backtesting core.
//
// Configuration errors and invariant violations are fatal; data, fill, and
// store errors are caught by the backtest loop and recorded as diagnostics.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    /// Missing files, invalid ranges — fail fast at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing bar on expected date, empty quote chain — per-bar skip, never fatal.
    #[error("data error: {0}")]
    Data(String),

    /// Trade-log write failure after one synchronous retry.
    #[error("store error: {0}")]
    Store(String),

    /// bid > ask post-construction, negative credit passing gates, etc.
    /// Treated as a programmer error: fail loudly with context.
    #[error("invariant violation in {component}: {detail}")]
    Invariant { component: &'static str, detail: String },
}

impl BacktestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn invariant(component: &'static str, detail: impl Into<String>) -> Self {
        Self::Invariant { component, detail: detail.into() }
    }

    /// Category label used for the end-of-run error tally.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Data(_) => "data",
            Self::Store(_) => "store",
            Self::Invariant { .. } => "invariant",
        }
    }
}

/// Tally of non-fatal errors caught over a run, keyed by category.
#[derive(Debug, Clone, Default)]
pub struct ErrorTally {
    pub data_errors: u64,
    pub store_errors: u64,
}

impl ErrorTally {
    pub fn record(&mut self, err: &BacktestError) {
        match err {
            BacktestError::Data(msg) => {
                self.data_errors += 1;
                log::warn!(target: "backtest", "data error: {msg}");
            }
            BacktestError::Store(msg) => {
                self.store_errors += 1;
                log::error!(target: "backtest", "store error (non-fatal): {msg}");
            }
            BacktestError::Config(msg) => {
                log::error!(target: "backtest", "fatal configuration error: {msg}");
            }
            BacktestError::Invariant { component, detail } => {
                log::error!(target: "backtest", "invariant violation in {component}: {detail}");
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.data_errors + self.store_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_by_category() {
        let _ = env_logger::try_init();
        let mut tally = ErrorTally::default();
        tally.record(&BacktestError::data("missing bar"));
        tally.record(&BacktestError::store("write failed twice"));
        tally.record(&BacktestError::data("empty quote chain"));

        assert_eq!(tally.data_errors, 2);
        assert_eq!(tally.store_errors, 1);
        assert_eq!(tally.total(), 3);
    }
}
