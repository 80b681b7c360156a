// Decision tagging and spread construction. Builds on the iron-condor/
// credit-spread wing search formerly in this file as
// `detect_iron_condors`/`detect_credit_call_spreads`, generalized from a
// JSON-chain scan into a live, delta-banded single-expiry builder over
// `OptionsProvider`.

use chrono::{DateTime, Utc};

use crate::market_data::providers::OptionsProvider;
use crate::models::option_math::Right;
use crate::models::quote::OptionQuote;
use crate::regime::RegimeScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoGo,
    Condor,
    SingleSidePut,
    SingleSideCall,
}

/// Applies the decision rule to a regime score. The `NoGo`/`Condor`/
/// trend thresholds (-1, 0, 2) are the documented defaults; the regime
/// weights feeding the score itself remain configurable in `RegimeWeights`.
pub fn decide(regime: RegimeScore) -> Decision {
    if regime.score <= -1 {
        return Decision::NoGo;
    }
    if regime.calm && regime.score >= 0 {
        return Decision::Condor;
    }
    if regime.up && regime.score >= 2 {
        return Decision::SingleSideCall;
    }
    if regime.dn && regime.score >= 2 {
        return Decision::SingleSidePut;
    }
    Decision::NoGo
}

#[derive(Debug, Clone, Copy)]
pub struct DeltaBand {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SpreadBuilderConfig {
    pub condor_delta_band: DeltaBand,
    pub single_side_delta_band: DeltaBand,
    /// Target long-leg width, in underlying points (default 1.0 for XSP).
    pub target_width: f64,
    pub min_credit: f64,
}

impl Default for SpreadBuilderConfig {
    fn default() -> Self {
        Self {
            condor_delta_band: DeltaBand { low: 0.07, high: 0.15 },
            single_side_delta_band: DeltaBand { low: 0.10, high: 0.20 },
            target_width: 1.0,
            min_credit: 0.05,
        }
    }
}

/// One side of a spread: the sold (short) leg and the protective (long) leg.
/// Shares a single expiry and right; `K_short > K_long` for a put spread,
/// `K_short < K_long` for a call spread.
#[derive(Debug, Clone, Copy)]
pub struct SpreadLeg {
    pub right: Right,
    pub short_strike: f64,
    pub long_strike: f64,
    pub expiry: chrono::NaiveDate,
}

impl SpreadLeg {
    pub fn width(&self) -> f64 {
        (self.long_strike - self.short_strike).abs()
    }
}

/// The second side of a Condor, carried alongside the primary `SpreadOrder`
/// so both legs are admitted or rejected atomically under one correlation id
/// — kept as one composite order rather than two independently-gated
/// `SpreadOrder`s.
#[derive(Debug, Clone, Copy)]
pub struct CondorLegs {
    pub put: SpreadLeg,
    pub call: SpreadLeg,
    pub put_credit: f64,
    pub call_credit: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SpreadOrder {
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub leg: SpreadLeg,
    pub credit: f64,
    /// Present only for `Decision::Condor`; carries the call-side leg (`leg`
    /// above holds the put side by convention).
    pub condor: Option<CondorLegs>,
}

impl SpreadOrder {
    pub fn width(&self) -> f64 {
        self.leg.width()
    }

    /// Worst-case loss per contract, in dollars, as compared against the
    /// reverse-Fibonacci risk budget: `(width - credit) * 100` single-sided, or
    /// `width*100 - credit` for a Condor (worst wing less combined credit).
    pub fn worst_case_loss(&self) -> f64 {
        match &self.condor {
            Some(c) => self.leg.width().max(c.call.width()) * 100.0 - (c.put_credit + c.call_credit),
            None => (self.leg.width() - self.credit) * 100.0,
        }
    }
}

/// Builds a `SpreadOrder` for the given decision, or `None` if any
/// builder constraint fails — a silent no-trade, not an error.
pub fn build_order(
    decision: Decision,
    ts: DateTime<Utc>,
    options: &dyn OptionsProvider,
    config: &SpreadBuilderConfig,
) -> Option<SpreadOrder> {
    match decision {
        Decision::NoGo => None,
        Decision::SingleSidePut => {
            let (leg, credit) = build_side(ts, options, Right::Put, config.single_side_delta_band, config)?;
            Some(SpreadOrder { timestamp: ts, decision, leg, credit, condor: None })
        }
        Decision::SingleSideCall => {
            let (leg, credit) = build_side(ts, options, Right::Call, config.single_side_delta_band, config)?;
            Some(SpreadOrder { timestamp: ts, decision, leg, credit, condor: None })
        }
        Decision::Condor => {
            let (put_leg, put_credit) = build_side(ts, options, Right::Put, config.condor_delta_band, config)?;
            let (call_leg, call_credit) = build_side(ts, options, Right::Call, config.condor_delta_band, config)?;
            Some(SpreadOrder {
                timestamp: ts,
                decision,
                leg: put_leg,
                credit: put_credit,
                condor: Some(CondorLegs { put: put_leg, call: call_leg, put_credit, call_credit }),
            })
        }
    }
}

fn build_side(
    ts: DateTime<Utc>,
    options: &dyn OptionsProvider,
    right: Right,
    band: DeltaBand,
    config: &SpreadBuilderConfig,
) -> Option<(SpreadLeg, f64)> {
    let expiry = options.today_expiry(ts);
    let candidates: Vec<OptionQuote> = options
        .quotes_at(ts)
        .filter(|q| q.right == right && q.expiry == expiry)
        .filter(|q| band.low <= q.delta.abs() && q.delta.abs() <= band.high)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let band_mid = (band.low + band.high) / 2.0;
    let short = candidates
        .iter()
        .min_by(|a, b| {
            let da = (a.delta.abs() - band_mid).abs();
            let db = (b.delta.abs() - band_mid).abs();
            da.partial_cmp(&db)
                .unwrap()
                .then_with(|| b.delta.abs().partial_cmp(&a.delta.abs()).unwrap())
                .then_with(|| b.mid.partial_cmp(&a.mid).unwrap())
        })
        .copied()?;

    let all_quotes: Vec<OptionQuote> =
        options.quotes_at(ts).filter(|q| q.right == right && q.expiry == expiry).collect();

    let farther_otm = |q: &OptionQuote| -> bool {
        match right {
            Right::Put => q.strike < short.strike,
            Right::Call => q.strike > short.strike,
        }
    };

    let target = config.target_width;
    let min_width = 0.8 * target;
    let max_width = 1.25 * target;

    let exact = all_quotes
        .iter()
        .find(|q| farther_otm(q) && (q.strike - short.strike).abs() == target);

    let long = if let Some(q) = exact {
        *q
    } else {
        all_quotes
            .iter()
            .filter(|q| farther_otm(q))
            .filter(|q| {
                let w = (q.strike - short.strike).abs();
                w >= min_width && w <= max_width
            })
            .min_by(|a, b| {
                let wa = ((a.strike - short.strike).abs() - target).abs();
                let wb = ((b.strike - short.strike).abs() - target).abs();
                wa.partial_cmp(&wb).unwrap()
            })
            .copied()?
    };

    let credit = short.bid - long.ask;
    if credit <= config.min_credit {
        return None;
    }

    Some((SpreadLeg { right, short_strike: short.strike, long_strike: long.strike, expiry }, credit))
}
