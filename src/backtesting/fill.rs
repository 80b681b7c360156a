// Order fill simulation and per-bar exit checks: a participation-scaled,
// √-impact cost model generalized from a daily-bar slippage/partial-fill
// composition into a per-child, latency-and-Bernoulli NBBO fill simulator.

use rand::Rng;

use crate::models::quote::OptionQuote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy)]
pub struct FillProfile {
    pub max_tob_participation: f64,
    pub latency_ms_mean: f64,
    pub latency_ms_stddev: f64,
    pub latency_ms_floor: f64,
    pub slippage_floor_per_contract: f64,
    pub slippage_floor_pct_of_spread: f64,
    pub adverse_bps: f64,
    pub size_penalty_bps: f64,
    /// When `false`, `p_mid` is forced to 0 regardless of spread — the
    /// Conservative profile named in the fill-engine audit contracts.
    pub allow_mid_fills: bool,
}

impl Default for FillProfile {
    /// The Conservative profile: mid-price fills disabled, so every fill
    /// walks to the touch plus slippage, keeping fills within NBBO and never
    /// accepting a mid.
    fn default() -> Self {
        Self {
            max_tob_participation: 0.30,
            latency_ms_mean: 120.0,
            latency_ms_stddev: 50.0,
            latency_ms_floor: 10.0,
            slippage_floor_per_contract: 0.01,
            slippage_floor_pct_of_spread: 0.10,
            adverse_bps: 5.0,
            size_penalty_bps: 3.0,
            allow_mid_fills: false,
        }
    }
}

impl FillProfile {
    /// Probability of a mid-price fill attempt succeeding, decreasing as the
    /// quoted spread (in cents) widens. Tunable; defaults chosen so a
    /// 5-cent spread attempts the mid about half the time. Returns 0 outright
    /// when `allow_mid_fills` is false.
    pub fn mid_fill_probability(&self, spread_cents: f64) -> f64 {
        if !self.allow_mid_fills {
            return 0.0;
        }
        (0.90 - 0.08 * spread_cents).clamp(0.05, 0.90)
    }

    /// A profile with mid-price fills enabled, for tests/scenarios that want
    /// to exercise the mid-fill path explicitly.
    pub fn with_mid_fills() -> Self {
        Self { allow_mid_fills: true, ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MarketState {
    pub is_event_risk: bool,
    /// 0 (calm) to 1 (extreme stress); scales the latency-advance quote
    /// perturbation, up to 1% of price at stress_level = 1.
    pub stress_level: f64,
}

/// Fills outside this band of the originally-quoted NBBO are counted as
/// NBBO violations by the per-day execution audit.
pub const NBBO_TOLERANCE: f64 = 0.02;

#[derive(Debug, Clone, Copy)]
pub struct FillResult {
    /// Quantity-weighted average fill price across all children.
    pub price: f64,
    pub quantity: u32,
    pub children: u32,
    pub mid_fills: u32,
    /// Mean simulated latency across the fill's children, in milliseconds.
    pub avg_latency_ms: f64,
    /// Whether `price` was at least as good as the quoted mid for `side`.
    pub mid_or_better: bool,
    /// Whether `price` landed within `NBBO_TOLERANCE` of the original quote.
    pub within_nbbo: bool,
}

/// Simulates filling `quantity` contracts of `side` against `quote`, split
/// into participation-capped children.
pub fn simulate_fill(
    side: Side,
    quote: OptionQuote,
    quantity: u32,
    top_of_book_size: u32,
    profile: &FillProfile,
    market_state: &MarketState,
    rng: &mut impl Rng,
) -> Option<FillResult> {
    if quantity == 0 {
        return None;
    }
    let tob = top_of_book_size.max(1);

    let max_child = (tob as f64 * profile.max_tob_participation).floor() as u32;
    let children = split_into_children(quantity, max_child);
    let child_count = children.len() as u32;

    let mut total_notional = 0.0;
    let mut total_qty = 0u32;
    let mut mid_fills = 0u32;
    let mut total_latency_ms = 0.0;

    for child_qty in children {
        let (price, was_mid, latency_ms) = fill_child(side, quote, child_qty, tob, profile, market_state, rng);
        total_notional += price * child_qty as f64;
        total_qty += child_qty;
        total_latency_ms += latency_ms;
        if was_mid {
            mid_fills += 1;
        }
    }

    let price = total_notional / total_qty as f64;
    let mid_or_better = match side {
        Side::Buy => price <= quote.mid + 1e-9,
        Side::Sell => price >= quote.mid - 1e-9,
    };
    let within_nbbo = price >= quote.bid - NBBO_TOLERANCE && price <= quote.ask + NBBO_TOLERANCE;

    Some(FillResult {
        price,
        quantity: total_qty,
        children: child_count,
        mid_fills,
        avg_latency_ms: total_latency_ms / child_count as f64,
        mid_or_better,
        within_nbbo,
    })
}

fn split_into_children(quantity: u32, max_child: u32) -> Vec<u32> {
    if max_child == 0 || max_child >= quantity {
        return vec![quantity];
    }
    let mut remaining = quantity;
    let mut children = Vec::new();
    while remaining > max_child {
        children.push(max_child);
        remaining -= max_child;
    }
    if remaining > 0 {
        children.push(remaining);
    }
    children
}

fn fill_child(
    side: Side,
    quote: OptionQuote,
    child_qty: u32,
    top_of_book_size: u32,
    profile: &FillProfile,
    market_state: &MarketState,
    rng: &mut impl Rng,
) -> (f64, bool, f64) {
    let spread = quote.ask - quote.bid;
    let spread_cents = spread * 100.0;

    let mut p_mid = profile.mid_fill_probability(spread_cents);
    if market_state.is_event_risk {
        p_mid *= 0.5;
    }
    let attempt_mid = rng.gen::<f64>() < p_mid;

    let latency_ms = sample_truncated_normal(
        rng,
        profile.latency_ms_mean,
        profile.latency_ms_stddev,
        profile.latency_ms_floor,
    );
    let latency_scale = (latency_ms / profile.latency_ms_mean.max(1.0)).min(3.0);
    let (mut bid, mut ask) = advance_quote(quote.bid, quote.ask, market_state.stress_level * latency_scale, rng);

    if ask < bid + 0.01 {
        ask = bid + 0.01;
    }
    let updated_spread = ask - bid;

    if attempt_mid && updated_spread <= spread && rng.gen::<f64>() < p_mid {
        let mid = (bid + ask) / 2.0;
        return (mid.max(0.01), true, latency_ms);
    }

    let touch = match side {
        Side::Buy => ask,
        Side::Sell => bid,
    };

    let slip = profile
        .slippage_floor_per_contract
        .max(profile.slippage_floor_pct_of_spread * updated_spread)
        .min(updated_spread);
    let mut price = match side {
        Side::Buy => touch + slip,
        Side::Sell => touch - slip,
    };

    let moved_against = match side {
        Side::Buy => ask > quote.ask,
        Side::Sell => bid < quote.bid,
    };
    if moved_against {
        price += match side {
            Side::Buy => profile.adverse_bps / 10_000.0 * updated_spread,
            Side::Sell => -(profile.adverse_bps / 10_000.0 * updated_spread),
        };
    }
    if child_qty > top_of_book_size {
        let excess_penalty =
            (child_qty as f64 / top_of_book_size as f64 - 1.0) * profile.size_penalty_bps / 10_000.0 * updated_spread;
        price += match side {
            Side::Buy => excess_penalty,
            Side::Sell => -excess_penalty,
        };
    }

    (price.max(0.01), false, latency_ms)
}

fn advance_quote(bid: f64, ask: f64, stress_level: f64, rng: &mut impl Rng) -> (f64, f64) {
    let mid = (bid + ask) / 2.0;
    let max_perturbation = mid * 0.01 * stress_level.clamp(0.0, 1.0);
    let perturb = if max_perturbation > 0.0 {
        rng.gen_range(-max_perturbation..=max_perturbation)
    } else {
        0.0
    };
    (bid + perturb, ask + perturb)
}

fn sample_truncated_normal(rng: &mut impl Rng, mean: f64, stddev: f64, floor: f64) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (mean + z * stddev).max(floor)
}

/// Worst-case fill price: the touch price adjusted by every penalty term at
/// its worst allowable magnitude, for conservative pre-trade risk estimation.
pub fn worst_case_fill(side: Side, quote: OptionQuote, quantity: u32, top_of_book_size: u32, profile: &FillProfile) -> f64 {
    let tob = top_of_book_size.max(1);
    let spread = quote.ask - quote.bid;
    let touch = match side {
        Side::Buy => quote.ask,
        Side::Sell => quote.bid,
    };
    let slip = profile
        .slippage_floor_per_contract
        .max(profile.slippage_floor_pct_of_spread * spread)
        .min(spread.max(0.01));
    let adverse = profile.adverse_bps / 10_000.0 * spread;
    let size_penalty = if quantity > tob {
        (quantity as f64 / tob as f64 - 1.0) * profile.size_penalty_bps / 10_000.0 * spread
    } else {
        0.0
    };
    let total = slip + adverse + size_penalty;
    match side {
        Side::Buy => touch + total,
        Side::Sell => (touch - total).max(0.01),
    }
}

/// Exit reason + price for the per-bar checks consulted on every open
/// position (credit-multiple stop, delta breach, PM settlement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    CreditMultipleStop,
    DeltaBreach,
    PmCashSettlement,
    ForcedExpiry,
}

impl ExitReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreditMultipleStop => "Stop credit xN",
            Self::DeltaBreach => "Delta>θ",
            Self::PmCashSettlement => "PM cash settlement",
            Self::ForcedExpiry => "Expiry",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExitConfig {
    pub credit_multiple: f64,
    pub delta_breach: f64,
    pub exit_half_spread_ticks: f64,
    pub tick: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self { credit_multiple: 2.2, delta_breach: 0.33, exit_half_spread_ticks: 1.0, tick: crate::models::quote::TICK }
    }
}

impl From<&crate::config::EngineConfig> for ExitConfig {
    /// Derives the runtime exit thresholds from `stops`/`slippage` so a
    /// config file actually governs the credit-multiple stop and delta
    /// breach instead of the engine silently running on hardcoded defaults.
    fn from(config: &crate::config::EngineConfig) -> Self {
        Self {
            credit_multiple: config.stops.credit_multiple,
            delta_breach: config.stops.delta_breach,
            exit_half_spread_ticks: config.slippage.exit_half_spread_ticks,
            tick: config.slippage.tick_value,
        }
    }
}

/// Checks the credit-multiple stop and delta-breach exit conditions for a
/// position that is still within the trading session. PM-settlement and
/// forced-terminal-close are time-window checks applied by the loop
/// directly, since they don't depend on the current quote.
pub fn check_spread_exit(
    entry_price: f64,
    current_spread_value: f64,
    short_delta: f64,
    config: &ExitConfig,
) -> Option<(f64, ExitReason)> {
    let exit_price = current_spread_value + config.exit_half_spread_ticks * config.tick;
    if current_spread_value >= entry_price * config.credit_multiple {
        return Some((exit_price, ExitReason::CreditMultipleStop));
    }
    if short_delta.abs() >= config.delta_breach {
        return Some((exit_price, ExitReason::DeltaBreach));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rand::SeedableRng;

    fn quote() -> OptionQuote {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 15, 0, 0).unwrap();
        OptionQuote::new(ts, ts.date_naive(), 100.0, crate::models::option_math::Right::Put, 0.45, 0.55, -0.12, 0.20)
    }

    #[test]
    fn fill_result_quantity_matches_request() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let profile = FillProfile::default();
        let state = MarketState { is_event_risk: false, stress_level: 0.1 };
        let result = simulate_fill(Side::Sell, quote(), 5, 20, &profile, &state, &mut rng).unwrap();
        assert_eq!(result.quantity, 5);
        assert!(result.price > 0.0);
    }

    #[test]
    fn large_order_splits_into_participation_capped_children() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let profile = FillProfile { max_tob_participation: 0.25, ..FillProfile::default() };
        let state = MarketState { is_event_risk: false, stress_level: 0.0 };
        let result = simulate_fill(Side::Buy, quote(), 10, 8, &profile, &state, &mut rng).unwrap();
        assert_eq!(result.quantity, 10);
    }

    #[test]
    fn credit_multiple_stop_triggers_above_threshold() {
        let config = ExitConfig::default();
        let exit = check_spread_exit(0.30, 0.30 * 2.2 + 0.01, -0.10, &config);
        assert_eq!(exit.map(|(_, r)| r), Some(ExitReason::CreditMultipleStop));
    }

    #[test]
    fn delta_breach_triggers_independent_of_credit_multiple() {
        let config = ExitConfig::default();
        let exit = check_spread_exit(0.30, 0.10, -0.40, &config);
        assert_eq!(exit.map(|(_, r)| r), Some(ExitReason::DeltaBreach));
    }

    #[test]
    fn within_thresholds_no_exit() {
        let config = ExitConfig::default();
        assert!(check_spread_exit(0.30, 0.20, -0.10, &config).is_none());
    }

    #[test]
    fn conservative_profile_never_attempts_mid() {
        let profile = FillProfile::default();
        assert!(!profile.allow_mid_fills);
        assert_eq!(profile.mid_fill_probability(5.0), 0.0);
    }

    #[test]
    fn conservative_profile_fills_are_within_nbbo_band() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(99);
        let profile = FillProfile::default();
        let state = MarketState { is_event_risk: false, stress_level: 0.2 };
        let q = quote();
        let mut within = 0u32;
        let mut mid_accepted = 0u32;
        for _ in 0..1000 {
            let result = simulate_fill(Side::Sell, q, 1, 20, &profile, &state, &mut rng).unwrap();
            if result.price >= q.bid - 0.01 && result.price <= q.ask + 0.01 {
                within += 1;
            }
            mid_accepted += result.mid_fills;
        }
        assert!(within as f64 / 1000.0 >= 0.98, "within={within}");
        assert_eq!(mid_accepted, 0);
    }

    #[test]
    fn worst_case_fill_is_worse_than_touch_for_buy() {
        let profile = FillProfile::default();
        let q = quote();
        let wc = worst_case_fill(Side::Buy, q, 5, 10, &profile);
        assert!(wc >= q.ask);
    }
}
