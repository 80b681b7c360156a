// Black-Scholes pricing under a simplifying contract: r = 0, q = 0
// (zero risk-free rate, zero dividend yield). Uses an Abramowitz & Stegun
// approximation of the standard normal CDF.

/// 1 / sqrt(2*pi)
const FRAC_1_SQRT_2PI: f64 = 0.39894228040143267793994605993439;

/// Minimum time-to-expiry (years) to avoid the d1/d2 singularity at expiry.
pub const MIN_TIME_TO_EXPIRY: f64 = 5e-4;

/// Floor applied to synthesized option prices.
pub const MIN_PRICE: f64 = 0.05;

fn norm_pdf(x: f64) -> f64 {
    FRAC_1_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF, accurate to ~1e-7 (Abramowitz & Stegun 26.2.17).
pub fn norm_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x.is_infinite() {
        return if x.is_sign_positive() { 1.0 } else { 0.0 };
    }
    if x >= 0.0 {
        let t = 1.0 / (1.0 + 0.2316419 * x);
        let poly = t
            * (0.319381530
                + t * (-0.356563782
                    + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
        1.0 - norm_pdf(x) * poly
    } else {
        1.0 - norm_cdf(-x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    Call,
    Put,
}

/// Result of a single Black-Scholes evaluation: price floored at `MIN_PRICE`,
/// delta clipped to [-1, 1].
#[derive(Debug, Clone, Copy)]
pub struct PricedOption {
    pub price: f64,
    pub delta: f64,
}

/// Black-Scholes price + delta for `right`, with `r = 0`, `q = 0`.
///
/// `t` is floored at `MIN_TIME_TO_EXPIRY`; `sigma` is expected already
/// clamped to `[0.05, 1.0]` by the caller (the quote synthesizer does this).
pub fn price(spot: f64, strike: f64, t: f64, sigma: f64, right: Right) -> PricedOption {
    let t = t.max(MIN_TIME_TO_EXPIRY);
    let sqrt_t = (sigma * t.sqrt()).max(1e-12);

    let d1 = ((spot / strike).ln() + 0.5 * sigma * sigma * t) / sqrt_t;
    let d2 = d1 - sqrt_t;

    let (raw_price, raw_delta) = match right {
        Right::Call => {
            let price = spot * norm_cdf(d1) - strike * norm_cdf(d2);
            (price, norm_cdf(d1))
        }
        Right::Put => {
            let price = strike * norm_cdf(-d2) - spot * norm_cdf(-d1);
            (price, norm_cdf(d1) - 1.0)
        }
    };

    PricedOption {
        price: raw_price.max(MIN_PRICE),
        delta: raw_delta.clamp(-1.0, 1.0),
    }
}
