// Market regime classification. Pure function of a timestamp and the
// bar/calendar provider views — no I/O, no state. Generalized from an
// offline vol/trend-feature classifier into a live additive-score rule.

pub mod scorer;

pub use scorer::{score_at, RegimeScore, RegimeWeights};
