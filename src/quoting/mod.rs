// Synthetic option chain construction. The quote synthesizer is
// the concrete `OptionsProvider`: Black-Scholes pricing (models::option_math)
// driven off a spot series, with a skewed IV surface and tick-aligned
// bid/ask microstructure layered on top, generalized from real-market
// calibration to pure synthesis.

pub mod synthesizer;
pub mod iv_proxy;

pub use synthesizer::{QuoteSynthesizer, QuoteSynthesizerConfig};
pub use iv_proxy::IvProxySeries;
