//! Price-divergence analysis
//!
//! Compares the AMM spot price against the oracle price and decides whether
//! a trade is mispriced enough, in the right direction, to act on.

use crate::math::mul_div;
use crate::types::{PriceSample, TradeDirection, BPS};

/// Minimum confidence-band half-width, in bps of the oracle price
const MIN_BAND_BPS: u128 = 10; // 0.1%

/// Divergence analyzer for pool-vs-oracle mispricing
#[derive(Debug, Clone, Copy)]
pub struct DivergenceAnalyzer {
    min_divergence_bps: u64,
}

impl DivergenceAnalyzer {
    pub fn new(min_divergence_bps: u64) -> Self {
        Self { min_divergence_bps }
    }

    pub fn min_divergence_bps(&self) -> u64 {
        self.min_divergence_bps
    }

    /// Relative gap between pool and oracle price, in bps of the oracle
    /// price. Returns 0 for a zero oracle price, saturates at `u64::MAX`.
    pub fn divergence_bps(pool_price: u128, oracle_price: u128) -> u64 {
        if oracle_price == 0 {
            return 0;
        }
        let diff = pool_price.abs_diff(oracle_price);
        mul_div(diff, BPS as u128, oracle_price).min(u64::MAX as u128) as u64
    }

    /// Confidence half-width, widened to at least 0.1% of the oracle price
    pub fn band_width(sample: &PriceSample) -> u128 {
        let floor = mul_div(sample.price, MIN_BAND_BPS, BPS as u128);
        sample.confidence.max(floor)
    }

    /// Pool price strictly outside `[oracle - band, oracle + band]`
    pub fn is_outside_band(pool_price: u128, sample: &PriceSample) -> bool {
        let band = Self::band_width(sample);
        pool_price > sample.price.saturating_add(band)
            || pool_price < sample.price.saturating_sub(band)
    }

    /// True when the trade direction is the one a capture can act on
    /// without taking value from an already-fair trade: selling the asset
    /// the pool overprices.
    pub fn is_advantageous(
        direction: TradeDirection,
        pool_price: u128,
        oracle_price: u128,
    ) -> bool {
        match direction {
            TradeDirection::ZeroForOne => pool_price > oracle_price,
            TradeDirection::OneForZero => pool_price < oracle_price,
        }
    }

    /// Combined gate: outside the band, past the configured minimum, and in
    /// the advantageous direction.
    pub fn should_capture(
        &self,
        direction: TradeDirection,
        pool_price: u128,
        sample: &PriceSample,
    ) -> bool {
        Self::is_outside_band(pool_price, sample)
            && Self::divergence_bps(pool_price, sample.price) >= self.min_divergence_bps
            && Self::is_advantageous(direction, pool_price, sample.price)
    }
}
