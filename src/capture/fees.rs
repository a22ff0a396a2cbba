//! Divergence-driven fee override
//!
//! Maps divergence to a recommended trading fee in pips (hundredths of a
//! bip): one bps of divergence recommends ten pips of fee, so a 0.5%
//! divergence recommends a 0.05% fee. Applies to exact-input trades only;
//! the exact-output gate lives with the caller.

use crate::types::FeeDecision;

/// Pips of fee recommended per bps of divergence
const FEE_PIPS_PER_DIVERGENCE_BPS: u64 = 10;

#[derive(Debug, Clone, Copy)]
pub struct FeeOverrideCalculator {
    max_fee_pips: u32,
}

impl FeeOverrideCalculator {
    pub fn new(max_fee_pips: u32) -> Self {
        Self { max_fee_pips }
    }

    /// Recommend a fee for the observed divergence. Zero divergence means
    /// no override; the pool keeps its existing fee.
    pub fn evaluate(&self, divergence_bps: u64) -> FeeDecision {
        if divergence_bps == 0 {
            return FeeDecision::none();
        }

        let raw = divergence_bps.saturating_mul(FEE_PIPS_PER_DIVERGENCE_BPS);
        let fee_pips = raw.min(self.max_fee_pips as u64) as u32;

        FeeDecision {
            fee_pips,
            use_override: true,
        }
    }
}
