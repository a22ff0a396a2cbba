//! Value-capture accounting
//!
//! Turns a divergence verdict into a concrete capture amount and its
//! hook/LP split. Sizing is conservative: the opportunity is measured from
//! the confidence-band edge nearest the trade's disadvantage, not the
//! oracle midpoint, so noise inside the band is never captured.

pub mod fees;

pub use fees::FeeOverrideCalculator;

use crate::divergence::DivergenceAnalyzer;
use crate::math::mul_div;
use crate::types::{CaptureDecision, PriceSample, TradeContext, TradeDirection, BPS};
use tracing::debug;

/// Capture engine: divergence verdict to capture amount and split
#[derive(Debug, Clone, Copy)]
pub struct CaptureEngine {
    analyzer: DivergenceAnalyzer,
    hook_share_bps: u64,
    max_capture_ratio_bps: u64,
}

impl CaptureEngine {
    pub fn new(analyzer: DivergenceAnalyzer, hook_share_bps: u64, max_capture_ratio_bps: u64) -> Self {
        Self {
            analyzer,
            hook_share_bps,
            max_capture_ratio_bps,
        }
    }

    /// Evaluate one trade against an oracle sample. Degrades to
    /// [`CaptureDecision::none`] whenever the numbers collapse; this path
    /// never hard-fails.
    pub fn evaluate(&self, ctx: &TradeContext, sample: &PriceSample) -> CaptureDecision {
        let pool_price = ctx.pool.spot_price;
        let divergence_bps = DivergenceAnalyzer::divergence_bps(pool_price, sample.price);

        if !self
            .analyzer
            .should_capture(ctx.direction, pool_price, sample)
        {
            return CaptureDecision {
                divergence_bps,
                ..CaptureDecision::none()
            };
        }

        let Some(gap_bps) = Self::edge_gap_bps(ctx.direction, pool_price, sample) else {
            return CaptureDecision {
                divergence_bps,
                ..CaptureDecision::none()
            };
        };

        let opportunity = mul_div(ctx.amount_in, gap_bps as u128, BPS as u128);
        if opportunity == 0 {
            return CaptureDecision {
                divergence_bps,
                ..CaptureDecision::none()
            };
        }

        let cap = mul_div(ctx.amount_in, self.max_capture_ratio_bps as u128, BPS as u128);
        let capture_amount = opportunity.min(cap);
        let hook_share = mul_div(capture_amount, self.hook_share_bps as u128, BPS as u128);
        let lp_share = capture_amount - hook_share;

        debug!(
            pool = %ctx.pool.pool,
            divergence_bps,
            gap_bps,
            capture_amount,
            hook_share,
            lp_share,
            "capture decision"
        );

        CaptureDecision {
            should_capture: true,
            divergence_bps,
            capture_amount,
            hook_share,
            lp_share,
        }
    }

    /// Relative gap between the pool price and the nearest band edge, in
    /// bps of the price used as denominator. `None` when the pool price is
    /// inside the band in the relevant direction.
    fn edge_gap_bps(
        direction: TradeDirection,
        pool_price: u128,
        sample: &PriceSample,
    ) -> Option<u64> {
        let band = DivergenceAnalyzer::band_width(sample);
        match direction {
            TradeDirection::ZeroForOne => {
                // Pool overprices currency0: measure from the upper edge.
                let upper = sample.price.saturating_add(band);
                if pool_price <= upper || pool_price == 0 {
                    return None;
                }
                let gap = pool_price - upper;
                Some(mul_div(gap, BPS as u128, pool_price).min(u64::MAX as u128) as u64)
            }
            TradeDirection::OneForZero => {
                // Pool underprices currency0: measure from the lower edge.
                let lower = sample.price.saturating_sub(band);
                if pool_price >= lower || lower == 0 {
                    return None;
                }
                let gap = lower - pool_price;
                Some(mul_div(gap, BPS as u128, lower).min(u64::MAX as u128) as u64)
            }
        }
    }
}
