//! Core types for the value-capture engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point price scale (18 decimals)
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator
pub const BPS: u64 = 10_000;

macro_rules! address_newtype {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 20]);

        impl $name {
            pub const ZERO: $name = $name([0u8; 20]);

            pub fn repeat(byte: u8) -> Self {
                Self([byte; 20])
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 20]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(self, f)
            }
        }
    };
}

address_newtype!(PoolId);
address_newtype!(CurrencyId);
address_newtype!(AgentId);
address_newtype!(RouteId);

/// Swap direction relative to the pool's currency ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    /// Selling currency0 for currency1
    ZeroForOne,
    /// Selling currency1 for currency0
    OneForZero,
}

impl TradeDirection {
    pub fn opposite(self) -> Self {
        match self {
            TradeDirection::ZeroForOne => TradeDirection::OneForZero,
            TradeDirection::OneForZero => TradeDirection::ZeroForOne,
        }
    }
}

/// Trade accounting mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    ExactInput,
    ExactOutput,
}

/// Decision categories the router dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentCategory {
    Arbitrage,
    DynamicFee,
    Backrun,
}

/// Read-only pool snapshot supplied by the settlement engine per invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool: PoolId,
    pub currency0: CurrencyId,
    pub currency1: CurrencyId,
    /// Spot price of currency0 in currency1, WAD-scaled
    pub spot_price: u128,
    pub liquidity: u128,
    /// Pool fee in pips (3000 = 0.3%)
    pub fee_pips: u32,
}

/// Per-trade context handed to the hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeContext {
    pub pool: PoolSnapshot,
    pub direction: TradeDirection,
    pub kind: TradeKind,
    pub amount_in: u128,
    pub trader: AgentId,
}

impl TradeContext {
    /// Currency the trader receives
    pub fn output_currency(&self) -> CurrencyId {
        match self.direction {
            TradeDirection::ZeroForOne => self.pool.currency1,
            TradeDirection::OneForZero => self.pool.currency0,
        }
    }

    /// Currency the trader pays
    pub fn input_currency(&self) -> CurrencyId {
        match self.direction {
            TradeDirection::ZeroForOne => self.pool.currency0,
            TradeDirection::OneForZero => self.pool.currency1,
        }
    }
}

/// Oracle price observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceSample {
    /// WAD-scaled price
    pub price: u128,
    /// Absolute confidence interval, WAD-scaled
    pub confidence: u128,
    pub updated_at: u64,
}

impl PriceSample {
    /// Sample with the default confidence of 0.5% of price
    pub fn with_default_confidence(price: u128, updated_at: u64) -> Self {
        Self {
            price,
            confidence: price / 200,
            updated_at,
        }
    }
}

/// Outcome of the divergence/capture analysis for one trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDecision {
    pub should_capture: bool,
    pub divergence_bps: u64,
    pub capture_amount: u128,
    pub hook_share: u128,
    pub lp_share: u128,
}

impl CaptureDecision {
    pub fn none() -> Self {
        Self {
            should_capture: false,
            divergence_bps: 0,
            capture_amount: 0,
            hook_share: 0,
            lp_share: 0,
        }
    }
}

/// Fee override recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDecision {
    /// Recommended fee in pips
    pub fee_pips: u32,
    pub use_override: bool,
}

impl FeeDecision {
    pub fn none() -> Self {
        Self {
            fee_pips: 0,
            use_override: false,
        }
    }
}

/// Recorded backrun opportunity, at most one live per pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub pool: PoolId,
    /// Price the corrective trade should move the pool toward, WAD-scaled
    pub target_price: u128,
    /// Pool price at detection, WAD-scaled
    pub current_price: u128,
    pub outstanding_amount: u128,
    pub direction: TradeDirection,
    pub detection_height: u64,
    pub executed: bool,
}

/// Result handed back to the settlement engine from the pre-trade hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookOutcome {
    pub capture_amount: u128,
    pub fee_override: Option<u32>,
}

impl HookOutcome {
    pub fn pass_through() -> Self {
        Self {
            capture_amount: 0,
            fee_override: None,
        }
    }
}

/// Aggregate reputation observation for one subject
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReputationSummary {
    pub sample_count: u64,
    pub average_value: u64,
    pub decimals: u8,
}

impl ReputationSummary {
    /// Average normalized to basis points of the full scale
    pub fn score_bps(&self) -> u64 {
        let scale = 10u128.pow(self.decimals as u32);
        if scale == 0 {
            return 0;
        }
        ((self.average_value as u128 * BPS as u128) / scale).min(u64::MAX as u128) as u64
    }
}
