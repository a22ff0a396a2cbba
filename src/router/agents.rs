//! Decision agents
//!
//! One polymorphic interface per routing slot. Agents return an explicit
//! `Result` so the router's fail-over is a branch, never exception-driven
//! control flow. The three built-in agents wrap the divergence/capture
//! pipeline; external agents implement the same trait.

use crate::capture::{CaptureEngine, FeeOverrideCalculator};
use crate::divergence::DivergenceAnalyzer;
use crate::error::AgentError;
use crate::ports::PriceOracle;
use crate::types::{
    AgentCategory, AgentId, CaptureDecision, FeeDecision, TradeContext, TradeDirection, BPS,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Backrun recommendation emitted after a trade settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackrunSignal {
    pub amount: u128,
    pub target_price: u128,
    pub current_price: u128,
    pub direction: TradeDirection,
}

/// What a consulted agent recommends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentDecision {
    NoAction,
    Capture(CaptureDecision),
    Fee(FeeDecision),
    Backrun(BackrunSignal),
}

impl AgentDecision {
    /// Value the router accumulates into the slot's stats
    pub fn value(&self) -> u128 {
        match self {
            AgentDecision::NoAction => 0,
            AgentDecision::Capture(d) => d.capture_amount,
            AgentDecision::Fee(d) => d.fee_pips as u128,
            AgentDecision::Backrun(s) => s.amount,
        }
    }
}

/// Pluggable decision provider for one category
#[async_trait]
pub trait DecisionAgent: Send + Sync {
    fn id(&self) -> AgentId;

    fn category(&self) -> AgentCategory;

    /// Liveness self-report, checked at registration and before a
    /// reputation-gated promotion.
    async fn is_active(&self) -> bool;

    /// Evaluate one trade. `settled_price` is present only on the
    /// post-trade path.
    async fn decide(
        &self,
        ctx: &TradeContext,
        settled_price: Option<u128>,
    ) -> Result<AgentDecision, AgentError>;
}

/// Built-in arbitrage agent: oracle lookup plus the capture engine
pub struct DivergenceCaptureAgent {
    id: AgentId,
    oracle: Arc<dyn PriceOracle>,
    engine: CaptureEngine,
}

impl DivergenceCaptureAgent {
    pub fn new(id: AgentId, oracle: Arc<dyn PriceOracle>, engine: CaptureEngine) -> Self {
        Self { id, oracle, engine }
    }
}

#[async_trait]
impl DecisionAgent for DivergenceCaptureAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn category(&self) -> AgentCategory {
        AgentCategory::Arbitrage
    }

    async fn is_active(&self) -> bool {
        true
    }

    async fn decide(
        &self,
        ctx: &TradeContext,
        _settled_price: Option<u128>,
    ) -> Result<AgentDecision, AgentError> {
        let sample = self
            .oracle
            .latest_price(ctx.pool.currency0, ctx.pool.currency1)
            .await?;
        let decision = self.engine.evaluate(ctx, &sample);
        if decision.should_capture {
            Ok(AgentDecision::Capture(decision))
        } else {
            Ok(AgentDecision::NoAction)
        }
    }
}

/// Built-in dynamic-fee agent: divergence mapped to a fee recommendation
pub struct VolatilityFeeAgent {
    id: AgentId,
    oracle: Arc<dyn PriceOracle>,
    calculator: FeeOverrideCalculator,
}

impl VolatilityFeeAgent {
    pub fn new(
        id: AgentId,
        oracle: Arc<dyn PriceOracle>,
        calculator: FeeOverrideCalculator,
    ) -> Self {
        Self {
            id,
            oracle,
            calculator,
        }
    }
}

#[async_trait]
impl DecisionAgent for VolatilityFeeAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn category(&self) -> AgentCategory {
        AgentCategory::DynamicFee
    }

    async fn is_active(&self) -> bool {
        true
    }

    async fn decide(
        &self,
        ctx: &TradeContext,
        _settled_price: Option<u128>,
    ) -> Result<AgentDecision, AgentError> {
        let sample = self
            .oracle
            .latest_price(ctx.pool.currency0, ctx.pool.currency1)
            .await?;
        let divergence = DivergenceAnalyzer::divergence_bps(ctx.pool.spot_price, sample.price);
        let decision = self.calculator.evaluate(divergence);
        if decision.use_override {
            Ok(AgentDecision::Fee(decision))
        } else {
            Ok(AgentDecision::NoAction)
        }
    }
}

/// Built-in backrun agent: sizes a corrective trade off the residual
/// dislocation between the settled price and the oracle
pub struct DislocationBackrunAgent {
    id: AgentId,
    oracle: Arc<dyn PriceOracle>,
    min_dislocation_bps: u64,
}

impl DislocationBackrunAgent {
    pub fn new(id: AgentId, oracle: Arc<dyn PriceOracle>, min_dislocation_bps: u64) -> Self {
        Self {
            id,
            oracle,
            min_dislocation_bps,
        }
    }
}

#[async_trait]
impl DecisionAgent for DislocationBackrunAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn category(&self) -> AgentCategory {
        AgentCategory::Backrun
    }

    async fn is_active(&self) -> bool {
        true
    }

    async fn decide(
        &self,
        ctx: &TradeContext,
        settled_price: Option<u128>,
    ) -> Result<AgentDecision, AgentError> {
        let Some(settled) = settled_price else {
            return Ok(AgentDecision::NoAction);
        };
        let sample = self
            .oracle
            .latest_price(ctx.pool.currency0, ctx.pool.currency1)
            .await?;
        if sample.price == 0 {
            return Ok(AgentDecision::NoAction);
        }

        let dislocation_bps = DivergenceAnalyzer::divergence_bps(settled, sample.price);
        if dislocation_bps < self.min_dislocation_bps {
            return Ok(AgentDecision::NoAction);
        }

        // Corrective trade sells whichever side the pool now overprices.
        let direction = if settled > sample.price {
            TradeDirection::ZeroForOne
        } else {
            TradeDirection::OneForZero
        };

        // Size proportional to the residual gap; the executor supports
        // partial fills so keepers can trim this down.
        let amount = ctx.amount_in * dislocation_bps as u128 / BPS as u128;
        if amount == 0 {
            return Ok(AgentDecision::NoAction);
        }

        Ok(AgentDecision::Backrun(BackrunSignal {
            amount,
            target_price: sample.price,
            current_price: settled,
            direction,
        }))
    }
}
