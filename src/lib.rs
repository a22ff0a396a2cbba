//! Capture Core Engine
//!
//! Decision-and-settlement engine behind a trade-execution value-capture
//! hook sitting in front of an AMM.
//!
//! ## Architecture
//! - Divergence: pool-vs-oracle mispricing analysis
//! - Capture: value-capture sizing off the confidence-band edge
//! - Router: pluggable decision agents with primary/backup fail-over
//! - Backrun: opportunity ledger plus capital/flash-loan executor
//! - Accumulator: per-pool fee balances gated into LP donations

pub mod accumulator;
pub mod backrun;
pub mod capture;
pub mod config;
pub mod divergence;
pub mod error;
pub mod guard;
mod math;
pub mod ports;
pub mod router;
pub mod simulator;
pub mod types;

pub use accumulator::FeeAccumulator;
pub use backrun::{BackrunExecutor, BackrunRoute, ExecutionReceipt, OpportunityLedger};
pub use capture::{CaptureEngine, FeeOverrideCalculator};
pub use config::Config;
pub use divergence::DivergenceAnalyzer;
pub use error::{AgentError, HookError};
pub use router::{AgentRouter, BackrunSignal, DecisionAgent, RegistrationView};
pub use types::{
    AgentCategory, AgentId, CaptureDecision, CurrencyId, FeeDecision, HookOutcome, Opportunity,
    PoolId, PoolSnapshot, PriceSample, RouteId, TradeContext, TradeDirection, TradeKind,
};

use crate::ports::{FlashLender, PriceOracle, ReputationSource, SettlementEngine};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info};

/// The hook engine orchestrates divergence analysis, routing, the backrun
/// subsystem, and fee accumulation around every trade.
pub struct HookEngine {
    engine_id: AgentId,
    config: Arc<Config>,
    router: Arc<AgentRouter>,
    ledger: Arc<OpportunityLedger>,
    executor: Arc<BackrunExecutor>,
    accumulator: Arc<FeeAccumulator>,
    settlement: Arc<dyn SettlementEngine>,
}

impl HookEngine {
    /// Wire the engine against its collaborators. Validates the config
    /// synchronously and nominates this engine as the ledger's recorder
    /// and an allowed accumulator source.
    pub fn new(
        engine_id: AgentId,
        config: Config,
        settlement: Arc<dyn SettlementEngine>,
        lender: Arc<dyn FlashLender>,
        reputation: Arc<dyn ReputationSource>,
    ) -> Result<Self, HookError> {
        if engine_id.is_zero() {
            return Err(HookError::ZeroAddress);
        }
        config.validate()?;
        let config = Arc::new(config);

        let router = Arc::new(AgentRouter::new(reputation));
        let ledger = Arc::new(OpportunityLedger::new());
        ledger.set_recorder(engine_id)?;

        let accumulator = Arc::new(FeeAccumulator::new(
            settlement.clone(),
            config.donation.min_amount,
            config.donation.min_interval_secs,
        ));
        accumulator.allow_source(engine_id)?;

        let executor = Arc::new(BackrunExecutor::new(
            engine_id,
            ledger.clone(),
            accumulator.clone(),
            settlement.clone(),
            lender,
            config.backrun.caller_share_bps,
        )?);

        info!(engine = %engine_id, "hook engine wired");
        Ok(Self {
            engine_id,
            config,
            router,
            ledger,
            executor,
            accumulator,
            settlement,
        })
    }

    /// Build the three built-in agents from the config and register them
    /// as primaries.
    pub async fn register_builtin_agents(
        &self,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<(), HookError> {
        let analyzer = DivergenceAnalyzer::new(self.config.capture.min_divergence_bps);
        let capture_engine = CaptureEngine::new(
            analyzer,
            self.config.capture.hook_share_bps,
            self.config.capture.max_capture_ratio_bps,
        );
        let fee_calculator = FeeOverrideCalculator::new(self.config.fee.max_fee_pips);

        self.router
            .register_agent(
                AgentCategory::Arbitrage,
                Arc::new(router::agents::DivergenceCaptureAgent::new(
                    derived_agent_id(self.engine_id, 1),
                    oracle.clone(),
                    capture_engine,
                )),
            )
            .await?;
        self.router
            .register_agent(
                AgentCategory::DynamicFee,
                Arc::new(router::agents::VolatilityFeeAgent::new(
                    derived_agent_id(self.engine_id, 2),
                    oracle.clone(),
                    fee_calculator,
                )),
            )
            .await?;
        self.router
            .register_agent(
                AgentCategory::Backrun,
                Arc::new(router::agents::DislocationBackrunAgent::new(
                    derived_agent_id(self.engine_id, 3),
                    oracle,
                    self.config.backrun.min_dislocation_bps,
                )),
            )
            .await?;
        Ok(())
    }

    // ---- hooks ----

    /// Pre-trade hook. Decides capture and fee override for the trade and
    /// applies the capture against the in-flight trade. Degrades to a
    /// pass-through outcome on any decision failure; hard-fails only on
    /// an unauthorized caller or a settlement error.
    pub async fn pre_trade_hook(
        &self,
        caller: AgentId,
        ctx: &TradeContext,
    ) -> Result<HookOutcome, HookError> {
        if !self.router.is_authorized(caller) {
            return Err(HookError::Unauthorized(caller));
        }

        // Exact-output trades bypass capture and fee override entirely.
        if ctx.kind == TradeKind::ExactOutput {
            return Ok(HookOutcome::pass_through());
        }

        let now = self.settlement.ledger_time();
        let (capture, fee) = self.router.route_before_trade(ctx, now).await;

        let mut outcome = HookOutcome::pass_through();
        if let Some(decision) = capture {
            if decision.should_capture && decision.capture_amount > 0 {
                let currency = ctx.output_currency();
                self.settlement
                    .capture_from_trade(ctx.pool.pool, currency, decision.capture_amount)
                    .await?;
                self.accumulator
                    .register_pool(ctx.pool.pool, ctx.pool.currency0, ctx.pool.currency1)?;
                if decision.lp_share > 0 {
                    self.accumulator
                        .accumulate(self.engine_id, ctx.pool.pool, currency, decision.lp_share)
                        .await?;
                }
                outcome.capture_amount = decision.capture_amount;
                counter!("captures_total").increment(1);
            }
        }
        if let Some(decision) = fee {
            if decision.use_override {
                outcome.fee_override = Some(decision.fee_pips);
            }
        }

        debug!(pool = %ctx.pool.pool, ?outcome, "pre-trade hook");
        Ok(outcome)
    }

    /// Post-trade hook. Consults the backrun agent against the settled
    /// price and records a positive signal into the opportunity ledger.
    pub async fn post_trade_hook(
        &self,
        caller: AgentId,
        ctx: &TradeContext,
        settled_price: u128,
    ) -> Result<Option<u128>, HookError> {
        if !self.router.is_authorized(caller) {
            return Err(HookError::Unauthorized(caller));
        }

        let now = self.settlement.ledger_time();
        let Some(signal) = self.router.route_after_trade(ctx, settled_price, now).await else {
            return Ok(None);
        };

        self.ledger.record(
            self.engine_id,
            Opportunity {
                pool: ctx.pool.pool,
                target_price: signal.target_price,
                current_price: signal.current_price,
                outstanding_amount: signal.amount,
                direction: signal.direction,
                detection_height: self.settlement.block_height(),
                executed: false,
            },
        )?;
        counter!("backrun_opportunities_total").increment(1);
        Ok(Some(signal.amount))
    }

    // ---- subsystem access ----

    pub fn engine_id(&self) -> AgentId {
        self.engine_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &AgentRouter {
        &self.router
    }

    pub fn executor(&self) -> &BackrunExecutor {
        &self.executor
    }

    pub fn accumulator(&self) -> &FeeAccumulator {
        &self.accumulator
    }

    // ---- read-only queries ----

    pub fn pending_opportunity(&self, pool: PoolId) -> Option<Opportunity> {
        self.ledger.pending(pool)
    }

    pub fn accumulated(&self, pool: PoolId, currency: CurrencyId) -> u128 {
        self.accumulator.balance(pool, currency)
    }

    pub fn registration(&self, category: AgentCategory) -> Option<RegistrationView> {
        self.router.registration(category)
    }
}

/// Deterministic child id for a built-in agent
fn derived_agent_id(engine: AgentId, index: u8) -> AgentId {
    let mut bytes = engine.0;
    bytes[19] = bytes[19].wrapping_add(index);
    AgentId(bytes)
}
