//! Collaborator interfaces.
//!
//! The settlement engine, price oracle, lending facility, and reputation
//! registry are external systems. The engine talks to them through these
//! traits; `simulator` provides deterministic in-memory implementations.

use crate::error::{AgentError, HookError};
use crate::types::{
    AgentId, CurrencyId, PoolId, PriceSample, ReputationSummary, RouteId, TradeDirection,
};
use async_trait::async_trait;

/// The AMM settlement engine this hook sits in front of.
#[async_trait]
pub trait SettlementEngine: Send + Sync {
    /// Current time on the settlement engine's durable ledger.
    fn ledger_time(&self) -> u64;

    /// Current block height.
    fn block_height(&self) -> u64;

    /// Remove value from the in-flight trade and hold it for the hook.
    async fn capture_from_trade(
        &self,
        pool: PoolId,
        currency: CurrencyId,
        amount: u128,
    ) -> Result<(), HookError>;

    /// Pay out held funds to an external account.
    async fn transfer(
        &self,
        to: AgentId,
        currency: CurrencyId,
        amount: u128,
    ) -> Result<(), HookError>;

    /// Native reward-distribution primitive: forwards both currency
    /// amounts to the pool's liquidity providers in one call.
    async fn distribute_rewards(
        &self,
        pool: PoolId,
        amount0: u128,
        amount1: u128,
    ) -> Result<(), HookError>;

    /// Swap through a non-intercepted route for the pool's pair,
    /// returning the output amount.
    async fn corrective_swap(
        &self,
        route: RouteId,
        direction: TradeDirection,
        amount_in: u128,
    ) -> Result<u128, HookError>;
}

/// External price oracle. Errors here degrade decisions to no-ops.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Latest price of `base` in `quote`, WAD-scaled, with confidence.
    /// Implementations without a separate confidence feed fall back to
    /// [`PriceSample::with_default_confidence`].
    async fn latest_price(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
    ) -> Result<PriceSample, AgentError>;
}

/// Opaque payload threaded through the flash-loan callback.
#[derive(Debug, Clone)]
pub struct FlashLoanData {
    pub pool: PoolId,
    pub route: RouteId,
    pub direction: TradeDirection,
    pub min_profit: u128,
}

/// Receiver side of a flash loan. The lender invokes this synchronously
/// within the same unit of work; the implementation returns the amount it
/// repays, which the lender verifies covers principal plus premium.
#[async_trait]
pub trait FlashBorrower: Send + Sync {
    async fn on_flash_loan(
        &self,
        caller: AgentId,
        initiator: AgentId,
        asset: CurrencyId,
        amount: u128,
        premium: u128,
        data: &FlashLoanData,
    ) -> Result<u128, HookError>;
}

/// Capital-lending facility.
#[async_trait]
pub trait FlashLender: Send + Sync {
    /// Identity the borrower verifies inside the callback.
    fn id(&self) -> AgentId;

    /// Premium owed on top of `amount`.
    fn premium(&self, amount: u128) -> u128;

    /// Lend `amount` of `asset` to `borrower` for the duration of the
    /// callback. Fails the whole unit of work if the callback fails or
    /// repays less than principal plus premium.
    async fn flash_loan(
        &self,
        borrower: &dyn FlashBorrower,
        initiator: AgentId,
        asset: CurrencyId,
        amount: u128,
        data: &FlashLoanData,
    ) -> Result<(), HookError>;
}

/// Reputation/identity registry, consumed only by the off-path auto-switch.
#[async_trait]
pub trait ReputationSource: Send + Sync {
    async fn summary(
        &self,
        subject: AgentId,
        reporters: &[AgentId],
        tag1: &str,
        tag2: &str,
    ) -> Result<ReputationSummary, AgentError>;
}
