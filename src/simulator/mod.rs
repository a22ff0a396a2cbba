//! Deterministic in-memory collaborators
//!
//! Constant-product settlement engine, settable oracle, flash lender, and
//! reputation feed implementing the `ports` traits. Used by the demo
//! binary and the heavier tests; no networking, no randomness.

use crate::error::{AgentError, HookError};
use crate::math::mul_div;
use crate::ports::{
    FlashBorrower, FlashLender, FlashLoanData, PriceOracle, ReputationSource, SettlementEngine,
};
use crate::types::{
    AgentId, CurrencyId, PoolId, PriceSample, ReputationSummary, RouteId, TradeDirection, BPS, WAD,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Constant-product pool state
#[derive(Debug, Clone, Copy)]
struct SimPool {
    currency0: CurrencyId,
    currency1: CurrencyId,
    reserve0: u128,
    reserve1: u128,
    fee_pips: u32,
}

impl SimPool {
    /// Price of currency0 in currency1, WAD-scaled
    fn spot_price(&self) -> u128 {
        if self.reserve0 == 0 {
            return 0;
        }
        mul_div(self.reserve1, WAD, self.reserve0)
    }

    /// Constant-product output: dy = y * dx' / (x + dx'), dx' net of fee
    fn swap_out(&mut self, direction: TradeDirection, amount_in: u128) -> u128 {
        let fee_denominator = 1_000_000u128;
        let amount_net = mul_div(
            amount_in,
            fee_denominator - self.fee_pips as u128,
            fee_denominator,
        );
        let (reserve_in, reserve_out) = match direction {
            TradeDirection::ZeroForOne => (&mut self.reserve0, &mut self.reserve1),
            TradeDirection::OneForZero => (&mut self.reserve1, &mut self.reserve0),
        };
        if *reserve_in == 0 || *reserve_out == 0 {
            return 0;
        }
        let amount_out = mul_div(*reserve_out, amount_net, *reserve_in + amount_net);
        *reserve_in += amount_in;
        *reserve_out -= amount_out;
        amount_out
    }
}

/// In-memory settlement engine with an internal balance sheet
pub struct SimSettlement {
    pools: DashMap<PoolId, SimPool>,
    routes: DashMap<RouteId, PoolId>,
    captured: DashMap<(PoolId, CurrencyId), u128>,
    payouts: DashMap<(AgentId, CurrencyId), u128>,
    rewards: DashMap<PoolId, (u128, u128)>,
    time: AtomicU64,
    height: AtomicU64,
    fail_next_distribution: AtomicBool,
}

impl SimSettlement {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            routes: DashMap::new(),
            captured: DashMap::new(),
            payouts: DashMap::new(),
            rewards: DashMap::new(),
            time: AtomicU64::new(0),
            height: AtomicU64::new(1),
            fail_next_distribution: AtomicBool::new(false),
        }
    }

    pub fn add_pool(
        &self,
        pool: PoolId,
        currency0: CurrencyId,
        currency1: CurrencyId,
        reserve0: u128,
        reserve1: u128,
        fee_pips: u32,
    ) {
        self.pools.insert(
            pool,
            SimPool {
                currency0,
                currency1,
                reserve0,
                reserve1,
                fee_pips,
            },
        );
    }

    /// Point a route at an alternate pool for the same pair
    pub fn add_route(&self, route: RouteId, pool: PoolId) {
        self.routes.insert(route, pool);
    }

    pub fn spot_price(&self, pool: PoolId) -> Option<u128> {
        self.pools.get(&pool).map(|p| p.spot_price())
    }

    pub fn pool_currencies(&self, pool: PoolId) -> Option<(CurrencyId, CurrencyId)> {
        self.pools.get(&pool).map(|p| (p.currency0, p.currency1))
    }

    /// Trade against a pool directly (the "victim" trades in tests)
    pub fn swap(&self, pool: PoolId, direction: TradeDirection, amount_in: u128) -> Option<u128> {
        let mut state = self.pools.get_mut(&pool)?;
        Some(state.swap_out(direction, amount_in))
    }

    pub fn advance_time(&self, secs: u64) {
        self.time.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn advance_height(&self, blocks: u64) {
        self.height.fetch_add(blocks, Ordering::SeqCst);
    }

    /// Make the next reward distribution fail, for abort-path tests
    pub fn fail_next_distribution(&self) {
        self.fail_next_distribution.store(true, Ordering::SeqCst);
    }

    pub fn captured(&self, pool: PoolId, currency: CurrencyId) -> u128 {
        self.captured.get(&(pool, currency)).map(|v| *v).unwrap_or(0)
    }

    pub fn payout(&self, to: AgentId, currency: CurrencyId) -> u128 {
        self.payouts.get(&(to, currency)).map(|v| *v).unwrap_or(0)
    }

    pub fn rewards(&self, pool: PoolId) -> (u128, u128) {
        self.rewards.get(&pool).map(|v| *v).unwrap_or((0, 0))
    }
}

impl Default for SimSettlement {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementEngine for SimSettlement {
    fn ledger_time(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    fn block_height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    async fn capture_from_trade(
        &self,
        pool: PoolId,
        currency: CurrencyId,
        amount: u128,
    ) -> Result<(), HookError> {
        let mut held = self.captured.entry((pool, currency)).or_insert(0);
        *held += amount;
        debug!(pool = %pool, currency = %currency, amount, "captured from trade");
        Ok(())
    }

    async fn transfer(
        &self,
        to: AgentId,
        currency: CurrencyId,
        amount: u128,
    ) -> Result<(), HookError> {
        let mut balance = self.payouts.entry((to, currency)).or_insert(0);
        *balance += amount;
        Ok(())
    }

    async fn distribute_rewards(
        &self,
        pool: PoolId,
        amount0: u128,
        amount1: u128,
    ) -> Result<(), HookError> {
        if self.fail_next_distribution.swap(false, Ordering::SeqCst) {
            return Err(HookError::Settlement("reward distribution refused".into()));
        }
        let mut totals = self.rewards.entry(pool).or_insert((0, 0));
        totals.0 += amount0;
        totals.1 += amount1;
        Ok(())
    }

    async fn corrective_swap(
        &self,
        route: RouteId,
        direction: TradeDirection,
        amount_in: u128,
    ) -> Result<u128, HookError> {
        let pool = self
            .routes
            .get(&route)
            .map(|p| *p)
            .ok_or_else(|| HookError::Settlement(format!("unknown route {route}")))?;
        let mut state = self
            .pools
            .get_mut(&pool)
            .ok_or_else(|| HookError::Settlement(format!("route {route} targets missing pool")))?;
        Ok(state.swap_out(direction, amount_in))
    }
}

/// Settable price oracle
pub struct SimOracle {
    prices: DashMap<(CurrencyId, CurrencyId), PriceSample>,
    fail_next: AtomicBool,
}

impl SimOracle {
    pub fn new() -> Self {
        Self {
            prices: DashMap::new(),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Set the pair price; `confidence: None` takes the 0.5% default
    pub fn set_price(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
        price: u128,
        confidence: Option<u128>,
    ) {
        let sample = match confidence {
            Some(confidence) => PriceSample {
                price,
                confidence,
                updated_at: 0,
            },
            None => PriceSample::with_default_confidence(price, 0),
        };
        self.prices.insert((base, quote), sample);
    }

    /// Make the next lookup fail, for degradation tests
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Default for SimOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for SimOracle {
    async fn latest_price(
        &self,
        base: CurrencyId,
        quote: CurrencyId,
    ) -> Result<PriceSample, AgentError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AgentError::Oracle("feed offline".into()));
        }
        self.prices
            .get(&(base, quote))
            .map(|s| *s)
            .ok_or_else(|| AgentError::Oracle(format!("no feed for {base}/{quote}")))
    }
}

/// Flash lender charging a flat premium in bps
pub struct SimLender {
    id: AgentId,
    premium_bps: u64,
    loans_served: AtomicU64,
}

impl SimLender {
    pub fn new(id: AgentId, premium_bps: u64) -> Self {
        Self {
            id,
            premium_bps,
            loans_served: AtomicU64::new(0),
        }
    }

    pub fn loans_served(&self) -> u64 {
        self.loans_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlashLender for SimLender {
    fn id(&self) -> AgentId {
        self.id
    }

    fn premium(&self, amount: u128) -> u128 {
        mul_div(amount, self.premium_bps as u128, BPS as u128)
    }

    async fn flash_loan(
        &self,
        borrower: &dyn FlashBorrower,
        initiator: AgentId,
        asset: CurrencyId,
        amount: u128,
        data: &FlashLoanData,
    ) -> Result<(), HookError> {
        let premium = self.premium(amount);
        let repaid = borrower
            .on_flash_loan(self.id, initiator, asset, amount, premium, data)
            .await?;
        let owed = amount + premium;
        if repaid < owed {
            return Err(HookError::RepaymentShortfall {
                available: repaid,
                owed,
            });
        }
        self.loans_served.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Settable reputation feed
pub struct SimReputation {
    feeds: DashMap<AgentId, ReputationSummary>,
}

impl SimReputation {
    pub fn new() -> Self {
        Self {
            feeds: DashMap::new(),
        }
    }

    pub fn set_summary(&self, subject: AgentId, summary: ReputationSummary) {
        self.feeds.insert(subject, summary);
    }
}

impl Default for SimReputation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReputationSource for SimReputation {
    async fn summary(
        &self,
        subject: AgentId,
        _reporters: &[AgentId],
        _tag1: &str,
        _tag2: &str,
    ) -> Result<ReputationSummary, AgentError> {
        Ok(self.feeds.get(&subject).map(|s| *s).unwrap_or(ReputationSummary {
            sample_count: 0,
            average_value: 0,
            decimals: 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_price_tracks_reserves() {
        let settlement = SimSettlement::new();
        let pool = PoolId::repeat(1);
        settlement.add_pool(
            pool,
            CurrencyId::repeat(2),
            CurrencyId::repeat(3),
            1_000 * WAD,
            2_000_000 * WAD,
            3000,
        );
        assert_eq!(settlement.spot_price(pool), Some(2_000 * WAD));
    }

    #[test]
    fn swap_moves_the_price_against_the_input() {
        let settlement = SimSettlement::new();
        let pool = PoolId::repeat(1);
        settlement.add_pool(
            pool,
            CurrencyId::repeat(2),
            CurrencyId::repeat(3),
            1_000 * WAD,
            2_000_000 * WAD,
            3000,
        );

        let before = settlement.spot_price(pool).unwrap();
        let out = settlement
            .swap(pool, TradeDirection::ZeroForOne, 100 * WAD)
            .unwrap();
        assert!(out > 0);
        assert!(settlement.spot_price(pool).unwrap() < before);
    }

    #[tokio::test]
    async fn corrective_swap_requires_a_known_route() {
        let settlement = SimSettlement::new();
        let err = settlement
            .corrective_swap(RouteId::repeat(9), TradeDirection::ZeroForOne, WAD)
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Settlement(_)));
    }
}
