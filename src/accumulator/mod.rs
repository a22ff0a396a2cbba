//! Fee accumulator
//!
//! Accumulates captured and backrun value per (pool, currency) and gates
//! its donation to liquidity providers on a balance threshold and a
//! minimum interval. Donation is permissionless so no single party is a
//! required intermediary.

use crate::error::HookError;
use crate::guard::ReentrancyGuard;
use crate::ports::SettlementEngine;
use crate::types::{AgentId, CurrencyId, PoolId};
use dashmap::DashMap;
use metrics::counter;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct FeeAccumulator {
    settlement: Arc<dyn SettlementEngine>,
    balances: DashMap<(PoolId, CurrencyId), u128>,
    pairs: DashMap<PoolId, (CurrencyId, CurrencyId)>,
    last_donation: DashMap<PoolId, u64>,
    sources: RwLock<HashSet<AgentId>>,
    min_amount: u128,
    min_interval_secs: u64,
    accumulate_guard: ReentrancyGuard,
    donate_guard: ReentrancyGuard,
}

impl FeeAccumulator {
    pub fn new(
        settlement: Arc<dyn SettlementEngine>,
        min_amount: u128,
        min_interval_secs: u64,
    ) -> Self {
        Self {
            settlement,
            balances: DashMap::new(),
            pairs: DashMap::new(),
            last_donation: DashMap::new(),
            sources: RwLock::new(HashSet::new()),
            min_amount,
            min_interval_secs,
            accumulate_guard: ReentrancyGuard::new("accumulate"),
            donate_guard: ReentrancyGuard::new("donate"),
        }
    }

    // ---- administrative operations ----

    /// Allow a source (the hook engine, the backrun executor) to accumulate
    pub fn allow_source(&self, source: AgentId) -> Result<(), HookError> {
        if source.is_zero() {
            return Err(HookError::ZeroAddress);
        }
        self.sources.write().insert(source);
        Ok(())
    }

    pub fn revoke_source(&self, source: AgentId) {
        self.sources.write().remove(&source);
    }

    /// Register a pool's currency pair so donation knows both legs
    pub fn register_pool(
        &self,
        pool: PoolId,
        currency0: CurrencyId,
        currency1: CurrencyId,
    ) -> Result<(), HookError> {
        if currency0.is_zero() || currency1.is_zero() {
            return Err(HookError::ZeroAddress);
        }
        self.pairs.insert(pool, (currency0, currency1));
        Ok(())
    }

    // ---- accumulation and donation ----

    /// Add to the running balance for (pool, currency)
    pub async fn accumulate(
        &self,
        source: AgentId,
        pool: PoolId,
        currency: CurrencyId,
        amount: u128,
    ) -> Result<u128, HookError> {
        let _token = self.accumulate_guard.enter()?;
        if !self.sources.read().contains(&source) {
            return Err(HookError::Unauthorized(source));
        }

        let mut balance = self.balances.entry((pool, currency)).or_insert(0);
        *balance = balance.saturating_add(amount);
        let new_balance = *balance;
        drop(balance);

        debug!(pool = %pool, currency = %currency, amount, new_balance, "accumulated");
        Ok(new_balance)
    }

    /// Donate both accumulated balances to the pool's liquidity providers.
    /// Permissionless; gated on both balances reaching the threshold and
    /// the minimum interval since the last donation having elapsed. Zeroes
    /// both balances atomically with the forwarding call.
    pub async fn donate(&self, caller: AgentId, pool: PoolId) -> Result<(u128, u128), HookError> {
        let _token = self.donate_guard.enter()?;

        let (currency0, currency1) = self
            .pairs
            .get(&pool)
            .map(|p| *p)
            .ok_or(HookError::UnknownPool(pool))?;

        let balance0 = self.balances.get(&(pool, currency0)).map(|b| *b).unwrap_or(0);
        let balance1 = self.balances.get(&(pool, currency1)).map(|b| *b).unwrap_or(0);
        if balance0 < self.min_amount || balance1 < self.min_amount {
            return Err(HookError::DonationBelowThreshold {
                balance0,
                balance1,
                min: self.min_amount,
            });
        }

        let now = self.settlement.ledger_time();
        let last = self.last_donation.get(&pool).map(|t| *t).unwrap_or(0);
        let elapsed = now.saturating_sub(last);
        if elapsed < self.min_interval_secs {
            return Err(HookError::DonationTooSoon {
                elapsed,
                min_interval: self.min_interval_secs,
            });
        }

        // Zero first so a nested query inside the distribution call can
        // never observe the spent balances; restore on failure since the
        // settlement engine discards our in-memory effects on abort.
        self.balances.insert((pool, currency0), 0);
        self.balances.insert((pool, currency1), 0);

        if let Err(err) = self
            .settlement
            .distribute_rewards(pool, balance0, balance1)
            .await
        {
            self.balances.insert((pool, currency0), balance0);
            self.balances.insert((pool, currency1), balance1);
            return Err(err);
        }

        self.last_donation.insert(pool, now);
        counter!("donations_total").increment(1);
        info!(pool = %pool, caller = %caller, balance0, balance1, "donated to LPs");
        Ok((balance0, balance1))
    }

    // ---- read-only queries ----

    pub fn balance(&self, pool: PoolId, currency: CurrencyId) -> u128 {
        self.balances.get(&(pool, currency)).map(|b| *b).unwrap_or(0)
    }

    pub fn last_donation_time(&self, pool: PoolId) -> Option<u64> {
        self.last_donation.get(&pool).map(|t| *t)
    }
}
