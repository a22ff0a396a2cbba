//! Backrun executor
//!
//! Consumes recorded opportunities with keeper-supplied or borrowed
//! capital. The corrective trade always goes through a separately
//! registered, non-intercepted route for the pair so the engine never
//! captures against its own trade. Profit splits 80/20 between the fee
//! accumulator and the calling keeper.

use crate::accumulator::FeeAccumulator;
use crate::error::HookError;
use crate::guard::ReentrancyGuard;
use crate::ports::{FlashBorrower, FlashLender, FlashLoanData, SettlementEngine};
use crate::types::{AgentId, CurrencyId, PoolId, RouteId, TradeDirection, BPS};
use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::OpportunityLedger;

/// Non-intercepted corrective route for one pool's pair
#[derive(Debug, Clone, Copy)]
pub struct BackrunRoute {
    pub route: RouteId,
    pub currency0: CurrencyId,
    pub currency1: CurrencyId,
}

impl BackrunRoute {
    fn input_currency(&self, direction: TradeDirection) -> CurrencyId {
        match direction {
            TradeDirection::ZeroForOne => self.currency0,
            TradeDirection::OneForZero => self.currency1,
        }
    }

    fn output_currency(&self, direction: TradeDirection) -> CurrencyId {
        match direction {
            TradeDirection::ZeroForOne => self.currency1,
            TradeDirection::OneForZero => self.currency0,
        }
    }
}

/// Settled outcome of one execution call
#[derive(Debug, Clone, Copy)]
pub struct ExecutionReceipt {
    pub amount_in: u128,
    pub amount_out: u128,
    pub profit: u128,
    pub caller_share: u128,
    pub hook_share: u128,
    pub fully_executed: bool,
}

struct LoanOutcome {
    amount_out: u128,
    profit: u128,
}

pub struct BackrunExecutor {
    engine_id: AgentId,
    ledger: Arc<OpportunityLedger>,
    accumulator: Arc<FeeAccumulator>,
    settlement: Arc<dyn SettlementEngine>,
    lender: Arc<dyn FlashLender>,
    routes: DashMap<PoolId, BackrunRoute>,
    keepers: RwLock<HashSet<AgentId>>,
    forwarders: RwLock<HashSet<AgentId>>,
    caller_share_bps: u64,
    capital_guard: ReentrancyGuard,
    loan_guard: ReentrancyGuard,
    pending_loan: Mutex<Option<LoanOutcome>>,
}

impl BackrunExecutor {
    pub fn new(
        engine_id: AgentId,
        ledger: Arc<OpportunityLedger>,
        accumulator: Arc<FeeAccumulator>,
        settlement: Arc<dyn SettlementEngine>,
        lender: Arc<dyn FlashLender>,
        caller_share_bps: u64,
    ) -> Result<Self, HookError> {
        if caller_share_bps > BPS {
            return Err(HookError::BpsOutOfRange {
                name: "caller_share_bps",
                value: caller_share_bps,
                max: BPS,
            });
        }
        Ok(Self {
            engine_id,
            ledger,
            accumulator,
            settlement,
            lender,
            routes: DashMap::new(),
            keepers: RwLock::new(HashSet::new()),
            forwarders: RwLock::new(HashSet::new()),
            caller_share_bps,
            capital_guard: ReentrancyGuard::new("execute_with_capital"),
            loan_guard: ReentrancyGuard::new("execute_with_flash_loan"),
            pending_loan: Mutex::new(None),
        })
    }

    // ---- administrative operations ----

    pub fn add_keeper(&self, keeper: AgentId) -> Result<(), HookError> {
        if keeper.is_zero() {
            return Err(HookError::ZeroAddress);
        }
        self.keepers.write().insert(keeper);
        Ok(())
    }

    pub fn remove_keeper(&self, keeper: AgentId) {
        self.keepers.write().remove(&keeper);
    }

    /// Allow an account to request execution on a decision-agent's behalf
    pub fn add_forwarder(&self, forwarder: AgentId) -> Result<(), HookError> {
        if forwarder.is_zero() {
            return Err(HookError::ZeroAddress);
        }
        self.forwarders.write().insert(forwarder);
        Ok(())
    }

    pub fn remove_forwarder(&self, forwarder: AgentId) {
        self.forwarders.write().remove(&forwarder);
    }

    /// Register the non-intercepted route the corrective trade uses
    pub fn set_route(&self, pool: PoolId, route: BackrunRoute) -> Result<(), HookError> {
        if route.route.is_zero() || route.currency0.is_zero() || route.currency1.is_zero() {
            return Err(HookError::ZeroAddress);
        }
        self.routes.insert(pool, route);
        Ok(())
    }

    fn authorize(&self, caller: AgentId) -> Result<(), HookError> {
        if self.keepers.read().contains(&caller) || self.forwarders.read().contains(&caller) {
            Ok(())
        } else {
            Err(HookError::Unauthorized(caller))
        }
    }

    fn route_for(&self, pool: PoolId) -> Result<BackrunRoute, HookError> {
        self.routes
            .get(&pool)
            .map(|r| *r)
            .ok_or(HookError::NoRoute(pool))
    }

    fn split_profit(&self, profit: u128) -> (u128, u128) {
        let caller_share = profit * self.caller_share_bps as u128 / BPS as u128;
        (caller_share, profit - caller_share)
    }

    // ---- keeper-facing execution ----

    /// Execute with capital the caller supplies directly
    pub async fn execute_with_capital(
        &self,
        caller: AgentId,
        pool: PoolId,
        amount_in: u128,
        min_profit: u128,
    ) -> Result<ExecutionReceipt, HookError> {
        let _token = self.capital_guard.enter()?;
        self.authorize(caller)?;

        let opportunity = self.ledger.begin_fill(pool, amount_in)?;
        let route = self.route_for(pool)?;

        let amount_out = self
            .settlement
            .corrective_swap(route.route, opportunity.direction, amount_in)
            .await?;

        // A corrective swap that comes back short of the input is a loss,
        // not zero profit; it must not consume the opportunity.
        let Some(profit) = amount_out.checked_sub(amount_in) else {
            return Err(HookError::ProfitBelowMinimum {
                profit: 0,
                min_profit,
            });
        };
        if profit < min_profit {
            return Err(HookError::ProfitBelowMinimum { profit, min_profit });
        }

        self.settle(
            caller,
            pool,
            &route,
            opportunity.direction,
            amount_in,
            amount_out,
            profit,
        )
        .await
    }

    /// Execute with borrowed capital. The lender calls back into
    /// [`FlashBorrower::on_flash_loan`]; ledger and balance mutations are
    /// deferred until the loan call returns, so a failed loan leaves zero
    /// state change.
    pub async fn execute_with_flash_loan(
        &self,
        caller: AgentId,
        pool: PoolId,
        amount_in: u128,
        min_profit: u128,
    ) -> Result<ExecutionReceipt, HookError> {
        let _token = self.loan_guard.enter()?;
        self.authorize(caller)?;

        let opportunity = self.ledger.begin_fill(pool, amount_in)?;
        let route = self.route_for(pool)?;
        let asset = route.input_currency(opportunity.direction);

        let data = FlashLoanData {
            pool,
            route: route.route,
            direction: opportunity.direction,
            min_profit,
        };

        *self.pending_loan.lock() = None;
        self.lender
            .flash_loan(self, self.engine_id, asset, amount_in, &data)
            .await?;

        let outcome = self.pending_loan.lock().take().ok_or_else(|| {
            HookError::Settlement("flash loan returned without invoking the callback".into())
        })?;

        self.settle(
            caller,
            pool,
            &route,
            opportunity.direction,
            amount_in,
            outcome.amount_out,
            outcome.profit,
        )
        .await
    }

    /// Common tail: ledger decrement, 80/20 split, keeper payout
    async fn settle(
        &self,
        caller: AgentId,
        pool: PoolId,
        route: &BackrunRoute,
        direction: TradeDirection,
        amount_in: u128,
        amount_out: u128,
        profit: u128,
    ) -> Result<ExecutionReceipt, HookError> {
        let record = self.ledger.apply_fill(pool, amount_in)?;
        let (caller_share, hook_share) = self.split_profit(profit);
        let profit_currency = route.output_currency(direction);

        if hook_share > 0 {
            self.accumulator
                .accumulate(self.engine_id, pool, profit_currency, hook_share)
                .await?;
        }
        if caller_share > 0 {
            self.settlement
                .transfer(caller, profit_currency, caller_share)
                .await?;
        }

        counter!("backruns_executed_total").increment(1);
        info!(
            pool = %pool,
            amount_in,
            amount_out,
            profit,
            outstanding = record.outstanding_amount,
            fully_executed = record.executed,
            "backrun executed"
        );

        Ok(ExecutionReceipt {
            amount_in,
            amount_out,
            profit,
            caller_share,
            hook_share,
            fully_executed: record.executed,
        })
    }
}

#[async_trait]
impl FlashBorrower for BackrunExecutor {
    async fn on_flash_loan(
        &self,
        caller: AgentId,
        initiator: AgentId,
        _asset: CurrencyId,
        amount: u128,
        premium: u128,
        data: &FlashLoanData,
    ) -> Result<u128, HookError> {
        // Only the lending facility may call back, and only for a loan
        // this engine initiated.
        if caller != self.lender.id() {
            return Err(HookError::Unauthorized(caller));
        }
        if initiator != self.engine_id {
            return Err(HookError::Unauthorized(initiator));
        }

        let amount_out = self
            .settlement
            .corrective_swap(data.route, data.direction, amount)
            .await?;

        let owed = amount + premium;
        if amount_out < owed {
            warn!(pool = %data.pool, amount_out, owed, "flash loan cannot be repaid");
            return Err(HookError::RepaymentShortfall {
                available: amount_out,
                owed,
            });
        }

        let profit = amount_out - owed;
        if profit < data.min_profit {
            return Err(HookError::ProfitBelowMinimum {
                profit,
                min_profit: data.min_profit,
            });
        }

        *self.pending_loan.lock() = Some(LoanOutcome { amount_out, profit });

        // Principal plus premium goes back before the callback returns.
        Ok(owed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{SimLender, SimSettlement};
    use crate::types::{Opportunity, WAD};

    struct Harness {
        settlement: Arc<SimSettlement>,
        ledger: Arc<OpportunityLedger>,
        accumulator: Arc<FeeAccumulator>,
        executor: BackrunExecutor,
        engine: AgentId,
        keeper: AgentId,
        pool: PoolId,
        route: BackrunRoute,
    }

    /// Main pool plus a profitable alternate-route pool for the same pair
    fn harness(route_reserve0: u128, route_reserve1: u128) -> Harness {
        let engine = AgentId::repeat(0xee);
        let keeper = AgentId::repeat(0x55);
        let pool = PoolId::repeat(1);
        let route_pool = PoolId::repeat(4);
        let route_id = RouteId::repeat(5);
        let currency0 = CurrencyId::repeat(2);
        let currency1 = CurrencyId::repeat(3);

        let settlement = Arc::new(SimSettlement::new());
        settlement.add_pool(route_pool, currency0, currency1, route_reserve0, route_reserve1, 3000);
        settlement.add_route(route_id, route_pool);

        let ledger = Arc::new(OpportunityLedger::new());
        ledger.set_recorder(engine).unwrap();

        let accumulator = Arc::new(FeeAccumulator::new(settlement.clone(), WAD, 0));
        accumulator.allow_source(engine).unwrap();
        accumulator.register_pool(pool, currency0, currency1).unwrap();

        let lender = Arc::new(SimLender::new(AgentId::repeat(0x77), 9)); // 0.09%
        let executor = BackrunExecutor::new(
            engine,
            ledger.clone(),
            accumulator.clone(),
            settlement.clone(),
            lender,
            2_000,
        )
        .unwrap();
        executor.add_keeper(keeper).unwrap();

        let route = BackrunRoute {
            route: route_id,
            currency0,
            currency1,
        };
        executor.set_route(pool, route).unwrap();

        Harness {
            settlement,
            ledger,
            accumulator,
            executor,
            engine,
            keeper,
            pool,
            route,
        }
    }

    fn record(h: &Harness, outstanding: u128) {
        h.ledger
            .record(
                h.engine,
                Opportunity {
                    pool: h.pool,
                    target_price: 2_000 * WAD,
                    current_price: 2_030 * WAD,
                    outstanding_amount: outstanding,
                    direction: TradeDirection::ZeroForOne,
                    detection_height: 10,
                    executed: false,
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn unauthorized_keeper_is_rejected() {
        let h = harness(1_000 * WAD, 2_000_000 * WAD);
        record(&h, 10 * WAD);
        let outsider = AgentId::repeat(0x99);
        assert_eq!(
            h.executor
                .execute_with_capital(outsider, h.pool, WAD, 0)
                .await
                .unwrap_err(),
            HookError::Unauthorized(outsider)
        );
    }

    #[tokio::test]
    async fn missing_route_is_a_hard_failure() {
        let h = harness(1_000 * WAD, 2_000_000 * WAD);
        let other = PoolId::repeat(8);
        h.ledger
            .record(
                h.engine,
                Opportunity {
                    pool: other,
                    target_price: 2_000 * WAD,
                    current_price: 2_030 * WAD,
                    outstanding_amount: 10 * WAD,
                    direction: TradeDirection::ZeroForOne,
                    detection_height: 10,
                    executed: false,
                },
            )
            .unwrap();
        assert_eq!(
            h.executor
                .execute_with_capital(h.keeper, other, WAD, 0)
                .await
                .unwrap_err(),
            HookError::NoRoute(other)
        );
    }

    #[tokio::test]
    async fn capital_execution_splits_profit_80_20() {
        let h = harness(1_000 * WAD, 2_000_000 * WAD);
        record(&h, 10 * WAD);

        let receipt = h
            .executor
            .execute_with_capital(h.keeper, h.pool, 10 * WAD, 0)
            .await
            .unwrap();

        assert!(receipt.profit > 0);
        assert_eq!(receipt.caller_share, receipt.profit * 2_000 / 10_000);
        assert_eq!(receipt.hook_share + receipt.caller_share, receipt.profit);
        assert!(receipt.fully_executed);

        let profit_currency = h.route.output_currency(TradeDirection::ZeroForOne);
        assert_eq!(
            h.settlement.payout(h.keeper, profit_currency),
            receipt.caller_share
        );
        assert_eq!(
            h.accumulator.balance(h.pool, profit_currency),
            receipt.hook_share
        );
        assert!(h.ledger.pending(h.pool).unwrap().executed);
    }

    #[tokio::test]
    async fn partial_fills_execute_only_after_the_last() {
        let h = harness(1_000 * WAD, 2_000_000 * WAD);
        record(&h, 9 * WAD);

        for expect_done in [false, false, true] {
            let receipt = h
                .executor
                .execute_with_capital(h.keeper, h.pool, 3 * WAD, 0)
                .await
                .unwrap();
            assert_eq!(receipt.fully_executed, expect_done);
        }
        assert_eq!(
            h.executor
                .execute_with_capital(h.keeper, h.pool, WAD, 0)
                .await
                .unwrap_err(),
            HookError::AlreadyExecuted(h.pool)
        );
    }

    #[tokio::test]
    async fn profit_below_minimum_aborts_without_fill() {
        let h = harness(1_000 * WAD, 2_000_000 * WAD);
        record(&h, 10 * WAD);

        let err = h
            .executor
            .execute_with_capital(h.keeper, h.pool, WAD, u128::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::ProfitBelowMinimum { .. }));
        assert_eq!(h.ledger.pending(h.pool).unwrap().outstanding_amount, 10 * WAD);
    }

    #[tokio::test]
    async fn loss_making_capital_execution_aborts_without_fill() {
        // Route pool prices currency0 far below par: the corrective swap
        // returns less than went in.
        let h = harness(2_000_000 * WAD, 1_000 * WAD);
        record(&h, 10 * WAD);

        let err = h
            .executor
            .execute_with_capital(h.keeper, h.pool, 10 * WAD, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::ProfitBelowMinimum { .. }));

        let pending = h.ledger.pending(h.pool).unwrap();
        assert_eq!(pending.outstanding_amount, 10 * WAD);
        assert!(!pending.executed);
        let profit_currency = h.route.output_currency(TradeDirection::ZeroForOne);
        assert_eq!(h.accumulator.balance(h.pool, profit_currency), 0);
        assert_eq!(h.settlement.payout(h.keeper, profit_currency), 0);
    }

    #[tokio::test]
    async fn flash_loan_execution_repays_and_splits() {
        let h = harness(1_000 * WAD, 2_000_000 * WAD);
        record(&h, 10 * WAD);

        let receipt = h
            .executor
            .execute_with_flash_loan(h.keeper, h.pool, 10 * WAD, WAD)
            .await
            .unwrap();

        assert!(receipt.profit >= WAD);
        let profit_currency = h.route.output_currency(TradeDirection::ZeroForOne);
        assert_eq!(
            h.settlement.payout(h.keeper, profit_currency),
            receipt.caller_share
        );
        assert_eq!(
            h.accumulator.balance(h.pool, profit_currency),
            receipt.hook_share
        );
        assert!(h.ledger.pending(h.pool).unwrap().executed);
    }

    #[tokio::test]
    async fn unrepayable_flash_loan_leaves_zero_state_change() {
        // Route pool prices currency0 far below par: the corrective swap
        // cannot cover principal plus premium.
        let h = harness(2_000_000 * WAD, 1_000 * WAD);
        record(&h, 10 * WAD);

        let err = h
            .executor
            .execute_with_flash_loan(h.keeper, h.pool, 10 * WAD, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::RepaymentShortfall { .. }));

        let pending = h.ledger.pending(h.pool).unwrap();
        assert_eq!(pending.outstanding_amount, 10 * WAD);
        assert!(!pending.executed);
        let profit_currency = h.route.output_currency(TradeDirection::ZeroForOne);
        assert_eq!(h.accumulator.balance(h.pool, profit_currency), 0);
        assert_eq!(h.settlement.payout(h.keeper, profit_currency), 0);
    }

    #[tokio::test]
    async fn callback_rejects_impostor_lender_and_initiator() {
        let h = harness(1_000 * WAD, 2_000_000 * WAD);
        let data = FlashLoanData {
            pool: h.pool,
            route: h.route.route,
            direction: TradeDirection::ZeroForOne,
            min_profit: 0,
        };

        let impostor = AgentId::repeat(0x66);
        assert_eq!(
            h.executor
                .on_flash_loan(impostor, h.engine, h.route.currency0, WAD, 0, &data)
                .await
                .unwrap_err(),
            HookError::Unauthorized(impostor)
        );

        let lender = AgentId::repeat(0x77);
        let wrong_initiator = AgentId::repeat(0x88);
        assert_eq!(
            h.executor
                .on_flash_loan(lender, wrong_initiator, h.route.currency0, WAD, 0, &data)
                .await
                .unwrap_err(),
            HookError::Unauthorized(wrong_initiator)
        );
    }

    #[tokio::test]
    async fn forwarder_may_trigger_execution() {
        let h = harness(1_000 * WAD, 2_000_000 * WAD);
        record(&h, 10 * WAD);
        let forwarder = AgentId::repeat(0x44);
        h.executor.add_forwarder(forwarder).unwrap();

        assert!(h
            .executor
            .execute_with_capital(forwarder, h.pool, 5 * WAD, 0)
            .await
            .is_ok());
    }
}
