//! Error taxonomy: hard failures abort the whole unit of work, agent
//! failures are swallowed by the router and recorded in stats.

use crate::types::{AgentCategory, AgentId, PoolId};
use thiserror::Error;

/// Failures that abort the entire invocation with zero state change
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("caller {0} is not authorized")]
    Unauthorized(AgentId),

    #[error("agent category {actual:?} does not match slot {expected:?}")]
    CategoryMismatch {
        expected: AgentCategory,
        actual: AgentCategory,
    },

    #[error("agent {0} reports itself inactive")]
    AgentInactive(AgentId),

    #[error("required address is zero")]
    ZeroAddress,

    #[error("{name} = {value} exceeds {max} basis points")]
    BpsOutOfRange {
        name: &'static str,
        value: u64,
        max: u64,
    },

    #[error("no pending opportunity for pool {0}")]
    NoOpportunity(PoolId),

    #[error("opportunity for pool {0} already fully executed")]
    AlreadyExecuted(PoolId),

    #[error("amount {amount} exceeds outstanding {outstanding}")]
    ExceedsOutstanding { amount: u128, outstanding: u128 },

    #[error("no corrective route registered for pool {0}")]
    NoRoute(PoolId),

    #[error("profit {profit} below minimum {min_profit}")]
    ProfitBelowMinimum { profit: u128, min_profit: u128 },

    #[error("flash loan repayment shortfall: have {available}, owe {owed}")]
    RepaymentShortfall { available: u128, owed: u128 },

    #[error("pool {0} is not registered with the accumulator")]
    UnknownPool(PoolId),

    #[error("donation below threshold: balances ({balance0}, {balance1}), minimum {min}")]
    DonationBelowThreshold {
        balance0: u128,
        balance1: u128,
        min: u128,
    },

    #[error("donation too soon: {elapsed}s elapsed, {min_interval}s required")]
    DonationTooSoon { elapsed: u64, min_interval: u64 },

    #[error("re-entrant call into {0}")]
    Reentrancy(&'static str),

    #[error("settlement engine: {0}")]
    Settlement(String),
}

/// Decision-provider failure. Never propagated past the router: the
/// consult path degrades to no-action and bumps the failure stats.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("oracle unavailable: {0}")]
    Oracle(String),

    #[error("agent failed: {0}")]
    Failed(String),
}
