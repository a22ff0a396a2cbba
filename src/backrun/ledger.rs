//! Opportunity ledger
//!
//! At most one opportunity record per pool, last-detected-wins: a new
//! detection unconditionally replaces an unexecuted prior record. The
//! `executed` flag flips false to true exactly once, when the outstanding
//! amount reaches zero, and is never reset on that record.

use crate::error::HookError;
use crate::types::{AgentId, Opportunity, PoolId};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

pub struct OpportunityLedger {
    records: DashMap<PoolId, Opportunity>,
    recorder: RwLock<Option<AgentId>>,
}

impl OpportunityLedger {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            recorder: RwLock::new(None),
        }
    }

    /// Nominate the single account allowed to record opportunities
    pub fn set_recorder(&self, recorder: AgentId) -> Result<(), HookError> {
        if recorder.is_zero() {
            return Err(HookError::ZeroAddress);
        }
        *self.recorder.write() = Some(recorder);
        Ok(())
    }

    /// Record a candidate, replacing any prior record for the pool.
    /// An unexecuted prior record is silently discarded (last-write-wins,
    /// no queue); flagged as a possible value-loss point in review.
    pub fn record(&self, caller: AgentId, opportunity: Opportunity) -> Result<(), HookError> {
        if *self.recorder.read() != Some(caller) {
            return Err(HookError::Unauthorized(caller));
        }

        let pool = opportunity.pool;
        if let Some(prior) = self.records.insert(pool, opportunity) {
            if !prior.executed {
                debug!(
                    pool = %pool,
                    discarded_outstanding = prior.outstanding_amount,
                    "unexecuted opportunity replaced"
                );
            }
        }
        info!(pool = %pool, "backrun opportunity recorded");
        Ok(())
    }

    /// Validate a fill against the live record without mutating it
    pub fn begin_fill(&self, pool: PoolId, amount: u128) -> Result<Opportunity, HookError> {
        let record = self
            .records
            .get(&pool)
            .ok_or(HookError::NoOpportunity(pool))?;
        if record.executed {
            return Err(HookError::AlreadyExecuted(pool));
        }
        if amount > record.outstanding_amount {
            return Err(HookError::ExceedsOutstanding {
                amount,
                outstanding: record.outstanding_amount,
            });
        }
        Ok(record.clone())
    }

    /// Decrement the outstanding amount, marking the record executed when
    /// it reaches zero. Re-validates so the mutation can be deferred until
    /// after the corrective trade succeeds.
    pub fn apply_fill(&self, pool: PoolId, amount: u128) -> Result<Opportunity, HookError> {
        let mut record = self
            .records
            .get_mut(&pool)
            .ok_or(HookError::NoOpportunity(pool))?;
        if record.executed {
            return Err(HookError::AlreadyExecuted(pool));
        }
        if amount > record.outstanding_amount {
            return Err(HookError::ExceedsOutstanding {
                amount,
                outstanding: record.outstanding_amount,
            });
        }
        record.outstanding_amount -= amount;
        if record.outstanding_amount == 0 {
            record.executed = true;
        }
        Ok(record.clone())
    }

    /// Read-only query of the pool's current record
    pub fn pending(&self, pool: PoolId) -> Option<Opportunity> {
        self.records.get(&pool).map(|r| r.clone())
    }
}

impl Default for OpportunityLedger {
    fn default() -> Self {
        Self::new()
    }
}
