//! Backrun subsystem: opportunity ledger and keeper-facing executor

mod executor;
mod ledger;

pub use executor::{BackrunExecutor, BackrunRoute, ExecutionReceipt};
pub use ledger::OpportunityLedger;
