//! Per-entry-point reentrancy flags.
//!
//! The execution model is a globally serialized unit of work, so the hazard
//! is a nested call re-entering the same entry point mid-execution, not a
//! cross-thread race. Each guarded entry point owns one flag; the token
//! releases it on drop, including on the error path.

use crate::error::HookError;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct ReentrancyGuard {
    entered: AtomicBool,
    entry_point: &'static str,
}

impl ReentrancyGuard {
    pub const fn new(entry_point: &'static str) -> Self {
        Self {
            entered: AtomicBool::new(false),
            entry_point,
        }
    }

    /// Acquire the flag, failing if this entry point is already executing.
    pub fn enter(&self) -> Result<GuardToken<'_>, HookError> {
        if self.entered.swap(true, Ordering::AcqRel) {
            return Err(HookError::Reentrancy(self.entry_point));
        }
        Ok(GuardToken { guard: self })
    }
}

pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.entered.store(false, Ordering::Release);
    }
}
