//! Decision routing
//!
//! Routes trade context to pluggable decision agents per category with
//! primary/backup fail-over. Agent failures never block the trade path:
//! they degrade to no-action and land in the slot's stats. The
//! reputation-gated auto-switch is operator-invoked and never runs on the
//! trade path.

pub mod agents;

pub use agents::{AgentDecision, BackrunSignal, DecisionAgent};

use crate::error::HookError;
use crate::ports::ReputationSource;
use crate::types::{AgentCategory, AgentId, CaptureDecision, FeeDecision, TradeContext, BPS};
use dashmap::DashMap;
use metrics::counter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Execution statistics for one routing slot
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SlotStats {
    pub executions: u64,
    pub successes: u64,
    pub cumulative_value: u128,
    pub last_execution_time: u64,
}

/// Reputation-gated auto-switch configuration for one category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationSwitchConfig {
    pub trusted_reporters: Vec<AgentId>,
    pub tag1: String,
    pub tag2: String,
    /// Primary is replaced when its normalized score drops below this
    pub min_score_bps: u64,
}

/// Serializable view of a slot's registration and stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationView {
    pub category: AgentCategory,
    pub primary: Option<AgentId>,
    pub backup: Option<AgentId>,
    pub enabled: bool,
    pub stats: SlotStats,
    pub reputation_switches: u64,
}

struct Slot {
    primary: Option<Arc<dyn DecisionAgent>>,
    backup: Option<Arc<dyn DecisionAgent>>,
    enabled: bool,
    stats: SlotStats,
    reputation: Option<ReputationSwitchConfig>,
    switches: u64,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            primary: None,
            backup: None,
            enabled: true,
            stats: SlotStats::default(),
            reputation: None,
            switches: 0,
        }
    }
}

fn category_label(category: AgentCategory) -> &'static str {
    match category {
        AgentCategory::Arbitrage => "arbitrage",
        AgentCategory::DynamicFee => "dynamic_fee",
        AgentCategory::Backrun => "backrun",
    }
}

/// Per-category agent registry and trade-path router
pub struct AgentRouter {
    slots: DashMap<AgentCategory, Slot>,
    authorized: RwLock<HashSet<AgentId>>,
    reputation: Arc<dyn ReputationSource>,
}

impl AgentRouter {
    pub fn new(reputation: Arc<dyn ReputationSource>) -> Self {
        Self {
            slots: DashMap::new(),
            authorized: RwLock::new(HashSet::new()),
            reputation,
        }
    }

    // ---- administrative operations ----

    /// Register or replace the primary agent for a category
    pub async fn register_agent(
        &self,
        category: AgentCategory,
        agent: Arc<dyn DecisionAgent>,
    ) -> Result<(), HookError> {
        self.check_agent(category, &agent).await?;
        let mut slot = self.slots.entry(category).or_default();
        slot.primary = Some(agent);
        info!(category = category_label(category), "primary agent registered");
        Ok(())
    }

    /// Register or replace the backup agent for a category
    pub async fn set_backup(
        &self,
        category: AgentCategory,
        agent: Arc<dyn DecisionAgent>,
    ) -> Result<(), HookError> {
        self.check_agent(category, &agent).await?;
        let mut slot = self.slots.entry(category).or_default();
        slot.backup = Some(agent);
        info!(category = category_label(category), "backup agent registered");
        Ok(())
    }

    pub fn clear_backup(&self, category: AgentCategory) {
        if let Some(mut slot) = self.slots.get_mut(&category) {
            slot.backup = None;
        }
    }

    pub fn set_enabled(&self, category: AgentCategory, enabled: bool) {
        let mut slot = self.slots.entry(category).or_default();
        slot.enabled = enabled;
        info!(category = category_label(category), enabled, "category toggled");
    }

    /// Allow an external caller (the settlement engine) to invoke routing
    pub fn authorize_caller(&self, caller: AgentId) -> Result<(), HookError> {
        if caller.is_zero() {
            return Err(HookError::ZeroAddress);
        }
        self.authorized.write().insert(caller);
        Ok(())
    }

    pub fn revoke_caller(&self, caller: AgentId) {
        self.authorized.write().remove(&caller);
    }

    pub fn is_authorized(&self, caller: AgentId) -> bool {
        self.authorized.read().contains(&caller)
    }

    /// Configure the reputation-gated auto-switch for a category
    pub fn configure_reputation_switch(
        &self,
        category: AgentCategory,
        config: ReputationSwitchConfig,
    ) -> Result<(), HookError> {
        if config.min_score_bps > BPS {
            return Err(HookError::BpsOutOfRange {
                name: "min_score_bps",
                value: config.min_score_bps,
                max: BPS,
            });
        }
        let mut slot = self.slots.entry(category).or_default();
        slot.reputation = Some(config);
        Ok(())
    }

    async fn check_agent(
        &self,
        category: AgentCategory,
        agent: &Arc<dyn DecisionAgent>,
    ) -> Result<(), HookError> {
        if agent.id().is_zero() {
            return Err(HookError::ZeroAddress);
        }
        if agent.category() != category {
            return Err(HookError::CategoryMismatch {
                expected: category,
                actual: agent.category(),
            });
        }
        if !agent.is_active().await {
            return Err(HookError::AgentInactive(agent.id()));
        }
        Ok(())
    }

    // ---- trade path ----

    /// Pre-trade routing: arbitrage first, and a positive capture
    /// short-circuits the fee consult. Agent failures degrade silently.
    pub async fn route_before_trade(
        &self,
        ctx: &TradeContext,
        now: u64,
    ) -> (Option<CaptureDecision>, Option<FeeDecision>) {
        if let Some(AgentDecision::Capture(decision)) =
            self.consult(AgentCategory::Arbitrage, ctx, None, now).await
        {
            if decision.should_capture && decision.capture_amount > 0 {
                return (Some(decision), None);
            }
        }

        if let Some(AgentDecision::Fee(decision)) = self
            .consult(AgentCategory::DynamicFee, ctx, None, now)
            .await
        {
            if decision.use_override {
                return (None, Some(decision));
            }
        }

        (None, None)
    }

    /// Post-trade routing: the backrun consult, degrading silently
    pub async fn route_after_trade(
        &self,
        ctx: &TradeContext,
        settled_price: u128,
        now: u64,
    ) -> Option<BackrunSignal> {
        match self
            .consult(AgentCategory::Backrun, ctx, Some(settled_price), now)
            .await
        {
            Some(AgentDecision::Backrun(signal)) if signal.amount > 0 => Some(signal),
            _ => None,
        }
    }

    /// Consult a slot's primary, falling back to the backup exactly once.
    /// Both failing is a silent no-action recorded in stats.
    async fn consult(
        &self,
        category: AgentCategory,
        ctx: &TradeContext,
        settled_price: Option<u128>,
        now: u64,
    ) -> Option<AgentDecision> {
        // Clone the arcs out so no map guard is held across an await.
        let (primary, backup) = {
            let slot = self.slots.get(&category)?;
            if !slot.enabled {
                return None;
            }
            (slot.primary.clone()?, slot.backup.clone())
        };

        let decision = match primary.decide(ctx, settled_price).await {
            Ok(decision) => Some(decision),
            Err(err) => {
                warn!(
                    category = category_label(category),
                    agent = %primary.id(),
                    %err,
                    "primary agent failed"
                );
                counter!("provider_failures_total", "category" => category_label(category))
                    .increment(1);
                match backup {
                    Some(backup) => match backup.decide(ctx, settled_price).await {
                        Ok(decision) => Some(decision),
                        Err(err) => {
                            warn!(
                                category = category_label(category),
                                agent = %backup.id(),
                                %err,
                                "backup agent failed"
                            );
                            counter!("provider_failures_total", "category" => category_label(category))
                                .increment(1);
                            None
                        }
                    },
                    None => None,
                }
            }
        };

        if let Some(mut slot) = self.slots.get_mut(&category) {
            slot.stats.executions += 1;
            slot.stats.last_execution_time = now;
            if let Some(decision) = &decision {
                slot.stats.successes += 1;
                slot.stats.cumulative_value =
                    slot.stats.cumulative_value.saturating_add(decision.value());
            }
        }

        debug!(
            category = category_label(category),
            outcome = ?decision,
            "agent consulted"
        );
        decision
    }

    // ---- reputation-gated auto-switch (off the trade path) ----

    /// Promote the backup over a low-reputation primary. Returns whether a
    /// switch happened. The backup slot is cleared on promotion, which is
    /// what makes an immediate repeat call a no-op.
    pub async fn try_reputation_switch(
        &self,
        category: AgentCategory,
        now: u64,
    ) -> Result<bool, HookError> {
        let (primary, backup, config) = {
            let Some(slot) = self.slots.get(&category) else {
                return Ok(false);
            };
            let (Some(primary), Some(config)) = (slot.primary.clone(), slot.reputation.clone())
            else {
                return Ok(false);
            };
            (primary, slot.backup.clone(), config)
        };

        let summary = match self
            .reputation
            .summary(
                primary.id(),
                &config.trusted_reporters,
                &config.tag1,
                &config.tag2,
            )
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                warn!(category = category_label(category), %err, "reputation source failed");
                return Ok(false);
            }
        };

        if summary.sample_count == 0 || summary.score_bps() >= config.min_score_bps {
            return Ok(false);
        }

        let Some(backup) = backup else {
            return Ok(false);
        };
        if !backup.is_active().await {
            return Ok(false);
        }

        let mut slot = self.slots.entry(category).or_default();
        info!(
            category = category_label(category),
            demoted = %primary.id(),
            promoted = %backup.id(),
            score_bps = summary.score_bps(),
            "reputation switch"
        );
        slot.primary = Some(backup);
        slot.backup = None;
        slot.switches += 1;
        slot.stats.last_execution_time = now;
        counter!("reputation_switches_total", "category" => category_label(category)).increment(1);
        Ok(true)
    }

    // ---- read-only queries ----

    pub fn registration(&self, category: AgentCategory) -> Option<RegistrationView> {
        let slot = self.slots.get(&category)?;
        Some(RegistrationView {
            category,
            primary: slot.primary.as_ref().map(|a| a.id()),
            backup: slot.backup.as_ref().map(|a| a.id()),
            enabled: slot.enabled,
            stats: slot.stats,
            reputation_switches: slot.switches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::types::{
        CurrencyId, PoolId, PoolSnapshot, ReputationSummary, TradeDirection, TradeKind, WAD,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct ScriptedAgent {
        id: AgentId,
        category: AgentCategory,
        active: AtomicBool,
        fail: AtomicBool,
        decision: AgentDecision,
        calls: AtomicU64,
    }

    impl ScriptedAgent {
        fn new(id: u8, category: AgentCategory, decision: AgentDecision) -> Arc<Self> {
            Arc::new(Self {
                id: AgentId::repeat(id),
                category,
                active: AtomicBool::new(true),
                fail: AtomicBool::new(false),
                decision,
                calls: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl DecisionAgent for ScriptedAgent {
        fn id(&self) -> AgentId {
            self.id
        }

        fn category(&self) -> AgentCategory {
            self.category
        }

        async fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        async fn decide(
            &self,
            _ctx: &TradeContext,
            _settled_price: Option<u128>,
        ) -> Result<AgentDecision, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AgentError::Failed("scripted failure".into()));
            }
            Ok(self.decision)
        }
    }

    struct FixedReputation {
        summary: ReputationSummary,
    }

    #[async_trait]
    impl ReputationSource for FixedReputation {
        async fn summary(
            &self,
            _subject: AgentId,
            _reporters: &[AgentId],
            _tag1: &str,
            _tag2: &str,
        ) -> Result<ReputationSummary, AgentError> {
            Ok(self.summary)
        }
    }

    fn router_with(summary: ReputationSummary) -> AgentRouter {
        AgentRouter::new(Arc::new(FixedReputation { summary }))
    }

    fn ctx() -> TradeContext {
        TradeContext {
            pool: PoolSnapshot {
                pool: PoolId::repeat(1),
                currency0: CurrencyId::repeat(2),
                currency1: CurrencyId::repeat(3),
                spot_price: 2_000 * WAD,
                liquidity: WAD,
                fee_pips: 3000,
            },
            direction: TradeDirection::ZeroForOne,
            kind: TradeKind::ExactInput,
            amount_in: 1_000 * WAD,
            trader: AgentId::repeat(9),
        }
    }

    fn capture_decision(amount: u128) -> AgentDecision {
        AgentDecision::Capture(CaptureDecision {
            should_capture: true,
            divergence_bps: 200,
            capture_amount: amount,
            hook_share: amount * 8 / 10,
            lp_share: amount - amount * 8 / 10,
        })
    }

    fn no_samples() -> ReputationSummary {
        ReputationSummary {
            sample_count: 0,
            average_value: 0,
            decimals: 2,
        }
    }

    #[tokio::test]
    async fn category_mismatch_is_rejected() {
        let router = router_with(no_samples());
        let agent = ScriptedAgent::new(0x11, AgentCategory::DynamicFee, AgentDecision::NoAction);
        let err = router
            .register_agent(AgentCategory::Arbitrage, agent)
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::CategoryMismatch { .. }));
    }

    #[tokio::test]
    async fn inactive_agent_is_rejected() {
        let router = router_with(no_samples());
        let agent = ScriptedAgent::new(0x11, AgentCategory::Arbitrage, AgentDecision::NoAction);
        agent.active.store(false, Ordering::SeqCst);
        let err = router
            .register_agent(AgentCategory::Arbitrage, agent)
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::AgentInactive(_)));
    }

    #[tokio::test]
    async fn positive_capture_short_circuits_fee_consult() {
        let router = router_with(no_samples());
        let arb = ScriptedAgent::new(0x11, AgentCategory::Arbitrage, capture_decision(10 * WAD));
        let fee = ScriptedAgent::new(
            0x22,
            AgentCategory::DynamicFee,
            AgentDecision::Fee(FeeDecision {
                fee_pips: 500,
                use_override: true,
            }),
        );
        router
            .register_agent(AgentCategory::Arbitrage, arb.clone())
            .await
            .unwrap();
        router
            .register_agent(AgentCategory::DynamicFee, fee.clone())
            .await
            .unwrap();

        let (capture, fee_decision) = router.route_before_trade(&ctx(), 1).await;
        assert!(capture.is_some());
        assert!(fee_decision.is_none());
        assert_eq!(fee.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_primary_falls_back_to_backup_once() {
        let router = router_with(no_samples());
        let primary =
            ScriptedAgent::new(0x11, AgentCategory::Arbitrage, AgentDecision::NoAction);
        primary.fail.store(true, Ordering::SeqCst);
        let backup = ScriptedAgent::new(0x12, AgentCategory::Arbitrage, capture_decision(WAD));
        router
            .register_agent(AgentCategory::Arbitrage, primary.clone())
            .await
            .unwrap();
        router
            .set_backup(AgentCategory::Arbitrage, backup.clone())
            .await
            .unwrap();

        let (capture, _) = router.route_before_trade(&ctx(), 1).await;
        assert!(capture.is_some());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);

        let view = router.registration(AgentCategory::Arbitrage).unwrap();
        assert_eq!(view.stats.executions, 1);
        assert_eq!(view.stats.successes, 1);
    }

    #[tokio::test]
    async fn both_failing_degrades_to_no_capture_and_consults_fee() {
        let router = router_with(no_samples());
        let arb = ScriptedAgent::new(0x11, AgentCategory::Arbitrage, AgentDecision::NoAction);
        arb.fail.store(true, Ordering::SeqCst);
        let fee = ScriptedAgent::new(
            0x22,
            AgentCategory::DynamicFee,
            AgentDecision::Fee(FeeDecision {
                fee_pips: 500,
                use_override: true,
            }),
        );
        router
            .register_agent(AgentCategory::Arbitrage, arb)
            .await
            .unwrap();
        router
            .register_agent(AgentCategory::DynamicFee, fee)
            .await
            .unwrap();

        let (capture, fee_decision) = router.route_before_trade(&ctx(), 1).await;
        assert!(capture.is_none());
        assert_eq!(fee_decision.unwrap().fee_pips, 500);

        let view = router.registration(AgentCategory::Arbitrage).unwrap();
        assert_eq!(view.stats.executions, 1);
        assert_eq!(view.stats.successes, 0);
    }

    #[tokio::test]
    async fn disabled_category_is_skipped_entirely() {
        let router = router_with(no_samples());
        let arb = ScriptedAgent::new(0x11, AgentCategory::Arbitrage, capture_decision(WAD));
        router
            .register_agent(AgentCategory::Arbitrage, arb.clone())
            .await
            .unwrap();
        router.set_enabled(AgentCategory::Arbitrage, false);

        let (capture, _) = router.route_before_trade(&ctx(), 1).await;
        assert!(capture.is_none());
        assert_eq!(arb.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reputation_switch_with_zero_samples_is_noop() {
        let router = router_with(no_samples());
        let primary =
            ScriptedAgent::new(0x11, AgentCategory::Arbitrage, AgentDecision::NoAction);
        let backup = ScriptedAgent::new(0x12, AgentCategory::Arbitrage, AgentDecision::NoAction);
        router
            .register_agent(AgentCategory::Arbitrage, primary)
            .await
            .unwrap();
        router
            .set_backup(AgentCategory::Arbitrage, backup)
            .await
            .unwrap();
        router
            .configure_reputation_switch(
                AgentCategory::Arbitrage,
                ReputationSwitchConfig {
                    trusted_reporters: vec![AgentId::repeat(0xee)],
                    tag1: "execution".into(),
                    tag2: "quality".into(),
                    min_score_bps: 5_000,
                },
            )
            .unwrap();

        assert!(!router
            .try_reputation_switch(AgentCategory::Arbitrage, 1)
            .await
            .unwrap());
        let view = router.registration(AgentCategory::Arbitrage).unwrap();
        assert_eq!(view.primary, Some(AgentId::repeat(0x11)));
        assert_eq!(view.reputation_switches, 0);
    }

    #[tokio::test]
    async fn reputation_switch_promotes_backup_exactly_once() {
        // Score of 0.25 on a 2-decimal scale -> 2500 bps, below 5000.
        let router = router_with(ReputationSummary {
            sample_count: 7,
            average_value: 25,
            decimals: 2,
        });
        let primary =
            ScriptedAgent::new(0x11, AgentCategory::Arbitrage, AgentDecision::NoAction);
        let backup = ScriptedAgent::new(0x12, AgentCategory::Arbitrage, AgentDecision::NoAction);
        router
            .register_agent(AgentCategory::Arbitrage, primary)
            .await
            .unwrap();
        router
            .set_backup(AgentCategory::Arbitrage, backup)
            .await
            .unwrap();
        router
            .configure_reputation_switch(
                AgentCategory::Arbitrage,
                ReputationSwitchConfig {
                    trusted_reporters: vec![],
                    tag1: "execution".into(),
                    tag2: "quality".into(),
                    min_score_bps: 5_000,
                },
            )
            .unwrap();

        assert!(router
            .try_reputation_switch(AgentCategory::Arbitrage, 10)
            .await
            .unwrap());
        let view = router.registration(AgentCategory::Arbitrage).unwrap();
        assert_eq!(view.primary, Some(AgentId::repeat(0x12)));
        assert_eq!(view.backup, None);
        assert_eq!(view.reputation_switches, 1);

        // Same feed values again: no backup left, so a no-op.
        assert!(!router
            .try_reputation_switch(AgentCategory::Arbitrage, 11)
            .await
            .unwrap());
        let view = router.registration(AgentCategory::Arbitrage).unwrap();
        assert_eq!(view.reputation_switches, 1);
    }

    #[tokio::test]
    async fn caller_authorization_round_trip() {
        let router = router_with(no_samples());
        let caller = AgentId::repeat(0x55);
        assert!(!router.is_authorized(caller));
        router.authorize_caller(caller).unwrap();
        assert!(router.is_authorized(caller));
        router.revoke_caller(caller);
        assert!(!router.is_authorized(caller));

        assert_eq!(
            router.authorize_caller(AgentId::ZERO).unwrap_err(),
            HookError::ZeroAddress
        );
    }
}
