//! Capture Engine CLI
//! Runs a scripted settlement round against the in-memory simulator

use capture_core::simulator::{SimLender, SimOracle, SimReputation, SimSettlement};
use capture_core::{
    AgentId, Config, CurrencyId, HookEngine, PoolId, PoolSnapshot, RouteId, TradeContext,
    TradeDirection, TradeKind,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use capture_core::backrun::BackrunRoute;
use capture_core::types::WAD;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    config.validate()?;
    init_logging(&config)?;

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║        CAPTURE ENGINE v0.1.0 - SIMULATED SETTLEMENT       ║");
    println!("║        Divergence capture | Backrun | LP donation         ║");
    println!("╚═══════════════════════════════════════════════════════════╝\n");

    info!("✅ Configuration loaded");
    info!("   Min divergence: {} bps", config.capture.min_divergence_bps);
    info!("   Hook share:     {} bps", config.capture.hook_share_bps);
    info!("   Keeper share:   {} bps", config.backrun.caller_share_bps);

    // Simulated world: the intercepted pool trades 2% above the oracle,
    // and an alternate venue for the same pair sits at the oracle price.
    let settlement = Arc::new(SimSettlement::new());
    let oracle = Arc::new(SimOracle::new());
    let lender = Arc::new(SimLender::new(AgentId::repeat(0xfe), 9));
    let reputation = Arc::new(SimReputation::new());

    let pool = PoolId::repeat(1);
    let route_pool = PoolId::repeat(4);
    let route_id = RouteId::repeat(5);
    let currency0 = CurrencyId::repeat(2);
    let currency1 = CurrencyId::repeat(3);

    settlement.add_pool(pool, currency0, currency1, 100_000 * WAD, 204_000_000 * WAD, 3000);
    settlement.add_pool(route_pool, currency0, currency1, 100_000 * WAD, 200_000_000 * WAD, 3000);
    settlement.add_route(route_id, route_pool);
    oracle.set_price(currency0, currency1, 2_000 * WAD, None);
    info!("✅ Simulated pools seeded");

    let engine_id = AgentId::repeat(0xee);
    let engine = HookEngine::new(
        engine_id,
        config.clone(),
        settlement.clone(),
        lender,
        reputation,
    )?;
    engine.register_builtin_agents(oracle.clone()).await?;

    let settlement_caller = AgentId::repeat(0x11);
    engine.router().authorize_caller(settlement_caller)?;

    let keeper = AgentId::repeat(0x55);
    engine.executor().add_keeper(keeper)?;
    engine.executor().set_route(
        pool,
        BackrunRoute {
            route: route_id,
            currency0,
            currency1,
        },
    )?;
    info!("✅ Engine wired | id: {}", engine_id);

    // Round 1: a trader sells currency0 into the overpriced pool.
    let amount_in = 500 * WAD;
    let snapshot = snapshot_of(&settlement, pool, currency0, currency1);
    let ctx = TradeContext {
        pool: snapshot,
        direction: TradeDirection::ZeroForOne,
        kind: TradeKind::ExactInput,
        amount_in,
        trader: AgentId::repeat(0x99),
    };

    let outcome = engine.pre_trade_hook(settlement_caller, &ctx).await?;
    info!(
        "🔄 Pre-trade | captured: {} | fee override: {:?}",
        outcome.capture_amount, outcome.fee_override
    );

    let traded_out = settlement
        .swap(pool, TradeDirection::ZeroForOne, amount_in)
        .unwrap_or(0);
    let settled_price = settlement.spot_price(pool).unwrap_or(0);
    info!("🔄 Trade settled | out: {}", traded_out);
    settlement.advance_height(1);

    let recorded = engine
        .post_trade_hook(settlement_caller, &ctx, settled_price)
        .await?;
    info!("🔄 Post-trade | settled: {} | backrun recorded: {:?}", settled_price, recorded);

    // A keeper clears the recorded dislocation with borrowed capital.
    if let Some(outstanding) = recorded {
        match engine
            .executor()
            .execute_with_flash_loan(keeper, pool, outstanding, 0)
            .await
        {
            Ok(receipt) => info!(
                "⚡ Backrun executed | profit: {} | keeper share: {}",
                receipt.profit, receipt.caller_share
            ),
            Err(err) => warn!("backrun execution failed: {err}"),
        }
    }

    // Round 2: the market turns and the pool underprices currency0.
    let mut snapshot = snapshot_of(&settlement, pool, currency0, currency1);
    snapshot.spot_price = 1_960 * WAD;
    let ctx = TradeContext {
        pool: snapshot,
        direction: TradeDirection::OneForZero,
        kind: TradeKind::ExactInput,
        amount_in,
        trader: AgentId::repeat(0x99),
    };
    let outcome = engine.pre_trade_hook(settlement_caller, &ctx).await?;
    info!("🔄 Pre-trade | captured: {}", outcome.capture_amount);

    // Donation is permissionless once both legs cross the threshold and
    // the interval has elapsed.
    settlement.advance_time(config.donation.min_interval_secs + 1);
    match engine.accumulator().donate(keeper, pool).await {
        Ok((donated0, donated1)) => {
            info!("💰 Donated to LPs | currency0: {} | currency1: {}", donated0, donated1)
        }
        Err(err) => warn!("donation gated: {err}"),
    }

    info!(
        "📊 Final | captured c1: {} | captured c0: {} | rewards: {:?}",
        settlement.captured(pool, currency1),
        settlement.captured(pool, currency0),
        settlement.rewards(pool),
    );
    info!("\n{}", metrics_handle.render());
    info!("✅ Settlement round complete");
    Ok(())
}

fn snapshot_of(
    settlement: &SimSettlement,
    pool: PoolId,
    currency0: CurrencyId,
    currency1: CurrencyId,
) -> PoolSnapshot {
    PoolSnapshot {
        pool,
        currency0,
        currency1,
        spot_price: settlement.spot_price(pool).unwrap_or(0),
        liquidity: 100_000 * WAD,
        fee_pips: 3000,
    }
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let level = config
        .logging
        .level
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    if config.logging.json_output {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
