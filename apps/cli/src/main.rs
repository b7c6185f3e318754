#![deny(warnings)]

//! Headless CLI: drives a full game with generated customer demand and
//! base-stock replenishment, then prints the per-chain cost summary.

use anyhow::{Context, Result};
use chain_core::{ChainIndex, DemandPattern, GameConfig, Role};
use chain_econ::{
    base_stock_order, demand_for_week, DEFAULT_DEMAND_AMPLITUDE, DEFAULT_DEMAND_OFFSET,
};
use chain_engine::GameEngine;
use persistence::InMemoryStore;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

struct Args {
    chains: u32,
    weeks: u32,
    pattern: DemandPattern,
    seed: u64,
    json: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        chains: 1,
        weeks: 52,
        pattern: DemandPattern::SineWave,
        seed: 42,
        json: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--chains" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.chains = v;
                }
            }
            "--weeks" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.weeks = v;
                }
            }
            "--pattern" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.pattern = v;
                }
            }
            "--seed" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.seed = v;
                }
            }
            "--json" => args.json = true,
            _ => {}
        }
    }
    args
}

// Each role re-orders from the next echelon up before the week advances.
const UPSTREAM: [(Role, Role); 3] = [
    (Role::Shop, Role::Retailer),
    (Role::Retailer, Role::Wholesaler),
    (Role::Wholesaler, Role::Factory),
];

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(
        chains = args.chains,
        weeks = args.weeks,
        pattern = %args.pattern,
        seed = args.seed,
        "starting driver"
    );

    let engine = GameEngine::with_store(Arc::new(InMemoryStore::default()));
    let config = GameConfig {
        chain_count: args.chains,
        weeks: args.weeks,
        demand_pattern: args.pattern,
        ..GameConfig::default()
    };
    let target_stock = config.initial_inventory;
    let game = engine.create_game(config)?;

    let roster = ["Mara", "Janek", "Petra", "Ivo"];
    for index in 0..args.chains {
        for (role, name) in Role::ALL.into_iter().zip(roster) {
            engine.join_game(game, ChainIndex(index), role, name)?;
        }
    }

    for week in 1..=args.weeks {
        for index in 0..args.chains {
            let idx = ChainIndex(index);
            let demand = demand_for_week(
                args.pattern,
                week,
                DEFAULT_DEMAND_AMPLITUDE,
                DEFAULT_DEMAND_OFFSET,
                args.seed.wrapping_add(u64::from(index)),
            );
            engine.place_customer_order(game, idx, week, demand)?;

            let snapshot = engine.game_state(game).context("game disappeared")?;
            let chain = &snapshot.chains[index as usize];
            for (role, upstream) in UPSTREAM {
                if let Some(view) = chain.node(role) {
                    let quantity = base_stock_order(
                        view.inventory,
                        view.backorder,
                        view.incoming_order,
                        target_stock,
                    );
                    if quantity > 0 {
                        engine.process_order(game, idx, role, upstream, quantity)?;
                    }
                }
            }
        }

        let outcome = engine.advance_week(game)?;
        for fault in &outcome.faults {
            warn!(chain = %fault.chain, error = %fault.error, "chain fault");
        }
    }

    let snapshot = engine.game_state(game).context("game disappeared")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!(
        "Game {} | status: {} | weeks played: {} | pattern: {}",
        snapshot.game_id, snapshot.status, snapshot.current_week, snapshot.demand_pattern
    );
    for chain in &snapshot.chains {
        println!("  {} | total cost: ${:.2}", chain.chain, chain.total_cost);
        for role in Role::ALL {
            if let Some(node) = chain.node(role) {
                println!(
                    "    {:<10} inventory: {:>5} backorder: {:>5} cost: ${:.2}",
                    node.role.as_str(),
                    node.inventory,
                    node.backorder,
                    node.total_cost
                );
            }
        }
    }

    Ok(())
}
