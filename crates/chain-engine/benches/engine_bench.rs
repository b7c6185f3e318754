use chain_core::{ChainIndex, DemandPattern, GameConfig, Role};
use chain_engine::GameEngine;
use criterion::{criterion_group, criterion_main, Criterion};
use persistence::NullStore;
use std::sync::Arc;

fn run_season(chains: u32, weeks: u32) {
    let engine = GameEngine::with_store(Arc::new(NullStore));
    let config = GameConfig {
        chain_count: chains,
        weeks,
        demand_pattern: DemandPattern::Step,
        ..GameConfig::default()
    };
    let game = engine.create_game(config).unwrap();
    for index in 0..chains {
        for role in Role::ALL {
            engine
                .join_game(game, ChainIndex(index), role, "bot")
                .unwrap();
        }
    }
    for week in 1..=weeks {
        for index in 0..chains {
            let idx = ChainIndex(index);
            engine.place_customer_order(game, idx, week, 8).unwrap();
            engine
                .process_order(game, idx, Role::Shop, Role::Retailer, 8)
                .unwrap();
            engine
                .process_order(game, idx, Role::Retailer, Role::Wholesaler, 8)
                .unwrap();
        }
        engine.advance_week(game).unwrap();
    }
}

fn bench_weeks(c: &mut Criterion) {
    c.bench_function("advance 4 chains x 52 weeks", |b| {
        b.iter(|| run_season(4, 52))
    });
}

criterion_group!(benches, bench_weeks);
criterion_main!(benches);
