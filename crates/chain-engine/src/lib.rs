#![deny(warnings)]

//! Game orchestration: registry, weekly advancement, and state projection.
//!
//! A [`GameEngine`] owns every running game through a registry that maps
//! opaque game ids to per-game records guarded by a per-game lock. Mutating
//! calls on one game serialize through that lock; distinct games proceed in
//! parallel with no shared state.

use chain_core::{
    BacklogPolicy, ChainIndex, ChainKey, ChainSnapshot, Game, GameConfig, GameError, GameId,
    GameSnapshot, GameStatus, Node, Order, OrderId, OrderLedger, PlayerId, Role, SupplyChain,
};
use dashmap::DashMap;
use persistence::{GameStore, InMemoryStore};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// One chain of a game: role slots plus the chain's append-only ledger.
struct ChainState {
    chain: SupplyChain,
    ledger: OrderLedger,
}

/// A game and its arena of chains, addressed by [`ChainIndex`].
struct GameEntry {
    game: Game,
    chains: Vec<ChainState>,
}

impl GameEntry {
    fn chain_mut(&mut self, index: ChainIndex) -> Result<&mut ChainState, GameError> {
        let key = ChainKey {
            game: self.game.id,
            chain: index,
        };
        self.chains
            .get_mut(index.0 as usize)
            .ok_or(GameError::ChainNotFound(key))
    }

    fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            game_id: self.game.id,
            status: self.game.status,
            current_week: self.game.current_week,
            weeks: self.game.config.weeks,
            demand_pattern: self.game.config.demand_pattern,
            chains: self
                .chains
                .iter()
                .map(|state| ChainSnapshot::from(&state.chain))
                .collect(),
        }
    }
}

/// Concurrent game registry. Each game sits behind its own lock, so the
/// registry enforces the one-writer-per-game discipline structurally
/// instead of by caller convention.
#[derive(Default)]
struct GameRegistry {
    games: DashMap<GameId, Arc<Mutex<GameEntry>>>,
}

impl GameRegistry {
    fn insert(&self, entry: GameEntry) {
        self.games
            .insert(entry.game.id, Arc::new(Mutex::new(entry)));
    }

    /// Clone out the per-game handle. The map shard guard is released before
    /// the caller takes the game lock, so no lock is ever held across games.
    fn entry(&self, id: GameId) -> Result<Arc<Mutex<GameEntry>>, GameError> {
        self.games
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(GameError::GameNotFound(id))
    }
}

/// Per-chain failure recorded during a week advance.
#[derive(Debug)]
pub struct ChainFault {
    pub chain: ChainIndex,
    pub error: GameError,
}

/// Result of one week advance across all chains of a game.
#[derive(Debug)]
pub struct WeekOutcome {
    pub week: u32,
    pub status: GameStatus,
    pub faults: Vec<ChainFault>,
}

/// Orchestrates game creation, joining, ordering, and weekly advancement.
pub struct GameEngine {
    registry: GameRegistry,
    store: Arc<dyn GameStore>,
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GameEngine {
    /// Engine backed by a process-local in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::default()))
    }

    /// Engine with an injected persistence backend. Store failures are
    /// logged and never fail a game operation.
    pub fn with_store(store: Arc<dyn GameStore>) -> Self {
        Self {
            registry: GameRegistry::default(),
            store,
        }
    }

    /// Create a game with `config.chain_count` independent chains, each with
    /// an empty ledger.
    pub fn create_game(&self, config: GameConfig) -> Result<GameId, GameError> {
        config.validate()?;
        let game = Game::new(config);
        let id = game.id;
        let chains = (0..game.config.chain_count)
            .map(|index| ChainState {
                chain: SupplyChain::new(ChainKey {
                    game: id,
                    chain: ChainIndex(index),
                }),
                ledger: OrderLedger::default(),
            })
            .collect::<Vec<_>>();
        info!(game = %id, chains = chains.len(), weeks = game.config.weeks, "created game");
        let entry = GameEntry { game, chains };
        self.persist(&entry);
        self.registry.insert(entry);
        Ok(id)
    }

    /// Bind a new player node to a role slot. An occupied slot is rejected
    /// and left untouched.
    pub fn join_game(
        &self,
        game: GameId,
        chain: ChainIndex,
        role: Role,
        player_name: &str,
    ) -> Result<PlayerId, GameError> {
        self.with_game(game, |entry| {
            let initial_inventory = entry.game.config.initial_inventory;
            let state = entry.chain_mut(chain)?;
            let player = PlayerId::new();
            state
                .chain
                .occupy(Node::new(role, player, player_name, initial_inventory))?;
            info!(chain = %state.chain.key, %role, player = %player, name = player_name, "player joined");
            Ok(player)
        })
    }

    /// Record exogenous end-customer demand on the Shop node. The scalar is
    /// overwritten, so repeated calls within one week collapse to the last.
    pub fn place_customer_order(
        &self,
        game: GameId,
        chain: ChainIndex,
        week: u32,
        quantity: u32,
    ) -> Result<(), GameError> {
        self.with_game(game, |entry| {
            let state = entry.chain_mut(chain)?;
            let key = state.chain.key;
            let shop = state
                .chain
                .node_mut(Role::Shop)
                .ok_or(GameError::NodeNotFound {
                    chain: key,
                    role: Role::Shop,
                })?;
            shop.incoming_order = quantity;
            debug!(chain = %key, week, quantity, "customer order recorded");
            Ok(())
        })
    }

    /// Append an upstream order to the chain's ledger. Delivery is due after
    /// the fixed lead time; placing the order records the quantity as the
    /// sender's `current_order` and never touches inventory.
    pub fn process_order(
        &self,
        game: GameId,
        chain: ChainIndex,
        from_role: Role,
        to_role: Role,
        quantity: u32,
    ) -> Result<OrderId, GameError> {
        self.with_game(game, |entry| {
            let state = entry.chain_mut(chain)?;
            let key = state.chain.key;
            if state.chain.node(to_role).is_none() {
                return Err(GameError::NodeNotFound {
                    chain: key,
                    role: to_role,
                });
            }
            let week = state.chain.current_week;
            let sender = state
                .chain
                .node_mut(from_role)
                .ok_or(GameError::NodeNotFound {
                    chain: key,
                    role: from_role,
                })?;
            sender.current_order = quantity;
            let order = Order::new(key, from_role, to_role, quantity, week);
            let delivery_week = order.delivery_week;
            let id = state.ledger.place(order);
            info!(chain = %key, %from_role, %to_role, quantity, delivery_week, order = %id, "order placed");
            Ok(id)
        })
    }

    /// Advance the game by one week and run the weekly algorithm on every
    /// chain. Chains are processed independently: a faulting chain is
    /// reported in the outcome while its siblings still advance. Callers
    /// must invoke this exactly once per week; a repeat call advances the
    /// clock again.
    pub fn advance_week(&self, game: GameId) -> Result<WeekOutcome, GameError> {
        self.with_game(game, |entry| {
            if entry.game.status == GameStatus::Finished {
                return Err(GameError::GameFinished(entry.game.id));
            }
            if entry.game.status == GameStatus::Waiting {
                entry.game.status = GameStatus::Playing;
            }
            entry.game.current_week += 1;
            let week = entry.game.current_week;
            let config = entry.game.config.clone();

            let mut faults = Vec::new();
            for state in &mut entry.chains {
                state.chain.current_week = week;
                if let Err(error) = step_chain(state, week, &config) {
                    warn!(chain = %state.chain.key, %error, "chain faulted; siblings continue");
                    faults.push(ChainFault {
                        chain: state.chain.key.chain,
                        error,
                    });
                }
            }

            if week >= config.weeks {
                entry.game.status = GameStatus::Finished;
                info!(game = %entry.game.id, week, "game finished");
            }
            info!(game = %entry.game.id, week, faults = faults.len(), "week advanced");

            Ok(WeekOutcome {
                week,
                status: entry.game.status,
                faults,
            })
        })
    }

    /// Read-only projection of the full game state. Serializes through the
    /// per-game lock, so it never observes a half-advanced week.
    pub fn game_state(&self, game: GameId) -> Option<GameSnapshot> {
        let entry = self.registry.entry(game).ok()?;
        let guard = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(guard.snapshot())
    }

    fn with_game<T>(
        &self,
        game: GameId,
        op: impl FnOnce(&mut GameEntry) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let entry = self.registry.entry(game)?;
        let mut guard = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = op(&mut guard);
        if result.is_ok() {
            self.persist(&guard);
        }
        result
    }

    fn persist(&self, entry: &GameEntry) {
        if let Err(err) = self.store.save_game(&entry.snapshot()) {
            warn!(game = %entry.game.id, %err, "failed to persist game snapshot");
        }
        for state in &entry.chains {
            if let Err(err) = self.store.save_orders(state.chain.key, state.ledger.orders()) {
                warn!(chain = %state.chain.key, %err, "failed to persist orders");
            }
        }
    }
}

/// Run the weekly algorithm over one chain, in fixed role order.
fn step_chain(state: &mut ChainState, week: u32, config: &GameConfig) -> Result<(), GameError> {
    let key = state.chain.key;
    for role in Role::ALL {
        let ChainState { chain, ledger } = &mut *state;
        if let Some(node) = chain.node_mut(role) {
            step_node(node, ledger, key, week, config)?;
        }
    }
    Ok(())
}

/// One node's week: arrivals, fulfillment, backorder, cost, history.
fn step_node(
    node: &mut Node,
    ledger: &mut OrderLedger,
    chain: ChainKey,
    week: u32,
    config: &GameConfig,
) -> Result<(), GameError> {
    let arrived = ledger.deliver_due(node.role, week);
    let on_hand = u64::from(node.inventory) + arrived;
    node.inventory = u32::try_from(on_hand).map_err(|_| GameError::QuantityOverflow {
        chain,
        role: node.role,
    })?;

    let demand = node.incoming_order;
    let fulfilled = demand.min(node.inventory);
    node.inventory -= fulfilled;

    let unmet = demand - fulfilled;
    node.backorder = match config.backlog_policy {
        BacklogPolicy::Replace => unmet,
        BacklogPolicy::Accumulate => {
            if unmet == 0 {
                0
            } else {
                node.backorder.saturating_add(unmet)
            }
        }
    };

    node.total_cost += chain_econ::holding_cost(node.inventory, config.holding_cost_per_unit)
        + chain_econ::stockout_cost(node.backorder, config.stockout_cost_per_unit);
    node.record_history();

    debug!(
        %chain,
        role = %node.role,
        week,
        arrived,
        demand,
        fulfilled,
        inventory = node.inventory,
        backorder = node.backorder,
        "node processed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::{OrderStatus, HISTORY_WEEKS};
    use persistence::NullStore;
    use proptest::prelude::*;

    fn engine() -> GameEngine {
        GameEngine::with_store(Arc::new(NullStore))
    }

    fn shop_view(engine: &GameEngine, game: GameId, chain: ChainIndex) -> chain_core::NodeSnapshot {
        engine
            .game_state(game)
            .unwrap()
            .chains[chain.0 as usize]
            .node(Role::Shop)
            .unwrap()
            .clone()
    }

    #[test]
    fn create_game_rejects_zero_chains() {
        let engine = engine();
        let config = GameConfig {
            chain_count: 0,
            ..GameConfig::default()
        };
        assert!(matches!(
            engine.create_game(config),
            Err(GameError::InvalidArgument(_))
        ));
    }

    #[test]
    fn join_requires_known_game_and_chain() {
        let engine = engine();
        assert!(matches!(
            engine.join_game(GameId::new(), ChainIndex(0), Role::Shop, "ghost"),
            Err(GameError::GameNotFound(_))
        ));

        let game = engine.create_game(GameConfig::default()).unwrap();
        assert!(matches!(
            engine.join_game(game, ChainIndex(5), Role::Shop, "ghost"),
            Err(GameError::ChainNotFound(_))
        ));
    }

    #[test]
    fn invalid_role_string_creates_no_node() {
        let engine = engine();
        let game = engine.create_game(GameConfig::default()).unwrap();

        let parsed = "Distributor".parse::<Role>();
        assert!(matches!(parsed, Err(GameError::InvalidRole(_))));

        // Nothing joined: every slot is still empty.
        let snapshot = engine.game_state(game).unwrap();
        for role in Role::ALL {
            assert!(snapshot.chains[0].node(role).is_none());
        }
    }

    #[test]
    fn occupied_slot_rejects_second_join() {
        let engine = engine();
        let game = engine.create_game(GameConfig::default()).unwrap();
        let idx = ChainIndex(0);

        engine.join_game(game, idx, Role::Shop, "first").unwrap();
        let err = engine.join_game(game, idx, Role::Shop, "second").unwrap_err();
        assert!(matches!(err, GameError::RoleOccupied { role: Role::Shop, .. }));

        let snapshot = engine.game_state(game).unwrap();
        assert_eq!(
            snapshot.chains[0].node(Role::Shop).unwrap().player_name,
            "first"
        );
    }

    #[test]
    fn process_order_requires_both_nodes() {
        let engine = engine();
        let game = engine.create_game(GameConfig::default()).unwrap();
        let idx = ChainIndex(0);
        engine.join_game(game, idx, Role::Shop, "shopkeeper").unwrap();

        let err = engine
            .process_order(game, idx, Role::Shop, Role::Retailer, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            GameError::NodeNotFound { role: Role::Retailer, .. }
        ));
    }

    #[test]
    fn customer_order_needs_a_shop() {
        let engine = engine();
        let game = engine.create_game(GameConfig::default()).unwrap();
        let err = engine
            .place_customer_order(game, ChainIndex(0), 1, 10)
            .unwrap_err();
        assert!(matches!(err, GameError::NodeNotFound { role: Role::Shop, .. }));
    }

    #[test]
    fn same_week_customer_orders_collapse_to_last() {
        let engine = engine();
        let game = engine.create_game(GameConfig::default()).unwrap();
        let idx = ChainIndex(0);
        engine.join_game(game, idx, Role::Shop, "shopkeeper").unwrap();

        engine.place_customer_order(game, idx, 1, 10).unwrap();
        engine.place_customer_order(game, idx, 1, 30).unwrap();
        engine.advance_week(game).unwrap();

        assert_eq!(shop_view(&engine, game, idx).inventory, 70);
    }

    #[test]
    fn five_weeks_of_unmet_demand_replace_policy() {
        let engine = engine();
        let game = engine.create_game(GameConfig::default()).unwrap();
        let idx = ChainIndex(0);
        engine.join_game(game, idx, Role::Shop, "shopkeeper").unwrap();

        let expected = [
            (70, 0, 35.0),
            (40, 0, 55.0),
            (10, 0, 60.0),
            (0, 20, 100.0),
            (0, 30, 160.0),
        ];
        for (week, (inventory, backorder, cost)) in (1u32..=5).zip(expected) {
            engine.place_customer_order(game, idx, week, 30).unwrap();
            engine.advance_week(game).unwrap();

            let shop = shop_view(&engine, game, idx);
            assert_eq!(shop.inventory, inventory, "week {week}");
            assert_eq!(shop.backorder, backorder, "week {week}");
            assert_eq!(shop.total_cost, cost, "week {week}");
        }
    }

    #[test]
    fn backlog_accumulates_under_accumulate_policy() {
        let engine = engine();
        let config = GameConfig {
            backlog_policy: BacklogPolicy::Accumulate,
            ..GameConfig::default()
        };
        let game = engine.create_game(config).unwrap();
        let idx = ChainIndex(0);
        engine.join_game(game, idx, Role::Shop, "shopkeeper").unwrap();

        for week in 1u32..=5 {
            engine.place_customer_order(game, idx, week, 30).unwrap();
            engine.advance_week(game).unwrap();
        }

        let shop = shop_view(&engine, game, idx);
        // Weeks 4 and 5 leave 20 and then 20+30 unmet.
        assert_eq!(shop.backorder, 50);
        assert_eq!(shop.total_cost, 35.0 + 20.0 + 5.0 + 40.0 + 100.0);
    }

    #[test]
    fn orders_deliver_after_lead_time_exactly_once() {
        let store = Arc::new(InMemoryStore::default());
        let engine = GameEngine::with_store(Arc::clone(&store) as Arc<dyn GameStore>);
        let game = engine.create_game(GameConfig::default()).unwrap();
        let idx = ChainIndex(0);
        engine.join_game(game, idx, Role::Retailer, "ret").unwrap();
        engine.join_game(game, idx, Role::Wholesaler, "who").unwrap();

        for _ in 0..3 {
            engine.advance_week(game).unwrap();
        }
        engine
            .process_order(game, idx, Role::Retailer, Role::Wholesaler, 50)
            .unwrap();

        let wholesaler = |engine: &GameEngine| {
            engine.game_state(game).unwrap().chains[0]
                .node(Role::Wholesaler)
                .unwrap()
                .inventory
        };

        // Weeks 4-6: nothing arrives.
        for _ in 0..3 {
            engine.advance_week(game).unwrap();
            assert_eq!(wholesaler(&engine), 100);
        }
        // Week 7: the order lands in full.
        engine.advance_week(game).unwrap();
        assert_eq!(wholesaler(&engine), 150);

        // And never again.
        engine.advance_week(game).unwrap();
        assert_eq!(wholesaler(&engine), 150);

        let key = ChainKey { game, chain: idx };
        let orders = store.orders_for(key).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].delivery_week, 7);
        assert_eq!(orders[0].status, OrderStatus::Delivered);
        assert_eq!(orders[0].actual_delivery_week, Some(7));
    }

    #[test]
    fn chains_are_isolated() {
        let engine = engine();
        let config = GameConfig {
            chain_count: 3,
            ..GameConfig::default()
        };
        let game = engine.create_game(config).unwrap();
        for index in 0..3 {
            engine
                .join_game(game, ChainIndex(index), Role::Shop, "shopkeeper")
                .unwrap();
        }

        // Demand hits only the first chain.
        for week in 1u32..=2 {
            engine.place_customer_order(game, ChainIndex(0), week, 30).unwrap();
            engine.advance_week(game).unwrap();
        }

        let snapshot = engine.game_state(game).unwrap();
        let costs: Vec<f64> = snapshot.chains.iter().map(|c| c.total_cost).collect();
        assert_eq!(costs[0], 55.0);
        // Idle chains pay identical holding cost on the untouched inventory.
        assert_eq!(costs[1], 100.0);
        assert_eq!(costs[1], costs[2]);
    }

    #[test]
    fn week_limit_finishes_the_game() {
        let engine = engine();
        let config = GameConfig {
            weeks: 2,
            ..GameConfig::default()
        };
        let game = engine.create_game(config).unwrap();

        assert_eq!(engine.game_state(game).unwrap().status, GameStatus::Waiting);

        let outcome = engine.advance_week(game).unwrap();
        assert_eq!(outcome.week, 1);
        assert_eq!(outcome.status, GameStatus::Playing);

        let outcome = engine.advance_week(game).unwrap();
        assert_eq!(outcome.week, 2);
        assert_eq!(outcome.status, GameStatus::Finished);

        assert!(matches!(
            engine.advance_week(game),
            Err(GameError::GameFinished(_))
        ));
        assert_eq!(engine.game_state(game).unwrap().current_week, 2);
    }

    #[test]
    fn faulting_chain_does_not_stall_siblings() {
        let engine = engine();
        let config = GameConfig {
            chain_count: 2,
            initial_inventory: u32::MAX,
            ..GameConfig::default()
        };
        let game = engine.create_game(config).unwrap();
        for index in 0..2 {
            engine.join_game(game, ChainIndex(index), Role::Shop, "s").unwrap();
            engine.join_game(game, ChainIndex(index), Role::Retailer, "r").unwrap();
        }
        // Placed at week 0, due at week 4; the arrival into a saturated
        // inventory overflows chain 0.
        engine
            .process_order(game, ChainIndex(0), Role::Shop, Role::Retailer, 10)
            .unwrap();

        for _ in 0..3 {
            let outcome = engine.advance_week(game).unwrap();
            assert!(outcome.faults.is_empty());
        }
        let outcome = engine.advance_week(game).unwrap();
        assert_eq!(outcome.faults.len(), 1);
        assert_eq!(outcome.faults[0].chain, ChainIndex(0));
        assert!(matches!(
            outcome.faults[0].error,
            GameError::QuantityOverflow { role: Role::Retailer, .. }
        ));

        // The sibling chain kept advancing.
        let snapshot = engine.game_state(game).unwrap();
        assert_eq!(snapshot.chains[1].current_week, 4);
    }

    #[test]
    fn snapshot_is_persisted_through_the_store() {
        let store = Arc::new(InMemoryStore::default());
        let engine = GameEngine::with_store(Arc::clone(&store) as Arc<dyn GameStore>);
        let game = engine.create_game(GameConfig::default()).unwrap();

        assert_eq!(store.load_game(game).unwrap().unwrap().current_week, 0);
        engine.advance_week(game).unwrap();
        assert_eq!(store.load_game(game).unwrap().unwrap().current_week, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn cost_is_monotonic_and_history_bounded(
            demands in prop::collection::vec(0u32..40, 1..60)
        ) {
            let engine = engine();
            let config = GameConfig {
                weeks: demands.len() as u32,
                ..GameConfig::default()
            };
            let game = engine.create_game(config).unwrap();
            let idx = ChainIndex(0);
            engine.join_game(game, idx, Role::Shop, "bot").unwrap();

            let mut last_cost = 0.0f64;
            for (i, demand) in demands.iter().enumerate() {
                engine.place_customer_order(game, idx, i as u32 + 1, *demand).unwrap();
                engine.advance_week(game).unwrap();

                let shop = shop_view(&engine, game, idx);
                prop_assert!(shop.total_cost >= last_cost);
                last_cost = shop.total_cost;
                prop_assert!(shop.orders_history.len() <= HISTORY_WEEKS);
                prop_assert!(shop.inventory_history.len() <= HISTORY_WEEKS);
            }
        }
    }
}
