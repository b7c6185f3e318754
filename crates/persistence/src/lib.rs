#![deny(warnings)]

//! Persistence boundary for game state.
//!
//! The engine records snapshots and order ledgers through the [`GameStore`]
//! trait and never depends on a concrete backend. [`InMemoryStore`] is the
//! default process-local backend; [`NullStore`] discards everything.

use chain_core::{ChainKey, GameId, GameSnapshot, Order};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Errors produced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Injected storage boundary. Implementations must tolerate being called
/// from multiple games concurrently.
pub trait GameStore: Send + Sync {
    /// Record the latest snapshot of a game.
    fn save_game(&self, snapshot: &GameSnapshot) -> Result<(), StoreError>;
    /// Record a chain's full order ledger.
    fn save_orders(&self, chain: ChainKey, orders: &[Order]) -> Result<(), StoreError>;
    /// Fetch the last recorded snapshot, if any.
    fn load_game(&self, game: GameId) -> Result<Option<GameSnapshot>, StoreError>;
}

/// Store that accepts and discards everything.
pub struct NullStore;

impl GameStore for NullStore {
    fn save_game(&self, _snapshot: &GameSnapshot) -> Result<(), StoreError> {
        Ok(())
    }

    fn save_orders(&self, _chain: ChainKey, _orders: &[Order]) -> Result<(), StoreError> {
        Ok(())
    }

    fn load_game(&self, _game: GameId) -> Result<Option<GameSnapshot>, StoreError> {
        Ok(None)
    }
}

/// JSON-encoded store held in process memory. Doubles as the reference
/// behavior for durable backends.
#[derive(Default)]
pub struct InMemoryStore {
    games: Mutex<HashMap<GameId, String>>,
    orders: Mutex<HashMap<ChainKey, String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryStore {
    pub fn game_count(&self) -> usize {
        lock(&self.games).len()
    }

    /// Decode the last recorded ledger for a chain.
    pub fn orders_for(&self, chain: ChainKey) -> Result<Vec<Order>, StoreError> {
        match lock(&self.orders).get(&chain) {
            Some(encoded) => {
                serde_json::from_str(encoded).map_err(|e| StoreError::Decode(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }
}

impl GameStore for InMemoryStore {
    fn save_game(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_string(snapshot).map_err(|e| StoreError::Encode(e.to_string()))?;
        lock(&self.games).insert(snapshot.game_id, encoded);
        debug!(game = %snapshot.game_id, week = snapshot.current_week, "snapshot stored");
        Ok(())
    }

    fn save_orders(&self, chain: ChainKey, orders: &[Order]) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_string(orders).map_err(|e| StoreError::Encode(e.to_string()))?;
        lock(&self.orders).insert(chain, encoded);
        Ok(())
    }

    fn load_game(&self, game: GameId) -> Result<Option<GameSnapshot>, StoreError> {
        match lock(&self.games).get(&game) {
            Some(encoded) => serde_json::from_str(encoded)
                .map(Some)
                .map_err(|e| StoreError::Decode(e.to_string())),
            None => Ok(None),
        }
    }
}
