#![deny(warnings)]

//! Core domain models and invariants for the supply-chain game.
//!
//! This crate defines the typed ids, role/status enums, configuration,
//! per-role node state, chain and order records, and the per-chain order
//! ledger shared across the simulation, plus the serializable snapshot
//! projection used at the engine boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Weeks between placing an order upstream and its delivery.
pub const LEAD_TIME_WEEKS: u32 = 4;

/// Sliding-window length for per-node order and inventory history.
pub const HISTORY_WEEKS: usize = 52;

/// Unique identifier of a game run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(Uuid);

impl GameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a joined player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of an order in a chain's ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a chain within its game (arena index, zero-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainIndex(pub u32);

impl fmt::Display for ChainIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// Structured compound key addressing one chain of one game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainKey {
    pub game: GameId,
    pub chain: ChainIndex,
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game, self.chain)
    }
}

/// The four echelons of a chain, in downstream-to-upstream processing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Shop,
    Retailer,
    Wholesaler,
    Factory,
}

impl Role {
    /// Fixed weekly processing order.
    pub const ALL: [Role; 4] = [Role::Shop, Role::Retailer, Role::Wholesaler, Role::Factory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Shop => "Shop",
            Role::Retailer => "Retailer",
            Role::Wholesaler => "Wholesaler",
            Role::Factory => "Factory",
        }
    }

    fn slot(self) -> usize {
        match self {
            Role::Shop => 0,
            Role::Retailer => 1,
            Role::Wholesaler => 2,
            Role::Factory => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shop" => Ok(Role::Shop),
            "Retailer" => Ok(Role::Retailer),
            "Wholesaler" => Ok(Role::Wholesaler),
            "Factory" => Ok(Role::Factory),
            other => Err(GameError::InvalidRole(other.to_string())),
        }
    }
}

/// Lifecycle of an order. Only `Pending` and `Delivered` occur during play;
/// the remaining states are reserved for cancellation and partial-shipment
/// flows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

/// Lifecycle of a game run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Playing,
    Finished,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Playing => "playing",
            GameStatus::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Customer demand shape tagged on a game at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandPattern {
    SineWave,
    Step,
    Random,
    Constant,
}

impl DemandPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemandPattern::SineWave => "sine_wave",
            DemandPattern::Step => "step",
            DemandPattern::Random => "random",
            DemandPattern::Constant => "constant",
        }
    }
}

impl fmt::Display for DemandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemandPattern {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine_wave" => Ok(DemandPattern::SineWave),
            "step" => Ok(DemandPattern::Step),
            "random" => Ok(DemandPattern::Random),
            "constant" => Ok(DemandPattern::Constant),
            other => Err(GameError::InvalidDemandPattern(other.to_string())),
        }
    }
}

/// How weekly unmet demand feeds the backorder figure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogPolicy {
    /// Backorder reflects only the current week's unmet demand.
    #[default]
    Replace,
    /// Unmet demand carries forward; a fully served week clears the backlog.
    Accumulate,
}

/// Per-game configuration fixed at creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub chain_count: u32,
    /// Week limit; the game finishes once the week counter reaches it.
    pub weeks: u32,
    pub demand_pattern: DemandPattern,
    pub initial_inventory: u32,
    pub holding_cost_per_unit: f64,
    pub stockout_cost_per_unit: f64,
    pub backlog_policy: BacklogPolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            chain_count: 1,
            weeks: 52,
            demand_pattern: DemandPattern::SineWave,
            initial_inventory: 100,
            holding_cost_per_unit: 0.5,
            stockout_cost_per_unit: 2.0,
            backlog_policy: BacklogPolicy::Replace,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), GameError> {
        if self.chain_count < 1 {
            return Err(GameError::InvalidArgument(
                "chain_count must be at least 1".to_string(),
            ));
        }
        if self.weeks < 1 {
            return Err(GameError::InvalidArgument(
                "weeks must be at least 1".to_string(),
            ));
        }
        if !(self.holding_cost_per_unit.is_finite() && self.holding_cost_per_unit >= 0.0) {
            return Err(GameError::InvalidArgument(
                "holding_cost_per_unit must be finite and non-negative".to_string(),
            ));
        }
        if !(self.stockout_cost_per_unit.is_finite() && self.stockout_cost_per_unit >= 0.0) {
            return Err(GameError::InvalidArgument(
                "stockout_cost_per_unit must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors surfaced at the engine boundary.
#[derive(Debug, Error, PartialEq)]
pub enum GameError {
    #[error("game {0} not found")]
    GameNotFound(GameId),
    #[error("chain {0} not found")]
    ChainNotFound(ChainKey),
    #[error("no {role} node in chain {chain}")]
    NodeNotFound { chain: ChainKey, role: Role },
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("invalid demand pattern: {0}")]
    InvalidDemandPattern(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{role} slot in chain {chain} is already taken")]
    RoleOccupied { chain: ChainKey, role: Role },
    #[error("game {0} is finished")]
    GameFinished(GameId),
    #[error("inventory overflow for {role} in chain {chain}")]
    QuantityOverflow { chain: ChainKey, role: Role },
}

/// A game run: configuration, week counter, and lifecycle status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub config: GameConfig,
    pub current_week: u32,
    pub status: GameStatus,
    pub started_at: DateTime<Utc>,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        Self {
            id: GameId::new(),
            config,
            current_week: 0,
            status: GameStatus::Waiting,
            started_at: Utc::now(),
        }
    }
}

/// One role's mutable state within a chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub role: Role,
    pub player_id: PlayerId,
    pub player_name: String,
    pub inventory: u32,
    pub backorder: u32,
    /// Last quantity this role requested upstream. Observability only; a
    /// placed order never debits the sender's inventory.
    pub current_order: u32,
    /// Last quantity requested of this role. A single overwritten scalar,
    /// not a queue.
    pub incoming_order: u32,
    /// Cumulative holding + stockout cost. Never decreases.
    pub total_cost: f64,
    orders_history: VecDeque<u32>,
    inventory_history: VecDeque<u32>,
}

impl Node {
    pub fn new(
        role: Role,
        player_id: PlayerId,
        player_name: impl Into<String>,
        initial_inventory: u32,
    ) -> Self {
        Self {
            role,
            player_id,
            player_name: player_name.into(),
            inventory: initial_inventory,
            backorder: 0,
            current_order: 0,
            incoming_order: 0,
            total_cost: 0.0,
            orders_history: VecDeque::new(),
            inventory_history: VecDeque::new(),
        }
    }

    /// Append this week's order and inventory figures, dropping entries older
    /// than the 52-week window.
    pub fn record_history(&mut self) {
        self.orders_history.push_back(self.current_order);
        self.inventory_history.push_back(self.inventory);
        while self.orders_history.len() > HISTORY_WEEKS {
            self.orders_history.pop_front();
        }
        while self.inventory_history.len() > HISTORY_WEEKS {
            self.inventory_history.pop_front();
        }
    }

    pub fn orders_history(&self) -> &VecDeque<u32> {
        &self.orders_history
    }

    pub fn inventory_history(&self) -> &VecDeque<u32> {
        &self.inventory_history
    }
}

/// Four role slots plus the chain's week counter. At most one node per role.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupplyChain {
    pub key: ChainKey,
    nodes: [Option<Node>; 4],
    pub current_week: u32,
    pub created_at: DateTime<Utc>,
}

impl SupplyChain {
    pub fn new(key: ChainKey) -> Self {
        Self {
            key,
            nodes: [None, None, None, None],
            current_week: 0,
            created_at: Utc::now(),
        }
    }

    pub fn node(&self, role: Role) -> Option<&Node> {
        self.nodes[role.slot()].as_ref()
    }

    pub fn node_mut(&mut self, role: Role) -> Option<&mut Node> {
        self.nodes[role.slot()].as_mut()
    }

    /// Bind `node` to its role slot. An occupied slot is rejected and left
    /// untouched.
    pub fn occupy(&mut self, node: Node) -> Result<(), GameError> {
        let slot = &mut self.nodes[node.role.slot()];
        if slot.is_some() {
            return Err(GameError::RoleOccupied {
                chain: self.key,
                role: node.role,
            });
        }
        *slot = Some(node);
        Ok(())
    }

    /// Present nodes in fixed processing order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(|n| n.as_ref())
    }

    /// Sum of the present nodes' cumulative costs, recomputed on every call.
    pub fn total_cost(&self) -> f64 {
        self.nodes().map(|n| n.total_cost).sum()
    }
}

/// An order travelling through a chain with a fixed lead time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub chain: ChainKey,
    pub from_role: Role,
    pub to_role: Role,
    pub quantity: u32,
    pub status: OrderStatus,
    pub created_week: u32,
    pub delivery_week: u32,
    pub actual_delivery_week: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        chain: ChainKey,
        from_role: Role,
        to_role: Role,
        quantity: u32,
        created_week: u32,
    ) -> Self {
        Self {
            id: OrderId::new(),
            chain,
            from_role,
            to_role,
            quantity,
            status: OrderStatus::Pending,
            created_week,
            delivery_week: created_week + LEAD_TIME_WEEKS,
            actual_delivery_week: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the order missed its scheduled delivery week.
    pub fn is_delayed(&self, current_week: u32) -> bool {
        if self.status == OrderStatus::Delivered {
            return self.actual_delivery_week.unwrap_or(0) > self.delivery_week;
        }
        current_week > self.delivery_week
    }
}

/// Append-only per-chain order ledger with a delivery-week index.
///
/// Matching semantics: all orders due for a `(role, week)` pair deliver in
/// full, simultaneously, exactly once. The index only speeds the lookup up.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrderLedger {
    orders: Vec<Order>,
    due: BTreeMap<u32, Vec<usize>>,
}

impl OrderLedger {
    /// Append an order; it becomes due at its `delivery_week`.
    pub fn place(&mut self, order: Order) -> OrderId {
        let id = order.id;
        self.due
            .entry(order.delivery_week)
            .or_default()
            .push(self.orders.len());
        self.orders.push(order);
        id
    }

    /// Mark every order due for `role` at `week` as delivered and return the
    /// summed quantity. Already-delivered orders are never re-matched.
    pub fn deliver_due(&mut self, role: Role, week: u32) -> u64 {
        let mut delivered = 0u64;
        if let Some(indices) = self.due.get(&week) {
            for &idx in indices {
                let order = &mut self.orders[idx];
                if order.to_role == role && order.status != OrderStatus::Delivered {
                    order.status = OrderStatus::Delivered;
                    order.actual_delivery_week = Some(week);
                    delivered += u64::from(order.quantity);
                }
            }
        }
        delivered
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Read-only view of one node, exposed through snapshots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub role: Role,
    pub player_id: PlayerId,
    pub player_name: String,
    pub inventory: u32,
    pub backorder: u32,
    pub current_order: u32,
    pub incoming_order: u32,
    pub total_cost: f64,
    pub orders_history: Vec<u32>,
    pub inventory_history: Vec<u32>,
}

impl From<&Node> for NodeSnapshot {
    fn from(node: &Node) -> Self {
        Self {
            role: node.role,
            player_id: node.player_id,
            player_name: node.player_name.clone(),
            inventory: node.inventory,
            backorder: node.backorder,
            current_order: node.current_order,
            incoming_order: node.incoming_order,
            total_cost: node.total_cost,
            orders_history: node.orders_history.iter().copied().collect(),
            inventory_history: node.inventory_history.iter().copied().collect(),
        }
    }
}

/// Read-only view of one chain with its recomputed cost total.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: ChainKey,
    pub shop: Option<NodeSnapshot>,
    pub retailer: Option<NodeSnapshot>,
    pub wholesaler: Option<NodeSnapshot>,
    pub factory: Option<NodeSnapshot>,
    pub current_week: u32,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
}

impl ChainSnapshot {
    pub fn node(&self, role: Role) -> Option<&NodeSnapshot> {
        match role {
            Role::Shop => self.shop.as_ref(),
            Role::Retailer => self.retailer.as_ref(),
            Role::Wholesaler => self.wholesaler.as_ref(),
            Role::Factory => self.factory.as_ref(),
        }
    }
}

impl From<&SupplyChain> for ChainSnapshot {
    fn from(chain: &SupplyChain) -> Self {
        let view = |role: Role| chain.node(role).map(NodeSnapshot::from);
        Self {
            chain: chain.key,
            shop: view(Role::Shop),
            retailer: view(Role::Retailer),
            wholesaler: view(Role::Wholesaler),
            factory: view(Role::Factory),
            current_week: chain.current_week,
            total_cost: chain.total_cost(),
            created_at: chain.created_at,
        }
    }
}

/// Read-only projection of a full game, safe to serialize and hand out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: GameId,
    pub status: GameStatus,
    pub current_week: u32,
    pub weeks: u32,
    pub demand_pattern: DemandPattern,
    pub chains: Vec<ChainSnapshot>,
}
