use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::store::model::{
    BlockedEdge, Bot, BotStatus, Node, Order, OrderStatus, OrderStatusEvent, Restaurant,
};

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    /// Restrict to these statuses; `None` means all.
    pub statuses: Option<Vec<OrderStatus>>,
    /// Restrict to orders assigned to this bot.
    pub bot_id: Option<i64>,
    /// Cap the result size (applied after ordering).
    pub limit: Option<usize>,
    /// Newest-first ordering for listing endpoints; the engine always
    /// reads oldest-first so assignment follows creation order.
    pub newest_first: bool,
}

impl OrderFilter {
    pub fn by_statuses(statuses: &[OrderStatus]) -> Self {
        Self {
            statuses: Some(statuses.to_vec()),
            ..Self::default()
        }
    }

    pub fn active_for_bot(bot_id: i64) -> Self {
        Self {
            statuses: Some(vec![OrderStatus::Assigned, OrderStatus::PickedUp]),
            bot_id: Some(bot_id),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewOrder {
    pub restaurant_id: i64,
    pub pickup_node_id: i64,
    pub delivery_node_id: i64,
    pub created_ms: u64,
}

#[derive(Clone, Debug)]
pub struct NewBot {
    pub name: String,
    pub current_node_id: i64,
    pub max_capacity: u32,
}

/// One order transition computed by a tick. An order may appear more than
/// once within the same tick (assigned at a restaurant the bot is already
/// standing on, then picked up by the arrival handler).
#[derive(Clone, Debug)]
pub struct OrderChange {
    pub order_id: i64,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Set when the transition binds the order to a bot (`to = ASSIGNED`).
    pub bot_id: Option<i64>,
    pub changed_ms: u64,
}

/// Final state of a bot touched by a tick; at most one entry per bot.
#[derive(Clone, Debug)]
pub struct BotChange {
    pub bot_id: i64,
    pub status: BotStatus,
    pub current_node_id: i64,
}

/// Every entity mutation of one tick, committed atomically. A failed
/// commit must leave no partial effects.
#[derive(Clone, Debug, Default)]
pub struct TickChanges {
    pub orders: Vec<OrderChange>,
    pub bots: Vec<BotChange>,
}

impl TickChanges {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.bots.is_empty()
    }
}

/// Persistence contract for the delivery world.
///
/// Every order-status write appends exactly one `order_status_history`
/// row in the same transaction, including the initial insert; the audit
/// trail is owned here, not in the engine.
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    // --- immutable world ---
    async fn fetch_nodes(&self) -> Result<Vec<Node>>;
    async fn fetch_node(&self, node_id: i64) -> Result<Option<Node>>;
    async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>>;
    async fn fetch_restaurant(&self, restaurant_id: i64) -> Result<Option<Restaurant>>;
    async fn fetch_blocked_edges(&self) -> Result<Vec<BlockedEdge>>;

    // --- fleet ---
    async fn fetch_bots(&self) -> Result<Vec<Bot>>;
    async fn fetch_bot(&self, bot_id: i64) -> Result<Option<Bot>>;

    // --- orders ---
    async fn fetch_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;
    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>>;
    async fn fetch_order_history(&self, order_id: i64) -> Result<Vec<OrderStatusEvent>>;
    async fn count_orders_by_status(&self) -> Result<HashMap<OrderStatus, u64>>;

    /// Persists a new PENDING order and its creation audit row.
    async fn insert_order(&self, new: NewOrder) -> Result<Order>;

    /// Delivery-node change; the caller guarantees the order is PENDING.
    async fn update_delivery_node(&self, order_id: i64, delivery_node_id: i64) -> Result<()>;

    /// Eager single-order assignment: order -> ASSIGNED with `bot_id` and
    /// `assigned_ms`, optionally flipping the bot IDLE -> MOVING. One
    /// transaction.
    async fn assign_order(
        &self,
        order_id: i64,
        bot_id: i64,
        now_ms: u64,
        mark_bot_moving: bool,
    ) -> Result<()>;

    /// Guarded status update (`WHERE status = from`); fails on a
    /// concurrent modification.
    async fn update_order_status(
        &self,
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
        now_ms: u64,
    ) -> Result<()>;

    /// Cancellation, optionally releasing a bot left with no active
    /// orders back to IDLE. One transaction.
    async fn cancel_order(
        &self,
        order_id: i64,
        from: OrderStatus,
        release_bot: Option<i64>,
        now_ms: u64,
    ) -> Result<()>;

    /// Applies all effects of one tick atomically.
    async fn commit_tick(&self, changes: &TickChanges) -> Result<()>;

    /// Cancels every non-terminal order and returns the whole fleet IDLE
    /// to the station node. One transaction.
    async fn reset_world(&self, station_node_id: i64, now_ms: u64) -> Result<()>;

    // --- bootstrap ---
    async fn insert_world(
        &self,
        nodes: &[Node],
        restaurants: &[(String, i64)],
        blocked_edges: &[(i64, i64)],
    ) -> Result<()>;

    async fn insert_bots(&self, bots: &[NewBot]) -> Result<()>;
}
