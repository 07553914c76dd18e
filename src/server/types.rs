//! Request and response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::sim::{BotTarget, TickOutcome};
use crate::store::model::{
    BlockedEdge, Bot, BotStatus, Node, Order, OrderStatus, OrderStatusEvent, Restaurant,
};

#[derive(Debug, Deserialize)]
pub struct OrderCreateRequest {
    pub restaurant_id: i64,
    pub delivery_node_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderUpdateRequest {
    pub delivery_node_id: Option<i64>,
    /// Forced status transition, validated by the lifecycle table.
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub restaurant_id: i64,
    pub restaurant_name: Option<String>,
    pub pickup_node_id: i64,
    pub delivery_node_id: i64,
    pub bot_id: Option<i64>,
    pub bot_name: Option<String>,
    pub status: OrderStatus,
    pub created_ms: u64,
    pub assigned_ms: Option<u64>,
    pub picked_up_ms: Option<u64>,
    pub delivered_ms: Option<u64>,
}

impl OrderResponse {
    pub fn from_order(
        order: &Order,
        restaurant_name: Option<String>,
        bot_name: Option<String>,
    ) -> Self {
        Self {
            id: order.id,
            restaurant_id: order.restaurant_id,
            restaurant_name,
            pickup_node_id: order.pickup_node_id,
            delivery_node_id: order.delivery_node_id,
            bot_id: order.bot_id,
            bot_name,
            status: order.status,
            created_ms: order.created_ms,
            assigned_ms: order.assigned_ms,
            picked_up_ms: order.picked_up_ms,
            delivered_ms: order.delivered_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderHistoryResponse {
    pub id: i64,
    pub order_id: i64,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_ms: u64,
}

impl From<&OrderStatusEvent> for OrderHistoryResponse {
    fn from(e: &OrderStatusEvent) -> Self {
        Self {
            id: e.id,
            order_id: e.order_id,
            old_status: e.old_status,
            new_status: e.new_status,
            changed_ms: e.changed_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationStatusResponse {
    pub is_running: bool,
    pub tick_count: u64,
    pub total_orders: u64,
    pub pending_orders: u64,
    pub assigned_orders: u64,
    pub picked_up_orders: u64,
    pub delivered_orders: u64,
    pub cancelled_orders: u64,
    pub active_bots: u64,
}

#[derive(Debug, Serialize)]
pub struct SimulationControlResponse {
    pub message: &'static str,
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_count: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TickResponse {
    pub message: &'static str,
    pub tick: u64,
    pub results: Option<TickOutcome>,
}

#[derive(Debug, Serialize)]
pub struct BotPositionResponse {
    pub id: i64,
    pub name: String,
    pub status: BotStatus,
    pub current_node_id: i64,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub route: Vec<i64>,
    pub target: Option<BotTarget>,
    pub active_orders: u64,
}

#[derive(Debug, Serialize)]
pub struct BotPositionsResponse {
    pub bots: Vec<BotPositionResponse>,
    pub tick: u64,
}

#[derive(Debug, Serialize)]
pub struct BotResponse {
    pub id: i64,
    pub name: String,
    pub status: BotStatus,
    pub current_node_id: i64,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub max_capacity: u32,
    pub current_order_count: u32,
    pub available_capacity: u32,
}

impl BotResponse {
    pub fn from_bot(bot: &Bot, coords: Option<(i64, i64)>, active_orders: u32) -> Self {
        Self {
            id: bot.id,
            name: bot.name.clone(),
            status: bot.status,
            current_node_id: bot.current_node_id,
            x: coords.map(|c| c.0),
            y: coords.map(|c| c.1),
            max_capacity: bot.max_capacity,
            current_order_count: active_orders,
            available_capacity: bot.max_capacity.saturating_sub(active_orders),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub id: i64,
    pub x: i64,
    pub y: i64,
    pub is_delivery_point: bool,
}

impl From<&Node> for NodeResponse {
    fn from(n: &Node) -> Self {
        Self {
            id: n.id,
            x: n.x,
            y: n.y,
            is_delivery_point: n.is_delivery_point,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RestaurantResponse {
    pub id: i64,
    pub name: String,
    pub node_id: i64,
    pub x: Option<i64>,
    pub y: Option<i64>,
}

impl RestaurantResponse {
    pub fn from_restaurant(r: &Restaurant, coords: Option<(i64, i64)>) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            node_id: r.node_id,
            x: coords.map(|c| c.0),
            y: coords.map(|c| c.1),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BlockedEdgeResponse {
    pub id: i64,
    pub from_node_id: i64,
    pub to_node_id: i64,
}

impl From<&BlockedEdge> for BlockedEdgeResponse {
    fn from(e: &BlockedEdge) -> Self {
        Self {
            id: e.id,
            from_node_id: e.from_node_id,
            to_node_id: e.to_node_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GridResponse {
    pub nodes: Vec<NodeResponse>,
    pub restaurants: Vec<RestaurantResponse>,
    pub delivery_points: Vec<NodeResponse>,
    pub blocked_edges: Vec<BlockedEdgeResponse>,
}
