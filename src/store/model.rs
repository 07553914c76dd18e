use serde::{Deserialize, Serialize};

/// A point on the town grid. (x, y) is unique; immutable after bootstrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: i64,
    pub x: i64,
    pub y: i64,
    /// True for customer houses: the only legal delivery destinations.
    /// Restaurant nodes are never delivery points.
    pub is_delivery_point: bool,
}

/// Pickup location where bots collect food. References exactly one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub node_id: i64,
}

/// Impassable street segment. Unordered pair; both directions are blocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockedEdge {
    pub id: i64,
    pub from_node_id: i64,
    pub to_node_id: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotStatus {
    Idle,
    Moving,
    PickingUp,
    Delivering,
}

impl BotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BotStatus::Idle => "IDLE",
            BotStatus::Moving => "MOVING",
            BotStatus::PickingUp => "PICKING_UP",
            BotStatus::Delivering => "DELIVERING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(BotStatus::Idle),
            "MOVING" => Some(BotStatus::Moving),
            "PICKING_UP" => Some(BotStatus::PickingUp),
            "DELIVERING" => Some(BotStatus::Delivering),
            _ => None,
        }
    }

    /// Legal bot transitions. PICKING_UP and DELIVERING are transient
    /// arrival states that settle back to MOVING or IDLE within the same
    /// tick.
    pub fn can_transition(self, next: BotStatus) -> bool {
        use BotStatus::*;
        matches!(
            (self, next),
            (Idle, Moving)
                | (Moving, Idle)
                | (Moving, PickingUp)
                | (Moving, Delivering)
                | (PickingUp, Moving)
                | (PickingUp, Idle)
                | (Delivering, Moving)
                | (Delivering, Idle)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Assigned => "ASSIGNED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "ASSIGNED" => Some(OrderStatus::Assigned),
            "PICKED_UP" => Some(OrderStatus::PickedUp),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Legal order transitions:
    /// PENDING -> ASSIGNED -> PICKED_UP -> DELIVERED, with CANCELLED
    /// reachable from PENDING and ASSIGNED. DELIVERED and CANCELLED are
    /// terminal.
    pub fn can_transition(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Assigned, PickedUp)
                | (PickedUp, Delivered)
                | (Pending, Cancelled)
                | (Assigned, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Active orders count toward a bot's capacity.
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Assigned | OrderStatus::PickedUp)
    }
}

/// A delivery bot. Always occupies a node after bootstrap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub current_node_id: i64,
    pub status: BotStatus,
    pub max_capacity: u32,
}

impl Bot {
    /// A bot can take on another order while idle or already moving and
    /// strictly under its capacity.
    pub fn is_available(&self, active_orders: u32) -> bool {
        matches!(self.status, BotStatus::Idle | BotStatus::Moving)
            && active_orders < self.max_capacity
    }
}

/// A food delivery request.
///
/// `pickup_node_id` is denormalized from the restaurant at creation and
/// never changes; `delivery_node_id` is mutable only while PENDING.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: i64,
    pub restaurant_id: i64,
    pub pickup_node_id: i64,
    pub delivery_node_id: i64,
    pub bot_id: Option<i64>,
    pub status: OrderStatus,
    pub created_ms: u64,
    pub assigned_ms: Option<u64>,
    pub picked_up_ms: Option<u64>,
    pub delivered_ms: Option<u64>,
}

impl Order {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// One audit row per order status transition, including the initial
/// create (old_status = None). Written by the store, never by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderStatusEvent {
    pub id: i64,
    pub order_id: i64,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_ms: u64,
}
