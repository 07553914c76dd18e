//! Shared fixtures for inline tests: entity builders and an in-memory
//! repository that mirrors the store contract, including the guarded
//! transitions and the audit-trail ownership of the real store.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::store::model::{
    BlockedEdge, Bot, BotStatus, Node, Order, OrderStatus, OrderStatusEvent, Restaurant,
};
use crate::store::repository::{
    DeliveryRepository, NewBot, NewOrder, OrderFilter, TickChanges,
};

pub fn mk_grid_nodes(width: i64, height: i64) -> Vec<Node> {
    let mut nodes = Vec::new();
    for y in 0..height {
        for x in 0..width {
            nodes.push(Node {
                id: y * width + x + 1,
                x,
                y,
                is_delivery_point: false,
            });
        }
    }
    nodes
}

pub fn mark_delivery_at(nodes: &mut [Node], x: i64, y: i64) {
    for n in nodes.iter_mut() {
        if n.x == x && n.y == y {
            n.is_delivery_point = true;
        }
    }
}

pub fn mk_blocked_edge(from: i64, to: i64) -> BlockedEdge {
    BlockedEdge {
        id: 0,
        from_node_id: from,
        to_node_id: to,
    }
}

pub fn mk_bot(id: i64, node: i64, status: BotStatus) -> Bot {
    Bot {
        id,
        name: format!("Bot-{id}"),
        current_node_id: node,
        status,
        max_capacity: 3,
    }
}

#[derive(Default)]
struct MemoryState {
    nodes: Vec<Node>,
    restaurants: Vec<Restaurant>,
    blocked_edges: Vec<BlockedEdge>,
    bots: Vec<Bot>,
    orders: Vec<Order>,
    history: Vec<OrderStatusEvent>,
    fail_commits: bool,
}

impl MemoryState {
    fn append_history(&mut self, order_id: i64, old: Option<OrderStatus>, new: OrderStatus, now_ms: u64) {
        let id = self.history.len() as i64 + 1;
        self.history.push(OrderStatusEvent {
            id,
            order_id,
            old_status: old,
            new_status: new,
            changed_ms: now_ms,
        });
    }

    fn transition(
        &mut self,
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
        bot_id: Option<i64>,
        now_ms: u64,
    ) -> Result<()> {
        let order = self
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| anyhow!("order {order_id} missing"))?;
        if order.status != from {
            return Err(anyhow!(
                "guarded transition missed: order {order_id} expected {} got {}",
                from.as_str(),
                order.status.as_str()
            ));
        }
        order.status = to;
        match to {
            OrderStatus::Assigned => {
                order.assigned_ms = Some(now_ms);
                if bot_id.is_some() {
                    order.bot_id = bot_id;
                }
            }
            OrderStatus::PickedUp => order.picked_up_ms = Some(now_ms),
            OrderStatus::Delivered => order.delivered_ms = Some(now_ms),
            OrderStatus::Pending | OrderStatus::Cancelled => {}
        }
        self.append_history(order_id, Some(from), to, now_ms);
        Ok(())
    }
}

/// In-memory DeliveryRepository used throughout the inline tests.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_world(
        nodes: Vec<Node>,
        restaurants: Vec<(String, i64)>,
        blocked_edges: Vec<BlockedEdge>,
    ) -> Self {
        let repo = Self::new();
        {
            let mut st = repo.inner.lock();
            st.nodes = nodes;
            st.restaurants = restaurants
                .into_iter()
                .enumerate()
                .map(|(i, (name, node_id))| Restaurant {
                    id: i as i64 + 1,
                    name,
                    node_id,
                })
                .collect();
            st.blocked_edges = blocked_edges;
        }
        repo
    }

    pub fn add_bot(&self, bot: Bot) {
        self.inner.lock().bots.push(bot);
    }

    /// Makes every subsequent tick commit fail, for abort-path tests.
    pub fn fail_commits(&self, fail: bool) {
        self.inner.lock().fail_commits = fail;
    }

    pub fn history(&self) -> Vec<OrderStatusEvent> {
        self.inner.lock().history.clone()
    }
}

#[async_trait]
impl DeliveryRepository for MemoryRepository {
    async fn fetch_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.inner.lock().nodes.clone())
    }

    async fn fetch_node(&self, node_id: i64) -> Result<Option<Node>> {
        Ok(self.inner.lock().nodes.iter().find(|n| n.id == node_id).copied())
    }

    async fn fetch_restaurants(&self) -> Result<Vec<Restaurant>> {
        Ok(self.inner.lock().restaurants.clone())
    }

    async fn fetch_restaurant(&self, restaurant_id: i64) -> Result<Option<Restaurant>> {
        Ok(self
            .inner
            .lock()
            .restaurants
            .iter()
            .find(|r| r.id == restaurant_id)
            .cloned())
    }

    async fn fetch_blocked_edges(&self) -> Result<Vec<BlockedEdge>> {
        Ok(self.inner.lock().blocked_edges.clone())
    }

    async fn fetch_bots(&self) -> Result<Vec<Bot>> {
        let mut bots = self.inner.lock().bots.clone();
        bots.sort_by_key(|b| b.id);
        Ok(bots)
    }

    async fn fetch_bot(&self, bot_id: i64) -> Result<Option<Bot>> {
        Ok(self.inner.lock().bots.iter().find(|b| b.id == bot_id).cloned())
    }

    async fn fetch_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let st = self.inner.lock();
        let mut out: Vec<Order> = st
            .orders
            .iter()
            .filter(|o| {
                filter
                    .statuses
                    .as_ref()
                    .is_none_or(|s| s.contains(&o.status))
                    && filter.bot_id.is_none_or(|b| o.bot_id == Some(b))
            })
            .cloned()
            .collect();
        out.sort_by_key(|o| o.id);
        if filter.newest_first {
            out.reverse();
        }
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>> {
        Ok(self.inner.lock().orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn fetch_order_history(&self, order_id: i64) -> Result<Vec<OrderStatusEvent>> {
        let mut out: Vec<OrderStatusEvent> = self
            .inner
            .lock()
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect();
        out.sort_by_key(|h| (h.changed_ms, h.id));
        Ok(out)
    }

    async fn count_orders_by_status(&self) -> Result<HashMap<OrderStatus, u64>> {
        let st = self.inner.lock();
        let mut out = HashMap::new();
        for o in &st.orders {
            *out.entry(o.status).or_insert(0u64) += 1;
        }
        Ok(out)
    }

    async fn insert_order(&self, new: NewOrder) -> Result<Order> {
        let mut st = self.inner.lock();
        let id = st.orders.iter().map(|o| o.id).max().unwrap_or(0) + 1;
        let order = Order {
            id,
            restaurant_id: new.restaurant_id,
            pickup_node_id: new.pickup_node_id,
            delivery_node_id: new.delivery_node_id,
            bot_id: None,
            status: OrderStatus::Pending,
            created_ms: new.created_ms,
            assigned_ms: None,
            picked_up_ms: None,
            delivered_ms: None,
        };
        st.orders.push(order.clone());
        st.append_history(id, None, OrderStatus::Pending, new.created_ms);
        Ok(order)
    }

    async fn update_delivery_node(&self, order_id: i64, delivery_node_id: i64) -> Result<()> {
        let mut st = self.inner.lock();
        let order = st
            .orders
            .iter_mut()
            .find(|o| o.id == order_id && o.status == OrderStatus::Pending)
            .ok_or_else(|| anyhow!("order {order_id} is no longer PENDING"))?;
        order.delivery_node_id = delivery_node_id;
        Ok(())
    }

    async fn assign_order(
        &self,
        order_id: i64,
        bot_id: i64,
        now_ms: u64,
        mark_bot_moving: bool,
    ) -> Result<()> {
        let mut st = self.inner.lock();
        st.transition(
            order_id,
            OrderStatus::Pending,
            OrderStatus::Assigned,
            Some(bot_id),
            now_ms,
        )?;
        if mark_bot_moving {
            if let Some(bot) = st
                .bots
                .iter_mut()
                .find(|b| b.id == bot_id && b.status == BotStatus::Idle)
            {
                bot.status = BotStatus::Moving;
            }
        }
        Ok(())
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
        now_ms: u64,
    ) -> Result<()> {
        self.inner.lock().transition(order_id, from, to, None, now_ms)
    }

    async fn cancel_order(
        &self,
        order_id: i64,
        from: OrderStatus,
        release_bot: Option<i64>,
        now_ms: u64,
    ) -> Result<()> {
        let mut st = self.inner.lock();
        st.transition(order_id, from, OrderStatus::Cancelled, None, now_ms)?;
        if let Some(bot_id) = release_bot {
            if let Some(bot) = st.bots.iter_mut().find(|b| b.id == bot_id) {
                bot.status = BotStatus::Idle;
            }
        }
        Ok(())
    }

    async fn commit_tick(&self, changes: &TickChanges) -> Result<()> {
        let mut st = self.inner.lock();
        if st.fail_commits {
            return Err(anyhow!("injected commit failure"));
        }

        // Transactional contract: all or nothing.
        let saved_orders = st.orders.clone();
        let saved_bots = st.bots.clone();
        let saved_history = st.history.clone();

        let mut apply = || -> Result<()> {
            for oc in &changes.orders {
                st.transition(oc.order_id, oc.from, oc.to, oc.bot_id, oc.changed_ms)?;
            }
            for bc in &changes.bots {
                let bot = st
                    .bots
                    .iter_mut()
                    .find(|b| b.id == bc.bot_id)
                    .ok_or_else(|| anyhow!("bot {} missing", bc.bot_id))?;
                bot.status = bc.status;
                bot.current_node_id = bc.current_node_id;
            }
            Ok(())
        };

        if let Err(e) = apply() {
            st.orders = saved_orders;
            st.bots = saved_bots;
            st.history = saved_history;
            return Err(e);
        }
        Ok(())
    }

    async fn reset_world(&self, station_node_id: i64, now_ms: u64) -> Result<()> {
        let mut st = self.inner.lock();
        let active: Vec<(i64, OrderStatus)> = st
            .orders
            .iter()
            .filter(|o| !o.status.is_terminal())
            .map(|o| (o.id, o.status))
            .collect();
        for (id, from) in active {
            st.transition(id, from, OrderStatus::Cancelled, None, now_ms)?;
        }
        for bot in st.bots.iter_mut() {
            bot.status = BotStatus::Idle;
            bot.current_node_id = station_node_id;
        }
        Ok(())
    }

    async fn insert_world(
        &self,
        nodes: &[Node],
        restaurants: &[(String, i64)],
        blocked_edges: &[(i64, i64)],
    ) -> Result<()> {
        let mut st = self.inner.lock();
        st.nodes = nodes.to_vec();
        st.restaurants = restaurants
            .iter()
            .enumerate()
            .map(|(i, (name, node_id))| Restaurant {
                id: i as i64 + 1,
                name: name.clone(),
                node_id: *node_id,
            })
            .collect();
        st.blocked_edges = blocked_edges
            .iter()
            .enumerate()
            .map(|(i, &(from, to))| BlockedEdge {
                id: i as i64 + 1,
                from_node_id: from,
                to_node_id: to,
            })
            .collect();
        Ok(())
    }

    async fn insert_bots(&self, bots: &[NewBot]) -> Result<()> {
        let mut st = self.inner.lock();
        for (i, b) in bots.iter().enumerate() {
            st.bots.push(Bot {
                id: i as i64 + 1,
                name: b.name.clone(),
                current_node_id: b.current_node_id,
                status: BotStatus::Idle,
                max_capacity: b.max_capacity,
            });
        }
        Ok(())
    }
}
