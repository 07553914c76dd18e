pub mod assign;
pub mod engine;
pub mod mover;
pub mod routes;
pub mod throttle;

use std::collections::HashMap;

use serde::Serialize;

use crate::store::model::{Bot, BotStatus, Order, OrderStatus};
use crate::store::repository::{BotChange, OrderChange, TickChanges};

/// What a bot is currently heading for. Engine-local; cleared after the
/// arrival is processed or the target order is cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BotTarget {
    pub node_id: i64,
    pub action: TargetAction,
    pub order_id: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetAction {
    Pickup,
    Deliver,
    Station,
}

/// Per-tick counts returned by the step endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickOutcome {
    pub orders_assigned: u64,
    pub orders_picked_up: u64,
    pub orders_delivered: u64,
    pub bots_moved: u64,
}

/// Mutable working copy of the world for one tick.
///
/// The three phases (assign, plan, move/arrive) mutate this snapshot in
/// memory; nothing touches the store until the engine commits the
/// accumulated changes in a single transaction. Bots and orders are kept
/// sorted by id so every "first"/"nearest" choice is deterministic.
pub(crate) struct TickState {
    pub now_ms: u64,
    pub bots: Vec<Bot>,
    /// All non-terminal orders (PENDING, ASSIGNED, PICKED_UP), id ascending.
    pub orders: Vec<Order>,
    pub routes: HashMap<i64, Vec<i64>>,
    pub targets: HashMap<i64, BotTarget>,
    /// Order transitions in the order they happened.
    pub order_changes: Vec<OrderChange>,
    /// Restaurant ids admitted by the tick-window throttle, to be logged
    /// after a successful commit.
    pub admissions: Vec<i64>,
}

impl TickState {
    pub fn new(
        now_ms: u64,
        mut bots: Vec<Bot>,
        mut orders: Vec<Order>,
        routes: HashMap<i64, Vec<i64>>,
        targets: HashMap<i64, BotTarget>,
    ) -> Self {
        bots.sort_by_key(|b| b.id);
        orders.sort_by_key(|o| o.id);
        Self {
            now_ms,
            bots,
            orders,
            routes,
            targets,
            order_changes: Vec::new(),
            admissions: Vec::new(),
        }
    }

    pub fn active_order_count(&self, bot_id: i64) -> u32 {
        self.orders
            .iter()
            .filter(|o| o.bot_id == Some(bot_id) && o.is_active())
            .count() as u32
    }

    /// Table-checked order transition. On success the in-memory order is
    /// updated, stamped, and the change recorded for the commit. An
    /// illegal transition is a programmer error: it is reported and the
    /// entity skipped without poisoning the rest of the tick.
    pub fn transition_order(&mut self, order_idx: usize, to: OrderStatus) -> bool {
        let order = &mut self.orders[order_idx];
        let from = order.status;
        if !from.can_transition(to) {
            tracing::error!(
                order_id = order.id,
                from = from.as_str(),
                to = to.as_str(),
                "illegal order transition; skipping entity"
            );
            return false;
        }

        order.status = to;
        let mut change_bot = None;
        match to {
            OrderStatus::Assigned => {
                order.assigned_ms = Some(self.now_ms);
                change_bot = order.bot_id;
            }
            OrderStatus::PickedUp => order.picked_up_ms = Some(self.now_ms),
            OrderStatus::Delivered => order.delivered_ms = Some(self.now_ms),
            OrderStatus::Pending | OrderStatus::Cancelled => {}
        }

        self.order_changes.push(OrderChange {
            order_id: order.id,
            from,
            to,
            bot_id: change_bot,
            changed_ms: self.now_ms,
        });
        true
    }

    /// Table-checked bot transition; same report-and-skip contract.
    pub fn transition_bot(&mut self, bot_idx: usize, to: BotStatus) -> bool {
        let bot = &mut self.bots[bot_idx];
        if !bot.status.can_transition(to) {
            tracing::error!(
                bot_id = bot.id,
                from = bot.status.as_str(),
                to = to.as_str(),
                "illegal bot transition; skipping entity"
            );
            return false;
        }
        bot.status = to;
        true
    }

    /// Folds the phase effects into a commit payload. Bots are diffed
    /// against the pre-tick snapshot so each touched bot yields exactly
    /// one final-state row.
    pub fn changes_against(&self, original_bots: &[Bot]) -> TickChanges {
        let mut changes = TickChanges {
            orders: self.order_changes.clone(),
            bots: Vec::new(),
        };

        for bot in &self.bots {
            let unchanged = original_bots
                .iter()
                .find(|b| b.id == bot.id)
                .is_some_and(|b| {
                    b.status == bot.status && b.current_node_id == bot.current_node_id
                });
            if !unchanged {
                changes.bots.push(BotChange {
                    bot_id: bot.id,
                    status: bot.status,
                    current_node_id: bot.current_node_id,
                });
            }
        }

        changes
    }
}
