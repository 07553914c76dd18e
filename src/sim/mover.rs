//! Movement and arrival handling.
//!
//! Every MOVING bot advances exactly one edge per tick. When its route
//! runs out at the target node, the arrival fires: all of the bot's
//! orders matching the target's *chosen action* at that node resolve in
//! one batch, so co-located pickups (or deliveries) cost no extra
//! travel. Orders of the other kind at the same node wait for the next
//! target selection.

use crate::sim::{TargetAction, TickState};
use crate::store::model::{BotStatus, OrderStatus};

pub(crate) struct MoveTotals {
    pub moved: u64,
    pub picked_up: u64,
    pub delivered: u64,
}

pub(crate) fn move_bots(state: &mut TickState) -> MoveTotals {
    let mut totals = MoveTotals {
        moved: 0,
        picked_up: 0,
        delivered: 0,
    };

    let moving: Vec<usize> = (0..state.bots.len())
        .filter(|&i| state.bots[i].status == BotStatus::Moving)
        .collect();

    for bot_idx in moving {
        let bot_id = state.bots[bot_idx].id;

        let next_node = state
            .routes
            .get_mut(&bot_id)
            .and_then(|route| (!route.is_empty()).then(|| route.remove(0)));

        let Some(next_node) = next_node else {
            // Freshly assigned with an uncomputable route, or already
            // standing on the target: no movement, just the arrival check.
            handle_arrival(state, bot_idx, &mut totals);
            continue;
        };

        state.bots[bot_idx].current_node_id = next_node;
        totals.moved += 1;

        if state.routes.get(&bot_id).is_some_and(|r| r.is_empty()) {
            handle_arrival(state, bot_idx, &mut totals);
        }
    }

    totals
}

fn handle_arrival(state: &mut TickState, bot_idx: usize, totals: &mut MoveTotals) {
    let bot_id = state.bots[bot_idx].id;

    let Some(target) = state.targets.get(&bot_id).copied() else {
        return;
    };
    if state.bots[bot_idx].current_node_id != target.node_id {
        return;
    }

    match target.action {
        TargetAction::Pickup => {
            let ready: Vec<usize> = (0..state.orders.len())
                .filter(|&i| {
                    let o = &state.orders[i];
                    o.bot_id == Some(bot_id)
                        && o.status == OrderStatus::Assigned
                        && o.pickup_node_id == target.node_id
                })
                .collect();

            for order_idx in ready {
                if state.transition_order(order_idx, OrderStatus::PickedUp) {
                    totals.picked_up += 1;
                }
            }
            state.transition_bot(bot_idx, BotStatus::PickingUp);
        }
        TargetAction::Deliver => {
            let ready: Vec<usize> = (0..state.orders.len())
                .filter(|&i| {
                    let o = &state.orders[i];
                    o.bot_id == Some(bot_id)
                        && o.status == OrderStatus::PickedUp
                        && o.delivery_node_id == target.node_id
                })
                .collect();

            for order_idx in ready {
                if state.transition_order(order_idx, OrderStatus::Delivered) {
                    totals.delivered += 1;
                }
            }
            state.transition_bot(bot_idx, BotStatus::Delivering);
        }
        TargetAction::Station => {
            state.transition_bot(bot_idx, BotStatus::Idle);
        }
    }

    // The bot re-targets next tick.
    state.targets.remove(&bot_id);
    state.routes.insert(bot_id, Vec::new());

    // Settle the transient arrival status.
    let desired = if state.active_order_count(bot_id) == 0 {
        BotStatus::Idle
    } else {
        BotStatus::Moving
    };
    if state.bots[bot_idx].status != desired {
        state.transition_bot(bot_idx, desired);
    }
}
