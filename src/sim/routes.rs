//! Per-bot target selection and route computation.
//!
//! Pickups come before deliveries: as long as a bot has any ASSIGNED
//! order it heads for the nearest pickup; only once everything on board
//! is PICKED_UP does it head for the nearest delivery. A bot with no
//! active orders drifts back to the station. Routes are never re-planned
//! while non-empty; they only refresh after an arrival is processed or a
//! cancellation cleared them.

use crate::grid::Pathfinder;
use crate::sim::{BotTarget, TargetAction, TickState};
use crate::store::model::{BotStatus, OrderStatus};

pub(crate) fn plan_routes(state: &mut TickState, pathfinder: &Pathfinder, station_node_id: i64) {
    for bot_idx in 0..state.bots.len() {
        let bot_id = state.bots[bot_idx].id;
        if !matches!(
            state.bots[bot_idx].status,
            BotStatus::Idle | BotStatus::Moving
        ) {
            continue;
        }
        if state.routes.get(&bot_id).is_some_and(|r| !r.is_empty()) {
            continue;
        }

        let current_node = state.bots[bot_idx].current_node_id;

        let active: Vec<usize> = (0..state.orders.len())
            .filter(|&i| state.orders[i].bot_id == Some(bot_id) && state.orders[i].is_active())
            .collect();

        if active.is_empty() {
            if current_node == station_node_id {
                if state.bots[bot_idx].status == BotStatus::Moving {
                    state.transition_bot(bot_idx, BotStatus::Idle);
                }
                continue;
            }

            // Head home. The bot keeps MOVING even when the station is
            // unreachable; the next tick retries.
            if state.bots[bot_idx].status == BotStatus::Idle {
                state.transition_bot(bot_idx, BotStatus::Moving);
            }
            if let Some(path) = pathfinder.find_path(current_node, station_node_id) {
                state.routes.insert(bot_id, path[1..].to_vec());
                state.targets.insert(
                    bot_id,
                    BotTarget {
                        node_id: station_node_id,
                        action: TargetAction::Station,
                        order_id: None,
                    },
                );
            }
            continue;
        }

        let assigned: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&i| state.orders[i].status == OrderStatus::Assigned)
            .collect();

        let (candidates, action) = if assigned.is_empty() {
            (active, TargetAction::Deliver)
        } else {
            (assigned, TargetAction::Pickup)
        };

        // Nearest target; candidates are id-ascending and the comparison
        // strict, so ties fall to the lowest order id. Unreachable
        // targets rank last but still get picked when nothing better
        // exists, mirroring the "bot waits" failure mode.
        let mut best: Option<(usize, usize)> = None; // (distance, order index)
        for &order_idx in &candidates {
            let goal = target_node(state, order_idx, action);
            let distance = pathfinder
                .path_length(current_node, goal)
                .unwrap_or(usize::MAX);
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, order_idx));
            }
        }

        let Some((_, order_idx)) = best else { continue };
        let goal = target_node(state, order_idx, action);

        if let Some(path) = pathfinder.find_path(current_node, goal) {
            state.routes.insert(bot_id, path[1..].to_vec());
            state.targets.insert(
                bot_id,
                BotTarget {
                    node_id: goal,
                    action,
                    order_id: Some(state.orders[order_idx].id),
                },
            );
            if state.bots[bot_idx].status == BotStatus::Idle {
                state.transition_bot(bot_idx, BotStatus::Moving);
            }
        }
    }
}

fn target_node(state: &TickState, order_idx: usize, action: TargetAction) -> i64 {
    match action {
        TargetAction::Pickup => state.orders[order_idx].pickup_node_id,
        _ => state.orders[order_idx].delivery_node_id,
    }
}
