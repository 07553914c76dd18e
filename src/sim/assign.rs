//! Assignment of orders to bots.
//!
//! Two entry points share the candidate rules (IDLE or MOVING, strictly
//! under capacity): the per-tick planner walks every PENDING order in
//! creation order and picks the *nearest* feasible bot, while the eager
//! path used on order creation picks the *least-loaded* bot and lets the
//! next tick refine routing.

use std::collections::HashMap;

use crate::grid::Pathfinder;
use crate::sim::TickState;
use crate::store::model::{Bot, BotStatus, OrderStatus};

/// Assigns PENDING orders for one tick.
///
/// `window_counts` holds the compacted tick-window admission counts per
/// restaurant; provisional admissions made here are added to it so one
/// restaurant cannot exceed the limit within a single tick. Capacity is
/// read back from the mutated snapshot, so assignments made earlier in
/// the loop count against a bot immediately.
pub(crate) fn assign_pending(
    state: &mut TickState,
    pathfinder: &Pathfinder,
    window_counts: &mut HashMap<i64, usize>,
    window_limit: usize,
) -> u64 {
    let pending: Vec<usize> = (0..state.orders.len())
        .filter(|&i| state.orders[i].status == OrderStatus::Pending)
        .collect();

    let mut assigned = 0u64;

    for order_idx in pending {
        let restaurant_id = state.orders[order_idx].restaurant_id;
        if window_counts.get(&restaurant_id).copied().unwrap_or(0) >= window_limit {
            continue;
        }

        let pickup_node = state.orders[order_idx].pickup_node_id;

        // Nearest feasible bot; bots are id-ascending and the comparison
        // is strict, so ties fall to the lowest id.
        let mut best: Option<(usize, usize)> = None; // (distance, bot index)
        for (bot_idx, bot) in state.bots.iter().enumerate() {
            if !bot.is_available(state.active_order_count(bot.id)) {
                continue;
            }
            let Some(distance) = pathfinder.path_length(bot.current_node_id, pickup_node) else {
                // Unreachable pairing: drop this candidate, never fail.
                continue;
            };
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, bot_idx));
            }
        }

        let Some((_, bot_idx)) = best else {
            continue; // stays PENDING until a future tick
        };

        let bot_id = state.bots[bot_idx].id;
        state.orders[order_idx].bot_id = Some(bot_id);
        if !state.transition_order(order_idx, OrderStatus::Assigned) {
            state.orders[order_idx].bot_id = None;
            continue;
        }

        if state.bots[bot_idx].status == BotStatus::Idle {
            state.transition_bot(bot_idx, BotStatus::Moving);
        }

        *window_counts.entry(restaurant_id).or_insert(0) += 1;
        state.admissions.push(restaurant_id);
        assigned += 1;
    }

    assigned
}

/// Candidate for the synchronous creation path. Least-loaded wins,
/// ties fall to the lowest bot id. Distance is deliberately ignored here:
/// creation has to return fast and fair, and the next tick's planner
/// routes properly.
pub fn eager_candidate(bots: &[Bot], active_counts: &HashMap<i64, u32>) -> Option<i64> {
    bots.iter()
        .filter(|b| b.is_available(active_counts.get(&b.id).copied().unwrap_or(0)))
        .min_by_key(|b| (active_counts.get(&b.id).copied().unwrap_or(0), b.id))
        .map(|b| b.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::mk_bot;

    #[test]
    fn eager_picks_least_loaded() {
        let bots = vec![
            mk_bot(1, 10, BotStatus::Moving),
            mk_bot(2, 11, BotStatus::Idle),
            mk_bot(3, 12, BotStatus::Idle),
        ];
        let counts = HashMap::from([(1, 2), (2, 1), (3, 2)]);
        assert_eq!(eager_candidate(&bots, &counts), Some(2));
    }

    #[test]
    fn eager_breaks_ties_by_lowest_id() {
        let bots = vec![
            mk_bot(4, 10, BotStatus::Idle),
            mk_bot(2, 11, BotStatus::Idle),
            mk_bot(9, 12, BotStatus::Moving),
        ];
        let counts = HashMap::new();
        assert_eq!(eager_candidate(&bots, &counts), Some(2));
    }

    #[test]
    fn eager_skips_full_and_busy_bots() {
        let mut full = mk_bot(1, 10, BotStatus::Idle);
        full.max_capacity = 1;
        let bots = vec![
            full,
            mk_bot(2, 11, BotStatus::PickingUp),
            mk_bot(3, 12, BotStatus::Delivering),
        ];
        let counts = HashMap::from([(1, 1)]);
        assert_eq!(eager_candidate(&bots, &counts), None);
    }
}
