//! Tick orchestration for the delivery simulation.
//!
//! Responsibilities:
//! - Serialize every mutation of the world behind one writer lock: ticks,
//!   order creation, cancellation, forced updates, and reset.
//! - Drive the per-tick pipeline: assign pending orders, plan routes,
//!   move bots and fire arrivals.
//! - Commit all entity effects of a tick in a single store transaction;
//!   an aborted commit leaves the tick counter, throttle logs, and
//!   route/target maps untouched.
//!
//! Non-responsibilities:
//! - Persistence details and the audit trail (repository layer).
//! - HTTP concerns (server layer).
//!
//! Engine-local state (routes, targets, throttle logs, tick counter) is
//! deliberately not durable: routes are derivable from the store at any
//! time, so restart semantics are "replan on the next tick".

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{field, info, instrument, warn};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::grid::{GridGraph, Pathfinder};
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::sim::throttle::SlidingWindow;
use crate::sim::{BotTarget, TickOutcome, TickState, assign, mover, routes};
use crate::store::model::{BotStatus, Order, OrderStatus};
use crate::store::repository::{DeliveryRepository, NewOrder, OrderFilter};
use crate::time::now_ms;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub station_x: i64,
    pub station_y: i64,
    /// Max orders per restaurant per window; shared by both window kinds.
    pub restaurant_order_limit: usize,
    /// Window size for the in-tick planner, in ticks.
    pub restaurant_window_ticks: u64,
    /// Window size for the creation path, in milliseconds.
    pub restaurant_window_ms: u64,
}

impl EngineConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        Self {
            station_x: cfg.station_x,
            station_y: cfg.station_y,
            restaurant_order_limit: cfg.restaurant_order_limit,
            restaurant_window_ticks: cfg.restaurant_window_ticks,
            restaurant_window_ms: cfg.restaurant_window_secs * 1_000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            station_x: 4,
            station_y: 3,
            restaurant_order_limit: 3,
            restaurant_window_ticks: 30,
            restaurant_window_ms: 30_000,
        }
    }
}

/// Read-only view of the engine-local state for observation endpoints.
#[derive(Clone, Debug)]
pub struct EngineOverlay {
    pub is_running: bool,
    pub tick_count: u64,
    pub routes: HashMap<i64, Vec<i64>>,
    pub targets: HashMap<i64, BotTarget>,
}

struct EngineState {
    is_running: bool,
    tick_count: u64,
    routes: HashMap<i64, Vec<i64>>,
    targets: HashMap<i64, BotTarget>,
    /// Tick-window admission log for the in-tick planner.
    tick_window: SlidingWindow,
    /// Wall-clock admission log for the creation path.
    wall_window: SlidingWindow,
}

pub struct SimulationEngine {
    repo: Arc<dyn DeliveryRepository>,
    pathfinder: Pathfinder,
    station_node_id: i64,
    order_limit: usize,
    counters: Counters,
    /// Writer lock: exactly one tick or mutating request at a time.
    inner: Mutex<EngineState>,
}

impl SimulationEngine {
    /// Loads the immutable grid from the store and builds the engine.
    pub async fn bootstrap(
        repo: Arc<dyn DeliveryRepository>,
        cfg: EngineConfig,
        counters: Counters,
    ) -> Result<Self, AppError> {
        let nodes = repo.fetch_nodes().await?;
        let blocked = repo.fetch_blocked_edges().await?;
        let grid = Arc::new(GridGraph::new(&nodes, &blocked));

        let station_node_id = match grid.node_at(cfg.station_x, cfg.station_y) {
            Some(id) => id,
            None => {
                warn!(
                    x = cfg.station_x,
                    y = cfg.station_y,
                    "no node at station coordinates; using first node"
                );
                grid.first_node().ok_or_else(|| {
                    AppError::InvalidInput("cannot run a simulation on an empty grid".into())
                })?
            }
        };

        Ok(Self {
            repo,
            pathfinder: Pathfinder::new(grid),
            station_node_id,
            order_limit: cfg.restaurant_order_limit,
            counters,
            inner: Mutex::new(EngineState {
                is_running: false,
                tick_count: 0,
                routes: HashMap::new(),
                targets: HashMap::new(),
                tick_window: SlidingWindow::new(
                    cfg.restaurant_order_limit,
                    cfg.restaurant_window_ticks,
                ),
                wall_window: SlidingWindow::new(
                    cfg.restaurant_order_limit,
                    cfg.restaurant_window_ms,
                ),
            }),
        })
    }

    pub fn station_node_id(&self) -> i64 {
        self.station_node_id
    }

    pub fn grid(&self) -> &GridGraph {
        self.pathfinder.grid()
    }

    pub async fn start(&self) -> bool {
        let mut st = self.inner.lock().await;
        st.is_running = true;
        st.is_running
    }

    pub async fn stop(&self) -> bool {
        let mut st = self.inner.lock().await;
        st.is_running = false;
        st.is_running
    }

    pub async fn observe(&self) -> EngineOverlay {
        let st = self.inner.lock().await;
        EngineOverlay {
            is_running: st.is_running,
            tick_count: st.tick_count,
            routes: st.routes.clone(),
            targets: st.targets.clone(),
        }
    }

    /// Runs one tick if the simulation is running; `None` otherwise.
    ///
    /// Flow:
    /// 1) Snapshot bots and non-terminal orders.
    /// 2) Pure phases on the snapshot: assign -> plan -> move/arrive.
    /// 3) Commit every effect in one transaction.
    /// 4) Only then advance the tick counter, admission log, and
    ///    route/target maps.
    #[instrument(skip(self), target = "engine", fields(tick = field::Empty))]
    pub async fn run_tick(&self) -> Result<Option<TickOutcome>, AppError> {
        let mut st = self.inner.lock().await;
        if !st.is_running {
            return Ok(None);
        }

        let now = now_ms();
        let next_tick = st.tick_count + 1;
        tracing::Span::current().record("tick", next_tick);

        let bots = self.repo.fetch_bots().await?;
        let orders = self
            .repo
            .fetch_orders(&OrderFilter::by_statuses(&[
                OrderStatus::Pending,
                OrderStatus::Assigned,
                OrderStatus::PickedUp,
            ]))
            .await?;

        let original_bots = bots.clone();
        let mut state = TickState::new(now, bots, orders, st.routes.clone(), st.targets.clone());

        let mut window_counts = st.tick_window.counts(next_tick);
        let orders_assigned = assign::assign_pending(
            &mut state,
            &self.pathfinder,
            &mut window_counts,
            self.order_limit,
        );
        routes::plan_routes(&mut state, &self.pathfinder, self.station_node_id);
        let totals = mover::move_bots(&mut state);

        let changes = state.changes_against(&original_bots);
        let commit = warn_if_slow("commit_tick", Duration::from_millis(100), async {
            self.repo.commit_tick(&changes).await
        })
        .await;

        if let Err(e) = commit {
            self.counters.ticks_aborted.fetch_add(1, Ordering::Relaxed);
            // Partial effects rolled back by the transaction; the counter
            // stays put so the aborted tick never happened.
            return Err(AppError::Store(e));
        }

        st.tick_count = next_tick;
        for restaurant_id in &state.admissions {
            st.tick_window.record(*restaurant_id, next_tick);
        }
        st.routes = state.routes;
        st.targets = state.targets;

        self.counters.ticks.fetch_add(1, Ordering::Relaxed);
        self.counters
            .orders_assigned
            .fetch_add(orders_assigned, Ordering::Relaxed);
        self.counters
            .orders_delivered
            .fetch_add(totals.delivered, Ordering::Relaxed);

        let outcome = TickOutcome {
            orders_assigned,
            orders_picked_up: totals.picked_up,
            orders_delivered: totals.delivered,
            bots_moved: totals.moved,
        };

        info!(
            tick = next_tick,
            assigned = outcome.orders_assigned,
            picked_up = outcome.orders_picked_up,
            delivered = outcome.orders_delivered,
            moved = outcome.bots_moved,
            "tick processed"
        );

        Ok(Some(outcome))
    }

    /// Stops the clock, cancels every non-terminal order, returns the
    /// fleet IDLE to the station, and wipes the engine-local state
    /// including both throttle logs.
    #[instrument(skip(self), target = "engine")]
    pub async fn reset(&self) -> Result<(), AppError> {
        let mut st = self.inner.lock().await;
        self.repo.reset_world(self.station_node_id, now_ms()).await?;

        st.is_running = false;
        st.tick_count = 0;
        st.routes.clear();
        st.targets.clear();
        st.tick_window.clear();
        st.wall_window.clear();

        info!("simulation reset");
        Ok(())
    }

    /// Creation path: validate, throttle on the wall-clock window,
    /// persist PENDING, then try the eager least-loaded assignment so the
    /// caller does not wait for the next tick.
    #[instrument(skip(self), target = "engine")]
    pub async fn create_order(
        &self,
        restaurant_id: i64,
        delivery_node_id: i64,
    ) -> Result<Order, AppError> {
        let mut st = self.inner.lock().await;
        let now = now_ms();

        let restaurant = self
            .repo
            .fetch_restaurant(restaurant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("restaurant".into()))?;

        if !st.wall_window.has_budget(restaurant_id, now) {
            let recent = st.wall_window.count(restaurant_id, now);
            self.counters
                .throttle_denied_wall
                .fetch_add(1, Ordering::Relaxed);
            return Err(AppError::ThrottleExceeded(format!(
                "restaurant '{}' has received {recent} orders in the current window; \
                 max {} allowed, please wait",
                restaurant.name, self.order_limit
            )));
        }

        let node = self
            .repo
            .fetch_node(delivery_node_id)
            .await?
            .ok_or_else(|| AppError::NotFound("delivery node".into()))?;
        if !node.is_delivery_point {
            return Err(AppError::InvalidInput(
                "selected node is not a valid delivery point".into(),
            ));
        }

        let order = self
            .repo
            .insert_order(NewOrder {
                restaurant_id,
                pickup_node_id: restaurant.node_id,
                delivery_node_id,
                created_ms: now,
            })
            .await?;
        st.wall_window.record(restaurant_id, now);
        self.counters.orders_created.fetch_add(1, Ordering::Relaxed);

        // Least-loaded bot takes it, if any has headroom.
        let bots = self.repo.fetch_bots().await?;
        let active = self
            .repo
            .fetch_orders(&OrderFilter::by_statuses(&[
                OrderStatus::Assigned,
                OrderStatus::PickedUp,
            ]))
            .await?;
        let mut counts: HashMap<i64, u32> = HashMap::new();
        for o in &active {
            if let Some(bot_id) = o.bot_id {
                *counts.entry(bot_id).or_insert(0) += 1;
            }
        }

        if let Some(bot_id) = assign::eager_candidate(&bots, &counts) {
            let mark_moving = bots
                .iter()
                .find(|b| b.id == bot_id)
                .is_some_and(|b| b.status == BotStatus::Idle);
            self.repo.assign_order(order.id, bot_id, now, mark_moving).await?;
            self.counters.orders_assigned.fetch_add(1, Ordering::Relaxed);

            let refreshed = self.repo.fetch_order(order.id).await?;
            return Ok(refreshed.unwrap_or(order));
        }

        // No bot has headroom; a future tick picks it up.
        Ok(order)
    }

    /// PUT path: delivery-node change while PENDING, and forced status
    /// transitions validated by the lifecycle table.
    #[instrument(skip(self), target = "engine")]
    pub async fn update_order(
        &self,
        order_id: i64,
        delivery_node_id: Option<i64>,
        status: Option<OrderStatus>,
    ) -> Result<Order, AppError> {
        let mut st = self.inner.lock().await;
        let now = now_ms();

        let order = self
            .repo
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("order".into()))?;

        if let Some(node_id) = delivery_node_id {
            if order.status != OrderStatus::Pending {
                return Err(AppError::IllegalTransition(format!(
                    "delivery node is only mutable while PENDING, order is {}",
                    order.status.as_str()
                )));
            }
            let node = self
                .repo
                .fetch_node(node_id)
                .await?
                .ok_or_else(|| AppError::NotFound("delivery node".into()))?;
            if !node.is_delivery_point {
                return Err(AppError::InvalidInput(
                    "selected node is not a valid delivery point".into(),
                ));
            }
            self.repo.update_delivery_node(order_id, node_id).await?;
        }

        if let Some(next) = status {
            let current = self
                .repo
                .fetch_order(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound("order".into()))?;

            if !current.status.can_transition(next) {
                return Err(AppError::IllegalTransition(format!(
                    "cannot move order from {} to {}",
                    current.status.as_str(),
                    next.as_str()
                )));
            }

            match next {
                OrderStatus::Cancelled => {
                    self.cancel_locked(&mut st, &current, now).await?;
                }
                OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::Delivered
                    if current.bot_id.is_none() =>
                {
                    return Err(AppError::InvalidInput(
                        "order has no assigned bot for this transition".into(),
                    ));
                }
                _ => {
                    self.repo
                        .update_order_status(order_id, current.status, next, now)
                        .await?;
                    // If the bot was heading for this order and the forced
                    // transition outran it, let the next tick replan.
                    if next == OrderStatus::Delivered {
                        if let Some(bot_id) = current.bot_id {
                            let targeted = st
                                .targets
                                .get(&bot_id)
                                .is_some_and(|t| t.order_id == Some(order_id));
                            if targeted {
                                st.routes.remove(&bot_id);
                                st.targets.remove(&bot_id);
                            }
                        }
                    }
                }
            }
        }

        self.repo
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("order".into()))
    }

    /// DELETE path: cancellation, legal only before pickup.
    #[instrument(skip(self), target = "engine")]
    pub async fn cancel_order(&self, order_id: i64) -> Result<(), AppError> {
        let mut st = self.inner.lock().await;
        let now = now_ms();

        let order = self
            .repo
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("order".into()))?;

        if !order.status.can_transition(OrderStatus::Cancelled) {
            return Err(AppError::IllegalTransition(format!(
                "cannot cancel order with status {}",
                order.status.as_str()
            )));
        }

        self.cancel_locked(&mut st, &order, now).await
    }

    /// Shared cancellation body; the caller holds the writer lock and has
    /// validated the transition.
    async fn cancel_locked(
        &self,
        st: &mut EngineState,
        order: &Order,
        now: u64,
    ) -> Result<(), AppError> {
        let release = match order.bot_id {
            Some(bot_id) => {
                let remaining = self
                    .repo
                    .fetch_orders(&OrderFilter::active_for_bot(bot_id))
                    .await?
                    .iter()
                    .filter(|o| o.id != order.id)
                    .count();
                (remaining == 0).then_some(bot_id)
            }
            None => None,
        };

        self.repo
            .cancel_order(order.id, order.status, release, now)
            .await?;
        self.counters.orders_cancelled.fetch_add(1, Ordering::Relaxed);

        if let Some(bot_id) = order.bot_id {
            let targeted = st
                .targets
                .get(&bot_id)
                .is_some_and(|t| t.order_id == Some(order.id));
            if release.is_some() || targeted {
                st.routes.remove(&bot_id);
                st.targets.remove(&bot_id);
            }
        }

        Ok(())
    }
}
