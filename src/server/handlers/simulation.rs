//! Simulation control and observation endpoints.

use axum::Json;
use axum::extract::State;

use crate::error::AppError;
use crate::server::AppState;
use crate::server::handlers::active_counts;
use crate::server::types::{
    BotPositionResponse, BotPositionsResponse, SimulationControlResponse,
    SimulationStatusResponse, TickResponse,
};
use crate::store::model::{BotStatus, OrderStatus};

pub async fn status(
    State(state): State<AppState>,
) -> Result<Json<SimulationStatusResponse>, AppError> {
    let overlay = state.engine.observe().await;
    let totals = state.repo.count_orders_by_status().await?;
    let bots = state.repo.fetch_bots().await?;

    let count = |s: OrderStatus| totals.get(&s).copied().unwrap_or(0);

    Ok(Json(SimulationStatusResponse {
        is_running: overlay.is_running,
        tick_count: overlay.tick_count,
        total_orders: totals.values().sum(),
        pending_orders: count(OrderStatus::Pending),
        assigned_orders: count(OrderStatus::Assigned),
        picked_up_orders: count(OrderStatus::PickedUp),
        delivered_orders: count(OrderStatus::Delivered),
        cancelled_orders: count(OrderStatus::Cancelled),
        active_bots: bots.iter().filter(|b| b.status != BotStatus::Idle).count() as u64,
    }))
}

pub async fn start(State(state): State<AppState>) -> Json<SimulationControlResponse> {
    let is_running = state.engine.start().await;
    Json(SimulationControlResponse {
        message: "Simulation started",
        is_running,
        tick_count: None,
    })
}

pub async fn stop(State(state): State<AppState>) -> Json<SimulationControlResponse> {
    let is_running = state.engine.stop().await;
    Json(SimulationControlResponse {
        message: "Simulation stopped",
        is_running,
        tick_count: None,
    })
}

pub async fn reset(
    State(state): State<AppState>,
) -> Result<Json<SimulationControlResponse>, AppError> {
    state.engine.reset().await?;
    Ok(Json(SimulationControlResponse {
        message: "Simulation reset",
        is_running: false,
        tick_count: Some(0),
    }))
}

pub async fn tick(State(state): State<AppState>) -> Result<Json<TickResponse>, AppError> {
    let outcome = state.engine.run_tick().await?;
    let overlay = state.engine.observe().await;

    Ok(Json(match outcome {
        Some(results) => TickResponse {
            message: "Tick processed",
            tick: overlay.tick_count,
            results: Some(results),
        },
        None => TickResponse {
            message: "Simulation is not running",
            tick: overlay.tick_count,
            results: None,
        },
    }))
}

pub async fn bot_positions(
    State(state): State<AppState>,
) -> Result<Json<BotPositionsResponse>, AppError> {
    let overlay = state.engine.observe().await;
    let bots = state.repo.fetch_bots().await?;
    let counts = active_counts(state.repo.as_ref()).await?;

    let positions = bots
        .iter()
        .map(|bot| {
            let coords = state.engine.grid().coords(bot.current_node_id);
            BotPositionResponse {
                id: bot.id,
                name: bot.name.clone(),
                status: bot.status,
                current_node_id: bot.current_node_id,
                x: coords.map(|c| c.0),
                y: coords.map(|c| c.1),
                route: overlay.routes.get(&bot.id).cloned().unwrap_or_default(),
                target: overlay.targets.get(&bot.id).copied(),
                active_orders: counts.get(&bot.id).copied().unwrap_or(0) as u64,
            }
        })
        .collect();

    Ok(Json(BotPositionsResponse {
        bots: positions,
        tick: overlay.tick_count,
    }))
}
