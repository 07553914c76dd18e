//! Fleet endpoints: capacity and per-bot order views.

use axum::Json;
use axum::extract::{Path, State};

use crate::error::AppError;
use crate::server::AppState;
use crate::server::handlers::active_counts;
use crate::server::types::{BotResponse, OrderResponse};
use crate::store::repository::OrderFilter;

pub async fn list_bots(State(state): State<AppState>) -> Result<Json<Vec<BotResponse>>, AppError> {
    let bots = state.repo.fetch_bots().await?;
    let counts = active_counts(state.repo.as_ref()).await?;

    Ok(Json(
        bots.iter()
            .map(|b| {
                BotResponse::from_bot(
                    b,
                    state.engine.grid().coords(b.current_node_id),
                    counts.get(&b.id).copied().unwrap_or(0),
                )
            })
            .collect(),
    ))
}

pub async fn get_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<i64>,
) -> Result<Json<BotResponse>, AppError> {
    let bot = state
        .repo
        .fetch_bot(bot_id)
        .await?
        .ok_or_else(|| AppError::NotFound("bot".into()))?;

    let counts = active_counts(state.repo.as_ref()).await?;
    Ok(Json(BotResponse::from_bot(
        &bot,
        state.engine.grid().coords(bot.current_node_id),
        counts.get(&bot.id).copied().unwrap_or(0),
    )))
}

pub async fn bot_orders(
    State(state): State<AppState>,
    Path(bot_id): Path<i64>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    state
        .repo
        .fetch_bot(bot_id)
        .await?
        .ok_or_else(|| AppError::NotFound("bot".into()))?;

    let orders = state
        .repo
        .fetch_orders(&OrderFilter::active_for_bot(bot_id))
        .await?;

    let restaurants: std::collections::HashMap<i64, String> = state
        .repo
        .fetch_restaurants()
        .await?
        .into_iter()
        .map(|r| (r.id, r.name))
        .collect();

    Ok(Json(
        orders
            .iter()
            .map(|o| {
                OrderResponse::from_order(o, restaurants.get(&o.restaurant_id).cloned(), None)
            })
            .collect(),
    ))
}
