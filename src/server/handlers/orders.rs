//! Order management endpoints.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use crate::error::AppError;
use crate::server::AppState;
use crate::server::types::{
    OrderCreateRequest, OrderHistoryResponse, OrderListQuery, OrderResponse, OrderUpdateRequest,
};
use crate::store::model::{Order, OrderStatus};
use crate::store::repository::OrderFilter;

/// Default page size for the listing endpoint.
const DEFAULT_LIST_LIMIT: usize = 100;

async fn with_names(state: &AppState, orders: &[Order]) -> Result<Vec<OrderResponse>, AppError> {
    let restaurants: HashMap<i64, String> = state
        .repo
        .fetch_restaurants()
        .await?
        .into_iter()
        .map(|r| (r.id, r.name))
        .collect();
    let bots: HashMap<i64, String> = state
        .repo
        .fetch_bots()
        .await?
        .into_iter()
        .map(|b| (b.id, b.name))
        .collect();

    Ok(orders
        .iter()
        .map(|o| {
            OrderResponse::from_order(
                o,
                restaurants.get(&o.restaurant_id).cloned(),
                o.bot_id.and_then(|b| bots.get(&b).cloned()),
            )
        })
        .collect())
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let statuses = match &query.status {
        Some(raw) => {
            let status = OrderStatus::parse(&raw.to_uppercase())
                .ok_or_else(|| AppError::InvalidInput(format!("invalid status: {raw}")))?;
            Some(vec![status])
        }
        None => None,
    };

    let orders = state
        .repo
        .fetch_orders(&OrderFilter {
            statuses,
            bot_id: None,
            limit: Some(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
            newest_first: true,
        })
        .await?;

    Ok(Json(with_names(&state, &orders).await?))
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<OrderCreateRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let order = state
        .engine
        .create_order(body.restaurant_id, body.delivery_node_id)
        .await?;

    let mut responses = with_names(&state, std::slice::from_ref(&order)).await?;
    let response = responses
        .pop()
        .ok_or_else(|| AppError::Store(anyhow::anyhow!("order response vanished")))?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .repo
        .fetch_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("order".into()))?;

    let mut responses = with_names(&state, std::slice::from_ref(&order)).await?;
    responses
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::Store(anyhow::anyhow!("order response vanished")))
}

pub async fn update_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(body): Json<OrderUpdateRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let status = match &body.status {
        Some(raw) => Some(
            OrderStatus::parse(&raw.to_uppercase())
                .ok_or_else(|| AppError::InvalidInput(format!("invalid status: {raw}")))?,
        ),
        None => None,
    };

    let order = state
        .engine
        .update_order(order_id, body.delivery_node_id, status)
        .await?;

    let mut responses = with_names(&state, std::slice::from_ref(&order)).await?;
    responses
        .pop()
        .map(Json)
        .ok_or_else(|| AppError::Store(anyhow::anyhow!("order response vanished")))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.engine.cancel_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn order_history(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Vec<OrderHistoryResponse>>, AppError> {
    state
        .repo
        .fetch_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("order".into()))?;

    let history = state.repo.fetch_order_history(order_id).await?;
    Ok(Json(history.iter().map(OrderHistoryResponse::from).collect()))
}
