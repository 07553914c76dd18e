//! Read-only grid endpoints for the map display.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};

use crate::error::AppError;
use crate::server::AppState;
use crate::server::types::{
    BlockedEdgeResponse, GridResponse, NodeResponse, RestaurantResponse,
};

pub async fn get_grid(State(state): State<AppState>) -> Result<Json<GridResponse>, AppError> {
    let nodes = state.repo.fetch_nodes().await?;
    let coords: HashMap<i64, (i64, i64)> = nodes.iter().map(|n| (n.id, (n.x, n.y))).collect();

    let restaurants = state
        .repo
        .fetch_restaurants()
        .await?
        .iter()
        .map(|r| RestaurantResponse::from_restaurant(r, coords.get(&r.node_id).copied()))
        .collect();

    let blocked_edges = state
        .repo
        .fetch_blocked_edges()
        .await?
        .iter()
        .map(BlockedEdgeResponse::from)
        .collect();

    let delivery_points = nodes
        .iter()
        .filter(|n| n.is_delivery_point)
        .map(NodeResponse::from)
        .collect();

    Ok(Json(GridResponse {
        nodes: nodes.iter().map(NodeResponse::from).collect(),
        restaurants,
        delivery_points,
        blocked_edges,
    }))
}

pub async fn list_nodes(State(state): State<AppState>) -> Result<Json<Vec<NodeResponse>>, AppError> {
    let nodes = state.repo.fetch_nodes().await?;
    Ok(Json(nodes.iter().map(NodeResponse::from).collect()))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(node_id): Path<i64>,
) -> Result<Json<NodeResponse>, AppError> {
    state
        .repo
        .fetch_node(node_id)
        .await?
        .map(|n| Json(NodeResponse::from(&n)))
        .ok_or_else(|| AppError::NotFound("node".into()))
}

pub async fn list_restaurants(
    State(state): State<AppState>,
) -> Result<Json<Vec<RestaurantResponse>>, AppError> {
    let nodes = state.repo.fetch_nodes().await?;
    let coords: HashMap<i64, (i64, i64)> = nodes.iter().map(|n| (n.id, (n.x, n.y))).collect();

    let restaurants = state
        .repo
        .fetch_restaurants()
        .await?
        .iter()
        .map(|r| RestaurantResponse::from_restaurant(r, coords.get(&r.node_id).copied()))
        .collect();
    Ok(Json(restaurants))
}

pub async fn list_delivery_points(
    State(state): State<AppState>,
) -> Result<Json<Vec<NodeResponse>>, AppError> {
    let nodes = state.repo.fetch_nodes().await?;
    Ok(Json(
        nodes
            .iter()
            .filter(|n| n.is_delivery_point)
            .map(NodeResponse::from)
            .collect(),
    ))
}

pub async fn list_blocked_edges(
    State(state): State<AppState>,
) -> Result<Json<Vec<BlockedEdgeResponse>>, AppError> {
    let edges = state.repo.fetch_blocked_edges().await?;
    Ok(Json(edges.iter().map(BlockedEdgeResponse::from).collect()))
}
