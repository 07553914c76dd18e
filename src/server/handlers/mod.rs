pub mod bots;
pub mod grid;
pub mod orders;
pub mod simulation;

use std::collections::HashMap;

use crate::error::AppError;
use crate::store::model::OrderStatus;
use crate::store::repository::{DeliveryRepository, OrderFilter};

/// Active-order count per bot, shared by the fleet-facing endpoints.
pub(crate) async fn active_counts(
    repo: &dyn DeliveryRepository,
) -> Result<HashMap<i64, u32>, AppError> {
    let active = repo
        .fetch_orders(&OrderFilter::by_statuses(&[
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
        ]))
        .await?;

    let mut counts = HashMap::new();
    for order in &active {
        if let Some(bot_id) = order.bot_id {
            *counts.entry(bot_id).or_insert(0u32) += 1;
        }
    }
    Ok(counts)
}
