use std::collections::HashMap;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sqlx::{Any, AnyPool, Row, Transaction};

use crate::store::model::{
    BlockedEdge, Bot, BotStatus, Node, Order, OrderStatus, OrderStatusEvent, Restaurant,
};
use crate::store::repository::{
    DeliveryRepository, NewBot, NewOrder, OrderFilter, TickChanges,
};

/// SQLx-backed implementation of DeliveryRepository.
/// Responsible only for persistence and row mapping; all scheduling logic
/// lives in the engine.
pub struct SqlxDeliveryRepository {
    pool: AnyPool,
}

impl SqlxDeliveryRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl DeliveryRepository for SqlxDeliveryRepository {
    async fn fetch_nodes(&self) -> anyhow::Result<Vec<Node>> {
        let rows = sqlx::query(
            r#"
SELECT id, x, y, is_delivery_point FROM nodes ORDER BY id;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_node).collect()
    }

    async fn fetch_node(&self, node_id: i64) -> anyhow::Result<Option<Node>> {
        let row = sqlx::query(
            r#"
SELECT id, x, y, is_delivery_point FROM nodes WHERE id = ?;
"#,
        )
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_node).transpose()
    }

    async fn fetch_restaurants(&self) -> anyhow::Result<Vec<Restaurant>> {
        let rows = sqlx::query(
            r#"
SELECT id, name, node_id FROM restaurants ORDER BY id;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Restaurant {
                id: r.get("id"),
                name: r.get("name"),
                node_id: r.get("node_id"),
            })
            .collect())
    }

    async fn fetch_restaurant(&self, restaurant_id: i64) -> anyhow::Result<Option<Restaurant>> {
        let row = sqlx::query(
            r#"
SELECT id, name, node_id FROM restaurants WHERE id = ?;
"#,
        )
        .bind(restaurant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Restaurant {
            id: r.get("id"),
            name: r.get("name"),
            node_id: r.get("node_id"),
        }))
    }

    async fn fetch_blocked_edges(&self) -> anyhow::Result<Vec<BlockedEdge>> {
        let rows = sqlx::query(
            r#"
SELECT id, from_node_id, to_node_id FROM blocked_edges ORDER BY id;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| BlockedEdge {
                id: r.get("id"),
                from_node_id: r.get("from_node_id"),
                to_node_id: r.get("to_node_id"),
            })
            .collect())
    }

    async fn fetch_bots(&self) -> anyhow::Result<Vec<Bot>> {
        let rows = sqlx::query(
            r#"
SELECT id, name, current_node_id, status, max_capacity FROM bots ORDER BY id;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for r in &rows {
            match row_to_bot(r) {
                Ok(b) => out.push(b),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the batch
                    tracing::warn!(error = %e, "skipping malformed bot row");
                }
            }
        }
        Ok(out)
    }

    async fn fetch_bot(&self, bot_id: i64) -> anyhow::Result<Option<Bot>> {
        let row = sqlx::query(
            r#"
SELECT id, name, current_node_id, status, max_capacity FROM bots WHERE id = ?;
"#,
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_bot).transpose()
    }

    async fn fetch_orders(&self, filter: &OrderFilter) -> anyhow::Result<Vec<Order>> {
        let mut sql = String::from(
            "SELECT id, restaurant_id, pickup_node_id, delivery_node_id, bot_id, status, \
             created_ms, assigned_ms, picked_up_ms, delivered_ms FROM orders",
        );

        let mut clauses = Vec::new();
        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; statuses.len()].join(", ");
            clauses.push(format!("status IN ({placeholders})"));
        }
        if filter.bot_id.is_some() {
            clauses.push("bot_id = ?".to_string());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        // Creation order doubles as id order; listing endpoints flip it.
        sql.push_str(if filter.newest_first {
            " ORDER BY id DESC"
        } else {
            " ORDER BY id ASC"
        });
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(statuses) = &filter.statuses {
            for s in statuses {
                query = query.bind(s.as_str());
            }
        }
        if let Some(bot_id) = filter.bot_id {
            query = query.bind(bot_id);
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut out = Vec::new();
        for r in &rows {
            match row_to_order(r) {
                Ok(o) => out.push(o),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed order row");
                }
            }
        }
        Ok(out)
    }

    async fn fetch_order(&self, order_id: i64) -> anyhow::Result<Option<Order>> {
        let row = sqlx::query(
            r#"
SELECT id, restaurant_id, pickup_node_id, delivery_node_id, bot_id, status,
       created_ms, assigned_ms, picked_up_ms, delivered_ms
FROM orders WHERE id = ?;
"#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn fetch_order_history(&self, order_id: i64) -> anyhow::Result<Vec<OrderStatusEvent>> {
        let rows = sqlx::query(
            r#"
SELECT id, order_id, old_status, new_status, changed_ms
FROM order_status_history
WHERE order_id = ?
ORDER BY changed_ms ASC, id ASC;
"#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect()
    }

    async fn count_orders_by_status(&self) -> anyhow::Result<HashMap<OrderStatus, u64>> {
        let rows = sqlx::query(
            r#"
SELECT status, COUNT(*) AS n FROM orders GROUP BY status;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::new();
        for r in rows {
            let raw: String = r.get("status");
            let status = parse_order_status(&raw)?;
            out.insert(status, i64_to_u64(r.get("n"))?);
        }
        Ok(out)
    }

    async fn insert_order(&self, new: NewOrder) -> anyhow::Result<Order> {
        let mut tx = self.pool.begin().await?;

        let order_id = next_id(&mut tx, "orders").await?;
        sqlx::query(
            r#"
INSERT INTO orders(id, restaurant_id, pickup_node_id, delivery_node_id, bot_id, status,
                   created_ms, assigned_ms, picked_up_ms, delivered_ms)
VALUES (?, ?, ?, ?, NULL, 'PENDING', ?, NULL, NULL, NULL);
"#,
        )
        .bind(order_id)
        .bind(new.restaurant_id)
        .bind(new.pickup_node_id)
        .bind(new.delivery_node_id)
        .bind(u64_to_i64(new.created_ms)?)
        .execute(&mut *tx)
        .await?;

        append_history(&mut tx, order_id, None, OrderStatus::Pending, new.created_ms).await?;

        tx.commit().await?;

        Ok(Order {
            id: order_id,
            restaurant_id: new.restaurant_id,
            pickup_node_id: new.pickup_node_id,
            delivery_node_id: new.delivery_node_id,
            bot_id: None,
            status: OrderStatus::Pending,
            created_ms: new.created_ms,
            assigned_ms: None,
            picked_up_ms: None,
            delivered_ms: None,
        })
    }

    async fn update_delivery_node(
        &self,
        order_id: i64,
        delivery_node_id: i64,
    ) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
UPDATE orders SET delivery_node_id = ? WHERE id = ? AND status = 'PENDING';
"#,
        )
        .bind(delivery_node_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() != 1 {
            return Err(anyhow!(
                "delivery-node update missed: order {order_id} is no longer PENDING"
            ));
        }
        Ok(())
    }

    async fn assign_order(
        &self,
        order_id: i64,
        bot_id: i64,
        now_ms: u64,
        mark_bot_moving: bool,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            r#"
UPDATE orders
SET status = 'ASSIGNED', bot_id = ?, assigned_ms = ?
WHERE id = ? AND status = 'PENDING';
"#,
        )
        .bind(bot_id)
        .bind(u64_to_i64(now_ms)?)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        if res.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(anyhow!("assignment missed: order {order_id} not PENDING"));
        }

        append_history(&mut tx, order_id, Some(OrderStatus::Pending), OrderStatus::Assigned, now_ms)
            .await?;

        if mark_bot_moving {
            sqlx::query(
                r#"
UPDATE bots SET status = 'MOVING' WHERE id = ? AND status = 'IDLE';
"#,
            )
            .bind(bot_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_order_status(
        &self,
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        apply_order_transition(&mut tx, order_id, from, to, None, now_ms).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cancel_order(
        &self,
        order_id: i64,
        from: OrderStatus,
        release_bot: Option<i64>,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        apply_order_transition(&mut tx, order_id, from, OrderStatus::Cancelled, None, now_ms)
            .await?;

        if let Some(bot_id) = release_bot {
            sqlx::query(
                r#"
UPDATE bots SET status = 'IDLE' WHERE id = ?;
"#,
            )
            .bind(bot_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn commit_tick(&self, changes: &TickChanges) -> anyhow::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for oc in &changes.orders {
            apply_order_transition(&mut tx, oc.order_id, oc.from, oc.to, oc.bot_id, oc.changed_ms)
                .await
                .with_context(|| format!("tick commit failed on order {}", oc.order_id))?;
        }

        for bc in &changes.bots {
            sqlx::query(
                r#"
UPDATE bots SET status = ?, current_node_id = ? WHERE id = ?;
"#,
            )
            .bind(bc.status.as_str())
            .bind(bc.current_node_id)
            .bind(bc.bot_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("tick commit failed on bot {}", bc.bot_id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn reset_world(&self, station_node_id: i64, now_ms: u64) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
SELECT id, status FROM orders
WHERE status IN ('PENDING', 'ASSIGNED', 'PICKED_UP')
ORDER BY id;
"#,
        )
        .fetch_all(&mut *tx)
        .await?;

        for r in rows {
            let order_id: i64 = r.get("id");
            let raw: String = r.get("status");
            let from = parse_order_status(&raw)?;
            apply_order_transition(&mut tx, order_id, from, OrderStatus::Cancelled, None, now_ms)
                .await?;
        }

        sqlx::query(
            r#"
UPDATE bots SET status = 'IDLE', current_node_id = ?;
"#,
        )
        .bind(station_node_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_world(
        &self,
        nodes: &[Node],
        restaurants: &[(String, i64)],
        blocked_edges: &[(i64, i64)],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for n in nodes {
            sqlx::query(
                r#"
INSERT INTO nodes(id, x, y, is_delivery_point) VALUES (?, ?, ?, ?);
"#,
            )
            .bind(n.id)
            .bind(n.x)
            .bind(n.y)
            .bind(if n.is_delivery_point { 1i64 } else { 0i64 })
            .execute(&mut *tx)
            .await?;
        }

        for (i, (name, node_id)) in restaurants.iter().enumerate() {
            sqlx::query(
                r#"
INSERT INTO restaurants(id, name, node_id) VALUES (?, ?, ?);
"#,
            )
            .bind((i + 1) as i64)
            .bind(name)
            .bind(node_id)
            .execute(&mut *tx)
            .await?;
        }

        for (i, &(from, to)) in blocked_edges.iter().enumerate() {
            sqlx::query(
                r#"
INSERT INTO blocked_edges(id, from_node_id, to_node_id) VALUES (?, ?, ?);
"#,
            )
            .bind((i + 1) as i64)
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_bots(&self, bots: &[NewBot]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for (i, b) in bots.iter().enumerate() {
            sqlx::query(
                r#"
INSERT INTO bots(id, name, current_node_id, status, max_capacity)
VALUES (?, ?, ?, 'IDLE', ?);
"#,
            )
            .bind((i + 1) as i64)
            .bind(&b.name)
            .bind(b.current_node_id)
            .bind(b.max_capacity as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Guarded transition + audit row, inside the caller's transaction.
/// The `WHERE status = from` clause turns lost races into hard errors
/// instead of silent double transitions.
async fn apply_order_transition(
    tx: &mut Transaction<'_, Any>,
    order_id: i64,
    from: OrderStatus,
    to: OrderStatus,
    bot_id: Option<i64>,
    now_ms: u64,
) -> anyhow::Result<()> {
    let stamp_col = match to {
        OrderStatus::Assigned => Some("assigned_ms"),
        OrderStatus::PickedUp => Some("picked_up_ms"),
        OrderStatus::Delivered => Some("delivered_ms"),
        OrderStatus::Pending | OrderStatus::Cancelled => None,
    };

    let mut sql = String::from("UPDATE orders SET status = ?");
    if let Some(col) = stamp_col {
        sql.push_str(&format!(", {col} = ?"));
    }
    if bot_id.is_some() {
        sql.push_str(", bot_id = ?");
    }
    sql.push_str(" WHERE id = ? AND status = ?;");

    let mut query = sqlx::query(&sql).bind(to.as_str());
    if stamp_col.is_some() {
        query = query.bind(u64_to_i64(now_ms)?);
    }
    if let Some(b) = bot_id {
        query = query.bind(b);
    }
    let res = query
        .bind(order_id)
        .bind(from.as_str())
        .execute(&mut **tx)
        .await?;

    if res.rows_affected() != 1 {
        return Err(anyhow!(
            "guarded transition missed: order {order_id} expected {} got something else",
            from.as_str()
        ));
    }

    append_history(tx, order_id, Some(from), to, now_ms).await
}

async fn append_history(
    tx: &mut Transaction<'_, Any>,
    order_id: i64,
    old_status: Option<OrderStatus>,
    new_status: OrderStatus,
    now_ms: u64,
) -> anyhow::Result<()> {
    let id = next_id(tx, "order_status_history").await?;
    sqlx::query(
        r#"
INSERT INTO order_status_history(id, order_id, old_status, new_status, changed_ms)
VALUES (?, ?, ?, ?, ?);
"#,
    )
    .bind(id)
    .bind(order_id)
    .bind(old_status.map(|s| s.as_str()))
    .bind(new_status.as_str())
    .bind(u64_to_i64(now_ms)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Portable id allocation. The engine is single-writer, so MAX+1 inside
/// the transaction cannot race with another allocator.
async fn next_id(tx: &mut Transaction<'_, Any>, table: &str) -> anyhow::Result<i64> {
    let sql = format!("SELECT COALESCE(MAX(id), 0) + 1 AS next_id FROM {table};");
    let row = sqlx::query(&sql).fetch_one(&mut **tx).await?;
    Ok(row.get("next_id"))
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_node(r: &sqlx::any::AnyRow) -> anyhow::Result<Node> {
    Ok(Node {
        id: r.get("id"),
        x: r.get("x"),
        y: r.get("y"),
        is_delivery_point: r.get::<i64, _>("is_delivery_point") != 0,
    })
}

fn row_to_bot(r: &sqlx::any::AnyRow) -> anyhow::Result<Bot> {
    let raw: String = r.get("status");
    let status =
        BotStatus::parse(&raw).ok_or_else(|| anyhow!("unknown bot status in store: {raw}"))?;

    Ok(Bot {
        id: r.get("id"),
        name: r.get("name"),
        current_node_id: r.get("current_node_id"),
        status,
        max_capacity: i64_to_u32(r.get("max_capacity"))?,
    })
}

fn row_to_order(r: &sqlx::any::AnyRow) -> anyhow::Result<Order> {
    let raw: String = r.get("status");
    Ok(Order {
        id: r.get("id"),
        restaurant_id: r.get("restaurant_id"),
        pickup_node_id: r.get("pickup_node_id"),
        delivery_node_id: r.get("delivery_node_id"),
        bot_id: r.get::<Option<i64>, _>("bot_id"),
        status: parse_order_status(&raw)?,
        created_ms: i64_to_u64(r.get("created_ms"))?,
        assigned_ms: opt_ms(r.get("assigned_ms"))?,
        picked_up_ms: opt_ms(r.get("picked_up_ms"))?,
        delivered_ms: opt_ms(r.get("delivered_ms"))?,
    })
}

fn row_to_history(r: &sqlx::any::AnyRow) -> anyhow::Result<OrderStatusEvent> {
    let old_raw: Option<String> = r.get("old_status");
    let new_raw: String = r.get("new_status");

    Ok(OrderStatusEvent {
        id: r.get("id"),
        order_id: r.get("order_id"),
        old_status: old_raw.as_deref().map(parse_order_status).transpose()?,
        new_status: parse_order_status(&new_raw)?,
        changed_ms: i64_to_u64(r.get("changed_ms"))?,
    })
}

fn parse_order_status(s: &str) -> anyhow::Result<OrderStatus> {
    OrderStatus::parse(s).ok_or_else(|| anyhow!("unknown order status in store: {s}"))
}

/* =========================
Numeric safety helpers
========================= */

fn opt_ms(v: Option<i64>) -> anyhow::Result<Option<u64>> {
    v.map(i64_to_u64).transpose()
}

fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    if v < 0 {
        return Err(anyhow!("negative i64 where u64 expected: {v}"));
    }
    Ok(v as u64)
}

fn i64_to_u32(v: i64) -> anyhow::Result<u32> {
    if v < 0 || v > u32::MAX as i64 {
        return Err(anyhow!("out of range for u32: {v}"));
    }
    Ok(v as u32)
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}
