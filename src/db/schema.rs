use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Grid
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS nodes (
  id BIGINT PRIMARY KEY,
  x BIGINT NOT NULL,
  y BIGINT NOT NULL,
  is_delivery_point INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_coordinates ON nodes(x, y);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS restaurants (
  id BIGINT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  node_id BIGINT NOT NULL UNIQUE
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS blocked_edges (
  id BIGINT PRIMARY KEY,
  from_node_id BIGINT NOT NULL,
  to_node_id BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_blocked_edge_pair
           ON blocked_edges(from_node_id, to_node_id);"#,
    )
    .execute(pool)
    .await?;

    // Fleet
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS bots (
  id BIGINT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  current_node_id BIGINT NOT NULL,
  status TEXT NOT NULL,
  max_capacity BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Orders
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS orders (
  id BIGINT PRIMARY KEY,
  restaurant_id BIGINT NOT NULL,
  pickup_node_id BIGINT NOT NULL,
  delivery_node_id BIGINT NOT NULL,
  bot_id BIGINT,
  status TEXT NOT NULL,

  created_ms BIGINT NOT NULL,
  assigned_ms BIGINT,
  picked_up_ms BIGINT,
  delivered_ms BIGINT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_bot ON orders(bot_id);"#)
        .execute(pool)
        .await?;

    // Audit trail
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS order_status_history (
  id BIGINT PRIMARY KEY,
  order_id BIGINT NOT NULL,
  old_status TEXT,
  new_status TEXT NOT NULL,
  changed_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_history_order ON order_status_history(order_id);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
