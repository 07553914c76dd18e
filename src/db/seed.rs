//! Idempotent bootstrap: town map from CSV, fleet from configuration.
//!
//! `sample_data.csv` carries one row per node (`id,x,y,delivery_point`)
//! plus one TRUE/FALSE column per restaurant; `blocked_paths.csv` carries
//! `from_id,to_id` pairs. Tables that already hold rows are skipped, so
//! restarts never duplicate the world.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::store::model::Node;
use crate::store::repository::{DeliveryRepository, NewBot};

#[derive(Debug, Default)]
pub struct SeedSummary {
    pub nodes_loaded: usize,
    pub restaurants_loaded: usize,
    pub blocked_edges_loaded: usize,
    pub bots_created: usize,
}

#[derive(Debug, Deserialize)]
struct BlockedRow {
    from_id: i64,
    to_id: i64,
}

pub async fn load_initial_data(
    repo: &dyn DeliveryRepository,
    cfg: &AppConfig,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    let existing = repo.fetch_nodes().await?;
    let nodes = if existing.is_empty() {
        let data_path = Path::new(&cfg.data_dir).join("sample_data.csv");
        let (nodes, restaurants) = read_town_map(&data_path)
            .with_context(|| format!("reading town map from {}", data_path.display()))?;

        let blocked_path = Path::new(&cfg.data_dir).join("blocked_paths.csv");
        let blocked = read_blocked_paths(&blocked_path)
            .with_context(|| format!("reading blocked paths from {}", blocked_path.display()))?;

        summary.nodes_loaded = nodes.len();
        summary.restaurants_loaded = restaurants.len();
        summary.blocked_edges_loaded = blocked.len();

        repo.insert_world(&nodes, &restaurants, &blocked).await?;
        info!(
            nodes = summary.nodes_loaded,
            restaurants = summary.restaurants_loaded,
            blocked_edges = summary.blocked_edges_loaded,
            "town map loaded"
        );
        nodes
    } else {
        info!(nodes = existing.len(), "town map already loaded");
        existing
    };

    if repo.fetch_bots().await?.is_empty() {
        let station = station_node(&nodes, cfg);
        let bots: Vec<NewBot> = (1..=cfg.total_bots)
            .map(|i| NewBot {
                name: format!("Bot-{i}"),
                current_node_id: station,
                max_capacity: cfg.bot_max_capacity,
            })
            .collect();

        summary.bots_created = bots.len();
        repo.insert_bots(&bots).await?;
        info!(bots = summary.bots_created, station_node = station, "fleet created");
    }

    Ok(summary)
}

/// Station node for freshly created bots; falls back to the lowest node id
/// when the configured coordinates match nothing.
fn station_node(nodes: &[Node], cfg: &AppConfig) -> i64 {
    nodes
        .iter()
        .find(|n| n.x == cfg.station_x && n.y == cfg.station_y)
        .map(|n| n.id)
        .unwrap_or_else(|| {
            warn!(
                x = cfg.station_x,
                y = cfg.station_y,
                "no node at station coordinates; using first node"
            );
            nodes.iter().map(|n| n.id).min().unwrap_or(0)
        })
}

/// Parses the node sheet. Columns beyond `id,x,y,delivery_point` are
/// treated as restaurant flags, preserving sheet order for stable ids.
fn read_town_map(path: &Path) -> Result<(Vec<Node>, Vec<(String, i64)>)> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    let fixed = ["id", "x", "y", "delivery_point"];
    let restaurant_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !fixed.contains(h))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let idx = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("missing column {name}"))
    };
    let (id_i, x_i, y_i, dp_i) = (idx("id")?, idx("x")?, idx("y")?, idx("delivery_point")?);

    let mut nodes = Vec::new();
    let mut restaurants = Vec::new();

    for record in reader.records() {
        let record = record?;
        let node_id: i64 = record[id_i].trim().parse()?;

        nodes.push(Node {
            id: node_id,
            x: record[x_i].trim().parse()?,
            y: record[y_i].trim().parse()?,
            is_delivery_point: flag(&record[dp_i]),
        });

        for (col, name) in &restaurant_cols {
            if record.get(*col).map(flag).unwrap_or(false) {
                restaurants.push((name.clone(), node_id));
            }
        }
    }

    Ok((nodes, restaurants))
}

fn read_blocked_paths(path: &Path) -> Result<Vec<(i64, i64)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for row in reader.deserialize() {
        let row: BlockedRow = row?;
        out.push((row.from_id, row.to_id));
    }
    Ok(out)
}

fn flag(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("gridbite_seed_{name}_{}", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn town_map_parses_nodes_and_restaurant_flags() {
        let path = write_temp(
            "map",
            "id,x,y,delivery_point,RAMEN,PIZZA\n\
             1,0,0,FALSE,TRUE,FALSE\n\
             2,1,0,TRUE,FALSE,FALSE\n\
             3,2,0,FALSE,FALSE,TRUE\n",
        );

        let (nodes, restaurants) = read_town_map(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(nodes.len(), 3);
        assert!(nodes[1].is_delivery_point);
        assert!(!nodes[0].is_delivery_point);
        assert_eq!(
            restaurants,
            vec![("RAMEN".to_string(), 1), ("PIZZA".to_string(), 3)]
        );
    }

    #[test]
    fn blocked_paths_parse() {
        let path = write_temp("blocked", "from_id,to_id\n1,2\n5,6\n");
        let edges = read_blocked_paths(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(edges, vec![(1, 2), (5, 6)]);
    }

    #[test]
    fn station_falls_back_to_first_node() {
        let nodes = vec![
            Node { id: 7, x: 0, y: 0, is_delivery_point: false },
            Node { id: 3, x: 1, y: 0, is_delivery_point: false },
        ];
        let mut cfg = crate::config::AppConfig::from_env();
        cfg.station_x = 99;
        cfg.station_y = 99;
        assert_eq!(station_node(&nodes, &cfg), 3);

        cfg.station_x = 1;
        cfg.station_y = 0;
        assert_eq!(station_node(&nodes, &cfg), 3);
    }
}
