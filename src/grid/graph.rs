use std::collections::{HashMap, HashSet};

use crate::store::model::{BlockedEdge, Node};

/// Cardinal step offsets, in fixed expansion order so route shapes are
/// reproducible across runs.
const STEPS: [(i64, i64); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// In-memory view of the town grid: undirected, 4-connected, with a set of
/// permanently blocked street segments.
///
/// Built once at startup from the immutable node/edge tables and shared
/// read-only afterwards, so lookups never touch the store.
pub struct GridGraph {
    coords: HashMap<i64, (i64, i64)>,
    by_coord: HashMap<(i64, i64), i64>,
    // Both orientations of every blocked pair, so neighbor filtering is a
    // single set probe.
    blocked: HashSet<(i64, i64)>,
}

impl GridGraph {
    pub fn new(nodes: &[Node], blocked_edges: &[BlockedEdge]) -> Self {
        let mut coords = HashMap::with_capacity(nodes.len());
        let mut by_coord = HashMap::with_capacity(nodes.len());
        for n in nodes {
            coords.insert(n.id, (n.x, n.y));
            by_coord.insert((n.x, n.y), n.id);
        }

        let mut blocked = HashSet::with_capacity(blocked_edges.len() * 2);
        for e in blocked_edges {
            blocked.insert((e.from_node_id, e.to_node_id));
            blocked.insert((e.to_node_id, e.from_node_id));
        }

        Self {
            coords,
            by_coord,
            blocked,
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn contains(&self, node_id: i64) -> bool {
        self.coords.contains_key(&node_id)
    }

    pub fn coords(&self, node_id: i64) -> Option<(i64, i64)> {
        self.coords.get(&node_id).copied()
    }

    pub fn node_at(&self, x: i64, y: i64) -> Option<i64> {
        self.by_coord.get(&(x, y)).copied()
    }

    pub fn is_edge_blocked(&self, from: i64, to: i64) -> bool {
        self.blocked.contains(&(from, to))
    }

    /// Node ids reachable from `node_id` in one step: cardinal moves onto
    /// existing nodes whose connecting segment is not blocked.
    pub fn neighbors(&self, node_id: i64) -> Vec<i64> {
        let Some(&(x, y)) = self.coords.get(&node_id) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(4);
        for (dx, dy) in STEPS {
            if let Some(&neighbor) = self.by_coord.get(&(x + dx, y + dy)) {
                if !self.blocked.contains(&(node_id, neighbor)) {
                    out.push(neighbor);
                }
            }
        }
        out
    }

    /// Lowest node id, used as the station fallback when the configured
    /// station coordinates match no node.
    pub fn first_node(&self) -> Option<i64> {
        self.coords.keys().min().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mk_blocked_edge, mk_grid_nodes};

    #[test]
    fn neighbors_are_cardinal_and_exist() {
        // 3x3 grid, ids 0..9 row-major.
        let nodes = mk_grid_nodes(3, 3);
        let grid = GridGraph::new(&nodes, &[]);

        let center = grid.node_at(1, 1).unwrap();
        let mut n = grid.neighbors(center);
        n.sort();

        let mut expected = vec![
            grid.node_at(1, 0).unwrap(),
            grid.node_at(1, 2).unwrap(),
            grid.node_at(0, 1).unwrap(),
            grid.node_at(2, 1).unwrap(),
        ];
        expected.sort();
        assert_eq!(n, expected);
    }

    #[test]
    fn corner_has_two_neighbors() {
        let nodes = mk_grid_nodes(3, 3);
        let grid = GridGraph::new(&nodes, &[]);
        let corner = grid.node_at(0, 0).unwrap();
        assert_eq!(grid.neighbors(corner).len(), 2);
    }

    #[test]
    fn blocked_edge_filters_both_directions() {
        let nodes = mk_grid_nodes(3, 1);
        let grid_plain = GridGraph::new(&nodes, &[]);
        let a = grid_plain.node_at(0, 0).unwrap();
        let b = grid_plain.node_at(1, 0).unwrap();

        let grid = GridGraph::new(&nodes, &[mk_blocked_edge(a, b)]);

        assert!(!grid.neighbors(a).contains(&b));
        assert!(!grid.neighbors(b).contains(&a));
        assert!(grid.is_edge_blocked(a, b));
        assert!(grid.is_edge_blocked(b, a));
    }

    #[test]
    fn unknown_node_has_no_neighbors() {
        let nodes = mk_grid_nodes(2, 2);
        let grid = GridGraph::new(&nodes, &[]);
        assert!(grid.neighbors(9_999).is_empty());
        assert_eq!(grid.coords(9_999), None);
    }
}
