use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use crate::grid::graph::GridGraph;

/// Open-set entry. `BinaryHeap` is a max-heap, so comparisons are inverted:
/// the smallest f-score pops first, and `seq` (push order) breaks ties so
/// equal-f entries leave the heap FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f: i64,
    seq: u64,
    node: i64,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over the town grid with unit edge cost and Manhattan heuristic.
///
/// The heuristic is admissible and consistent on a 4-connected unit grid,
/// so the first goal pop is optimal. The grid is immutable, so the shared
/// snapshot never needs invalidation.
#[derive(Clone)]
pub struct Pathfinder {
    grid: Arc<GridGraph>,
}

impl Pathfinder {
    pub fn new(grid: Arc<GridGraph>) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &GridGraph {
        &self.grid
    }

    fn heuristic(&self, node: i64, goal: i64) -> Option<i64> {
        let (x1, y1) = self.grid.coords(node)?;
        let (x2, y2) = self.grid.coords(goal)?;
        Some((x1 - x2).abs() + (y1 - y2).abs())
    }

    /// Node-id sequence from `start` to `goal` inclusive, or `None` when
    /// the goal is unreachable or either endpoint is unknown.
    /// Returns `[start]` when start == goal.
    pub fn find_path(&self, start: i64, goal: i64) -> Option<Vec<i64>> {
        if !self.grid.contains(start) || !self.grid.contains(goal) {
            return None;
        }
        if start == goal {
            return Some(vec![start]);
        }

        let mut open = BinaryHeap::new();
        let mut came_from: HashMap<i64, i64> = HashMap::new();
        let mut g_score: HashMap<i64, i64> = HashMap::new();
        let mut closed: HashSet<i64> = HashSet::new();
        let mut seq = 0u64;

        g_score.insert(start, 0);
        open.push(OpenNode {
            f: self.heuristic(start, goal)?,
            seq,
            node: start,
        });

        while let Some(current) = open.pop() {
            if current.node == goal {
                return Some(reconstruct(&came_from, current.node));
            }

            if !closed.insert(current.node) {
                continue;
            }

            let current_g = g_score[&current.node];
            for neighbor in self.grid.neighbors(current.node) {
                if closed.contains(&neighbor) {
                    continue;
                }

                let tentative_g = current_g + 1;
                if g_score
                    .get(&neighbor)
                    .is_none_or(|&g| tentative_g < g)
                {
                    came_from.insert(neighbor, current.node);
                    g_score.insert(neighbor, tentative_g);
                    seq += 1;
                    open.push(OpenNode {
                        f: tentative_g + self.heuristic(neighbor, goal)?,
                        seq,
                        node: neighbor,
                    });
                }
            }
        }

        None
    }

    /// Edge count of the shortest path, or `None` when unreachable.
    pub fn path_length(&self, start: i64, goal: i64) -> Option<usize> {
        self.find_path(start, goal).map(|p| p.len() - 1)
    }
}

fn reconstruct(came_from: &HashMap<i64, i64>, goal: i64) -> Vec<i64> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use proptest::prelude::*;

    use crate::store::model::{BlockedEdge, Node};
    use crate::testutil::{mk_blocked_edge, mk_grid_nodes};

    fn pathfinder(nodes: &[Node], blocked: &[BlockedEdge]) -> Pathfinder {
        Pathfinder::new(Arc::new(GridGraph::new(nodes, blocked)))
    }

    /// BFS oracle: optimal on unit-cost graphs by construction.
    fn bfs_length(grid: &GridGraph, start: i64, goal: i64) -> Option<usize> {
        if !grid.contains(start) || !grid.contains(goal) {
            return None;
        }
        let mut dist: HashMap<i64, usize> = HashMap::from([(start, 0)]);
        let mut queue = VecDeque::from([start]);
        while let Some(n) = queue.pop_front() {
            if n == goal {
                return Some(dist[&n]);
            }
            for nb in grid.neighbors(n) {
                if !dist.contains_key(&nb) {
                    dist.insert(nb, dist[&n] + 1);
                    queue.push_back(nb);
                }
            }
        }
        None
    }

    #[test]
    fn trivial_path_is_single_node() {
        let nodes = mk_grid_nodes(2, 2);
        let pf = pathfinder(&nodes, &[]);
        let a = pf.grid().node_at(0, 0).unwrap();
        assert_eq!(pf.find_path(a, a), Some(vec![a]));
        assert_eq!(pf.path_length(a, a), Some(0));
    }

    #[test]
    fn straight_line_path() {
        let nodes = mk_grid_nodes(5, 1);
        let pf = pathfinder(&nodes, &[]);
        let a = pf.grid().node_at(0, 0).unwrap();
        let b = pf.grid().node_at(4, 0).unwrap();

        let path = pf.find_path(a, b).expect("path exists");
        assert_eq!(path.len(), 5);
        assert_eq!(path[0], a);
        assert_eq!(*path.last().unwrap(), b);
        assert_eq!(pf.path_length(a, b), Some(4));
    }

    #[test]
    fn reroutes_around_blocked_edge() {
        // 3x3 grid with (1,0)-(2,0) blocked: the direct length-2 path from
        // (0,0) to (2,0) is cut, shortest detour is 4 edges.
        let nodes = mk_grid_nodes(3, 3);
        let plain = GridGraph::new(&nodes, &[]);
        let from = plain.node_at(1, 0).unwrap();
        let to = plain.node_at(2, 0).unwrap();

        let pf = pathfinder(&nodes, &[mk_blocked_edge(from, to)]);
        let s = pf.grid().node_at(0, 0).unwrap();
        let g = pf.grid().node_at(2, 0).unwrap();

        let path = pf.find_path(s, g).expect("detour exists");
        assert_eq!(path.len() - 1, 4, "shortest detour has 4 edges");

        // Every step must be a real, unblocked edge.
        for pair in path.windows(2) {
            assert!(
                pf.grid().neighbors(pair[0]).contains(&pair[1]),
                "step {} -> {} is not a legal move",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn unreachable_goal_returns_none() {
        // 2x1 grid with its only edge blocked.
        let nodes = mk_grid_nodes(2, 1);
        let plain = GridGraph::new(&nodes, &[]);
        let a = plain.node_at(0, 0).unwrap();
        let b = plain.node_at(1, 0).unwrap();

        let pf = pathfinder(&nodes, &[mk_blocked_edge(a, b)]);
        assert_eq!(pf.find_path(a, b), None);
        assert_eq!(pf.path_length(a, b), None);
    }

    #[test]
    fn unknown_endpoints_return_none() {
        let nodes = mk_grid_nodes(2, 2);
        let pf = pathfinder(&nodes, &[]);
        let a = pf.grid().node_at(0, 0).unwrap();
        assert_eq!(pf.find_path(a, 777), None);
        assert_eq!(pf.find_path(777, a), None);
    }

    proptest! {
        /// A* must match BFS length on arbitrary blocked-edge subsets of a
        /// 6x6 grid, for every node pair.
        #[test]
        fn astar_matches_bfs(blocked_mask in proptest::collection::vec(any::<bool>(), 60)) {
            let nodes = mk_grid_nodes(6, 6);
            let plain = GridGraph::new(&nodes, &[]);

            // Enumerate the grid's undirected edges and block the masked ones.
            let mut edges = Vec::new();
            for n in &nodes {
                for nb in plain.neighbors(n.id) {
                    if n.id < nb {
                        edges.push((n.id, nb));
                    }
                }
            }
            let blocked: Vec<BlockedEdge> = edges
                .iter()
                .zip(blocked_mask.iter())
                .filter(|&(_, &m)| m)
                .map(|(&(a, b), _)| mk_blocked_edge(a, b))
                .collect();

            let pf = pathfinder(&nodes, &blocked);

            for s in &nodes {
                for g in &nodes {
                    let astar = pf.path_length(s.id, g.id);
                    let bfs = bfs_length(pf.grid(), s.id, g.id);
                    prop_assert_eq!(
                        astar, bfs,
                        "length mismatch for {} -> {}", s.id, g.id
                    );
                }
            }
        }
    }
}
