//! Node-level shortest paths from every waypoint to each waypoint it can
//! reach without passing through another one.
//!
//! Each waypoint runs its own Dijkstra search over the node graph. A
//! reached waypoint is recorded as a destination and not expanded, so a
//! waypoint's table only ever points at its immediate waypoint horizon.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::blockade::BlockadeSet;
use crate::graph::{MapGraph, MapNode};
use crate::path::Path;
use crate::types::{NodeId, Relation};

/// Heap entry: popped in ascending distance, ties in push order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frontier {
    pub distance: f64,
    pub sequence: usize,
    pub step: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed so `BinaryHeap` pops the smallest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Clone, Copy)]
struct Step {
    node: NodeId,
    parent: Option<usize>,
}

/// Counts from a full shortest-path pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsSummary {
    /// Waypoints searched from.
    pub waypoints: usize,
    /// Paths stored across all waypoint tables.
    pub paths: usize,
    /// Walls taken into account.
    pub blockades: usize,
}

/// Planar length of an edge in map units; portals are free.
fn edge_length(relation: Relation, from: &MapNode, to: &MapNode) -> f64 {
    match relation {
        Relation::Normal => from.position().planar_distance(to.position()),
        Relation::Portal => 0.0,
    }
}

fn reconstruct(graph: &MapGraph, steps: &[Step], last: usize) -> Path {
    let mut nodes = Vec::new();
    let mut cursor = Some(last);
    while let Some(index) = cursor {
        nodes.push(steps[index].node);
        cursor = steps[index].parent;
    }
    nodes.reverse();
    Path::from_nodes(graph, nodes)
}

/// Shortest paths from `source` to every waypoint on its horizon.
///
/// Blockade nodes are never entered and normal edges crossing a wall are
/// skipped. Portal edges are never obstructed. Relaxation only accepts a
/// strict improvement, so among equally short paths the first one found
/// wins.
#[must_use]
pub fn shortest_paths_from(
    graph: &MapGraph,
    blockades: &BlockadeSet,
    source: NodeId,
) -> Vec<(NodeId, Path)> {
    let slots = graph.slot_count();
    let mut best = vec![f64::INFINITY; slots];
    let mut settled = vec![false; slots];
    let mut steps = vec![Step {
        node: source,
        parent: None,
    }];
    let mut heap = BinaryHeap::new();
    let mut sequence = 0;
    let mut found = Vec::new();

    if source.index() >= slots {
        return found;
    }
    best[source.index()] = 0.0;
    heap.push(Frontier {
        distance: 0.0,
        sequence,
        step: 0,
    });

    while let Some(entry) = heap.pop() {
        let Step { node, .. } = steps[entry.step];
        if settled[node.index()] {
            continue;
        }
        settled[node.index()] = true;
        let Some(current) = graph.node(node) else {
            continue;
        };

        if node != source && current.is_waypoint() {
            found.push((node, reconstruct(graph, &steps, entry.step)));
            continue;
        }

        for (neighbour, relation) in current.adjacency() {
            if settled.get(neighbour.index()).copied().unwrap_or(true) {
                continue;
            }
            let Some(next) = graph.node(neighbour) else {
                continue;
            };
            if next.is_blockade() {
                continue;
            }
            if relation == Relation::Normal
                && blockades.obstructs(current.position(), next.position())
            {
                trace!(from = %node, to = %neighbour, "edge obstructed by blockade");
                continue;
            }
            let candidate = entry.distance + edge_length(relation, current, next);
            if candidate < best[neighbour.index()] {
                best[neighbour.index()] = candidate;
                steps.push(Step {
                    node: neighbour,
                    parent: Some(entry.step),
                });
                sequence += 1;
                heap.push(Frontier {
                    distance: candidate,
                    sequence,
                    step: steps.len() - 1,
                });
            }
        }
    }

    found
}

/// Rebuild the path table of every waypoint against precomputed
/// blockades.
#[tracing::instrument(level = "debug", skip_all)]
pub fn compute_shortest_paths_with(graph: &mut MapGraph, blockades: &BlockadeSet) -> PathsSummary {
    let waypoints: Vec<NodeId> = graph.waypoints().map(MapNode::id).collect();

    let results: Vec<(NodeId, Vec<(NodeId, Path)>)> = {
        let graph = &*graph;
        #[cfg(feature = "parallel")]
        let iter = waypoints.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = waypoints.iter();
        iter.map(|&waypoint| (waypoint, shortest_paths_from(graph, blockades, waypoint)))
            .collect()
    };

    let mut summary = PathsSummary {
        waypoints: waypoints.len(),
        paths: 0,
        blockades: blockades.len(),
    };
    for (waypoint, paths) in results {
        let Some(facet) = graph.waypoint_facet_mut(waypoint) else {
            continue;
        };
        facet.clear();
        debug!(waypoint = %waypoint, paths = paths.len(), "stored waypoint paths");
        summary.paths += paths.len();
        for (to, path) in paths {
            facet.add_path(to, Arc::new(path));
        }
    }

    info!(
        waypoints = summary.waypoints,
        paths = summary.paths,
        blockades = summary.blockades,
        "computed shortest paths"
    );
    summary
}

/// Rebuild the path table of every waypoint.
///
/// Blockades are collected from the graph first. Each waypoint's table is
/// cleared before its new paths are stored.
pub fn compute_all_shortest_paths(graph: &mut MapGraph) -> PathsSummary {
    let blockades = BlockadeSet::from_graph(graph);
    compute_shortest_paths_with(graph, &blockades)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::types::Point;

    fn add(graph: &mut MapGraph, x: f64, y: f64, kind: NodeKind) -> NodeId {
        graph.add_node(Point::new(x, y, 0.0), kind)
    }

    // --- Frontier ordering tests ---

    #[test]
    fn frontier_pops_smallest_then_oldest() {
        let mut heap = BinaryHeap::new();
        for (sequence, distance) in [(0, 3.0), (1, 1.0), (2, 1.0), (3, 2.0)] {
            heap.push(Frontier {
                distance,
                sequence,
                step: sequence,
            });
        }
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|f| f.sequence)).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    // --- search tests ---

    #[test]
    fn stops_at_waypoint_horizon() {
        // a - n - b - c, where b and c are waypoints: a only sees b.
        let mut graph = MapGraph::new();
        let a = add(&mut graph, 0.0, 0.0, NodeKind::Waypoint);
        let n = add(&mut graph, 1.0, 0.0, NodeKind::Normal);
        let b = add(&mut graph, 2.0, 0.0, NodeKind::Waypoint);
        let c = add(&mut graph, 3.0, 0.0, NodeKind::Waypoint);
        graph.connect(a, n, Relation::Normal).unwrap();
        graph.connect(n, b, Relation::Normal).unwrap();
        graph.connect(b, c, Relation::Normal).unwrap();

        let found = shortest_paths_from(&graph, &BlockadeSet::default(), a);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, b);
        assert_eq!(found[0].1.nodes(), &[a, n, b]);
        assert!((found[0].1.distance() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn prefers_shorter_branch() {
        let mut graph = MapGraph::new();
        let a = add(&mut graph, 0.0, 0.0, NodeKind::Waypoint);
        let near = add(&mut graph, 2.0, 1.0, NodeKind::Normal);
        let far = add(&mut graph, 2.0, -6.0, NodeKind::Normal);
        let b = add(&mut graph, 4.0, 0.0, NodeKind::Waypoint);
        graph.connect(a, near, Relation::Normal).unwrap();
        graph.connect(near, b, Relation::Normal).unwrap();
        graph.connect(a, far, Relation::Normal).unwrap();
        graph.connect(far, b, Relation::Normal).unwrap();

        let found = shortest_paths_from(&graph, &BlockadeSet::default(), a);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.nodes(), &[a, near, b]);
    }

    #[test]
    fn blockade_forces_detour() {
        // Wall on x = 5 between y = -1 and y = 1; the direct edge a-b
        // crosses it, the detour via (5, 3) does not.
        let mut graph = MapGraph::new();
        let a = add(&mut graph, 0.0, 0.0, NodeKind::Waypoint);
        let b = add(&mut graph, 10.0, 0.0, NodeKind::Waypoint);
        let detour = add(&mut graph, 5.0, 3.0, NodeKind::Normal);
        let top = add(&mut graph, 5.0, 1.0, NodeKind::Blockade);
        let bottom = add(&mut graph, 5.0, -1.0, NodeKind::Blockade);
        graph.connect(top, bottom, Relation::Normal).unwrap();
        graph.connect(a, b, Relation::Normal).unwrap();
        graph.connect(a, detour, Relation::Normal).unwrap();
        graph.connect(detour, b, Relation::Normal).unwrap();

        compute_all_shortest_paths(&mut graph);
        let path = graph.waypoint_facet(a).unwrap().shortest_path(b).unwrap();
        assert_eq!(path.nodes(), &[a, detour, b]);
    }

    #[test]
    fn portals_cost_nothing_and_ignore_blockades() {
        let mut graph = MapGraph::new();
        let a = add(&mut graph, 0.0, 0.0, NodeKind::Waypoint);
        let b = graph.add_node(Point::new(10.0, 0.0, 4.0), NodeKind::Waypoint);
        let top = add(&mut graph, 5.0, 1.0, NodeKind::Blockade);
        let bottom = add(&mut graph, 5.0, -1.0, NodeKind::Blockade);
        graph.connect(top, bottom, Relation::Normal).unwrap();
        graph.connect(a, b, Relation::Portal).unwrap();

        compute_all_shortest_paths(&mut graph);
        let path = graph.waypoint_facet(a).unwrap().shortest_path(b).unwrap();
        assert!(path.distance().abs() < f64::EPSILON);
        assert!((path.elevation_gain() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn blockade_nodes_are_not_walked() {
        let mut graph = MapGraph::new();
        let a = add(&mut graph, 0.0, 0.0, NodeKind::Waypoint);
        let wall = add(&mut graph, 1.0, 0.0, NodeKind::Blockade);
        let b = add(&mut graph, 2.0, 0.0, NodeKind::Waypoint);
        graph.connect(a, wall, Relation::Normal).unwrap();
        graph.connect(wall, b, Relation::Normal).unwrap();

        compute_all_shortest_paths(&mut graph);
        assert!(graph.waypoint_facet(a).unwrap().is_empty());
    }

    #[test]
    fn recompute_replaces_tables() {
        let mut graph = MapGraph::new();
        let a = add(&mut graph, 0.0, 0.0, NodeKind::Waypoint);
        let b = add(&mut graph, 3.0, 0.0, NodeKind::Waypoint);
        let c = add(&mut graph, 0.0, 3.0, NodeKind::Waypoint);
        graph.connect(a, b, Relation::Normal).unwrap();
        graph.connect(a, c, Relation::Normal).unwrap();

        let summary = compute_all_shortest_paths(&mut graph);
        assert_eq!(summary.waypoints, 3);
        assert_eq!(summary.paths, 4);
        assert_eq!(graph.waypoint_facet(a).unwrap().len(), 2);

        graph.disconnect(a, c).unwrap();
        let summary = compute_all_shortest_paths(&mut graph);
        assert_eq!(summary.paths, 2);
        let facet = graph.waypoint_facet(a).unwrap();
        assert_eq!(facet.neighbours().collect::<Vec<_>>(), vec![b]);
        assert_eq!(facet.path_count(), 1);
    }

    #[test]
    fn unreachable_waypoint_has_no_entry() {
        let mut graph = MapGraph::new();
        let a = add(&mut graph, 0.0, 0.0, NodeKind::Waypoint);
        let b = add(&mut graph, 3.0, 0.0, NodeKind::Waypoint);
        compute_all_shortest_paths(&mut graph);
        assert!(!graph.waypoint_facet(a).unwrap().has_neighbour(b));
    }
}
