//! Dead-end distance: how far a runner must walk from a waypoint before
//! any real choice of direction exists.

use std::collections::BTreeSet;

use crate::graph::MapGraph;
use crate::types::NodeId;

/// Distance in metres from `waypoint` to its first real decision point,
/// ignoring the neighbour `came_from`.
///
/// With exactly one other neighbouring waypoint the walk continues into
/// it. Otherwise the result is the length of the node prefix that every
/// remaining neighbour's shortest path shares. A waypoint chain that
/// loops back on itself offers no choice anywhere and measures `0`.
#[must_use]
pub fn dead_end_distance(graph: &MapGraph, waypoint: NodeId, came_from: Option<NodeId>) -> f64 {
    let mut current = waypoint;
    let mut came_from = came_from;
    let mut visited = BTreeSet::new();

    loop {
        if !visited.insert(current) {
            return 0.0;
        }
        let Some(facet) = graph.waypoint_facet(current) else {
            return 0.0;
        };
        if facet.is_empty() {
            return 0.0;
        }

        let mut others = facet.neighbours().filter(|&n| Some(n) != came_from);
        match (others.next(), others.next()) {
            (Some(next), None) => {
                came_from = Some(current);
                current = next;
            }
            _ => return shared_prefix_distance(graph, current, came_from),
        }
    }
}

fn shared_prefix_distance(graph: &MapGraph, waypoint: NodeId, came_from: Option<NodeId>) -> f64 {
    let Some(facet) = graph.waypoint_facet(waypoint) else {
        return 0.0;
    };
    let firsts: Vec<&[NodeId]> = facet
        .iter()
        .filter(|&(neighbour, _)| Some(neighbour) != came_from)
        .filter_map(|(_, paths)| paths.first().map(|path| path.nodes()))
        .collect();

    let mut prefix: Vec<NodeId> = Vec::new();
    loop {
        let index = prefix.len();
        let next: BTreeSet<NodeId> = firsts
            .iter()
            .filter_map(|nodes| nodes.get(index).copied())
            .collect();
        let mut next = next.into_iter();
        match (next.next(), next.next()) {
            (Some(node), None) => prefix.push(node),
            _ => break,
        }
    }

    prefix
        .windows(2)
        .map(|pair| graph.hop_distance(pair[0], pair[1]))
        .sum()
}
