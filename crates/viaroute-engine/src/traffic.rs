//! Route traffic through nodes, and the display segments derived from it.
//!
//! For a final set of routes, each node records which routes arrive from
//! and depart to each neighbour. Nodes where routes start, end, split,
//! join or take a portal break the drawing into segments; everything in
//! between is a run of linear nodes drawn as one polyline shared by the
//! routes that walk it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::graph::MapGraph;
use crate::route::Route;
use crate::types::{NodeId, Relation, RouteId};

/// Routes passing one node, keyed by the neighbour they come from or go to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeTraffic {
    pub node: NodeId,
    pub arrivals: BTreeMap<NodeId, BTreeSet<RouteId>>,
    pub departures: BTreeMap<NodeId, BTreeSet<RouteId>>,
    jumps: bool,
}

impl NodeTraffic {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            ..Self::default()
        }
    }

    /// Routes start here and none arrive.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.arrivals.is_empty() && !self.departures.is_empty()
    }

    /// Routes end here and none leave.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        !self.arrivals.is_empty() && self.departures.is_empty()
    }

    /// Routes arrive from more than one neighbour.
    #[must_use]
    pub fn merges(&self) -> bool {
        self.arrivals.len() > 1
    }

    /// Routes leave towards more than one neighbour.
    #[must_use]
    pub fn branches(&self) -> bool {
        self.departures.len() > 1
    }

    /// Some route reaches or leaves this node through a portal.
    #[must_use]
    pub const fn jumps(&self) -> bool {
        self.jumps
    }

    /// Exactly one way in and one way out.
    #[must_use]
    pub fn is_linear(&self) -> bool {
        self.arrivals.len() == 1 && self.departures.len() == 1
    }

    /// Where a display segment has to start.
    fn starts_segments(&self) -> bool {
        self.is_source() || self.branches() || self.merges() || self.jumps
    }
}

/// Traffic of every node some route passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficMap {
    nodes: BTreeMap<NodeId, NodeTraffic>,
}

impl TrafficMap {
    #[must_use]
    pub fn build(graph: &MapGraph, routes: &[Arc<Route>]) -> Self {
        let mut nodes: BTreeMap<NodeId, NodeTraffic> = BTreeMap::new();

        for route in routes {
            let flat = route.flatten();
            if flat.len() < 2 {
                continue;
            }
            for (i, &here) in flat.iter().enumerate() {
                let traffic = nodes.entry(here).or_insert_with(|| NodeTraffic::new(here));
                let neighbours = [
                    i.checked_sub(1).map(|j| (flat[j], true)),
                    flat.get(i + 1).map(|&next| (next, false)),
                ];
                for (neighbour, arriving) in neighbours.into_iter().flatten() {
                    let side = if arriving {
                        &mut traffic.arrivals
                    } else {
                        &mut traffic.departures
                    };
                    side.entry(neighbour).or_default().insert(route.id());
                    if graph.relation(here, neighbour) == Some(Relation::Portal) {
                        traffic.jumps = true;
                    }
                }
            }
        }

        Self { nodes }
    }

    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&NodeTraffic> {
        self.nodes.get(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeTraffic> + '_ {
        self.nodes.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes where routes split or join, in id order.
    #[must_use]
    pub fn junctions(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|traffic| traffic.merges() || traffic.branches())
            .map(|traffic| traffic.node)
            .collect()
    }

    /// Follow linear nodes from `first` until a node that starts or ends
    /// segments. `first` is always included.
    fn run_from(&self, first: NodeId) -> Vec<NodeId> {
        let mut run = vec![first];
        let mut visited = BTreeSet::from([first]);
        let mut current = first;
        while let Some(traffic) = self.nodes.get(&current) {
            if !traffic.is_linear() || traffic.jumps {
                break;
            }
            let Some(&next) = traffic.departures.keys().next() else {
                break;
            };
            if !visited.insert(next) {
                break;
            }
            run.push(next);
            current = next;
        }
        run
    }
}

/// One drawable piece of route overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSegment {
    pub nodes: Vec<NodeId>,
    /// Routes walking this piece, in either direction.
    pub routes: BTreeSet<RouteId>,
    /// A single portal hop, drawn as a jump marker rather than a line.
    pub portal: bool,
}

impl RouteSegment {
    #[must_use]
    pub const fn is_portal(&self) -> bool {
        self.portal
    }

    fn same_nodes(&self, nodes: &[NodeId]) -> bool {
        self.nodes == nodes || self.nodes.iter().rev().eq(nodes.iter())
    }
}

/// Split a set of routes into the fewest segments that draw every shared
/// stretch once.
#[must_use]
pub fn build_route_segments(graph: &MapGraph, routes: &[Arc<Route>]) -> Vec<RouteSegment> {
    let traffic = TrafficMap::build(graph, routes);
    let mut segments: Vec<RouteSegment> = Vec::new();

    for node in traffic.iter().filter(|traffic| traffic.starts_segments()) {
        for (&destination, departing) in &node.departures {
            let mut nodes = vec![node.node];
            nodes.extend(traffic.run_from(destination));

            if let Some(existing) = segments.iter_mut().find(|segment| segment.same_nodes(&nodes)) {
                existing.routes.extend(departing.iter().copied());
                continue;
            }
            let portal = nodes.len() == 2 && graph.relation(nodes[0], nodes[1]) == Some(Relation::Portal);
            segments.push(RouteSegment {
                nodes,
                routes: departing.clone(),
                portal,
            });
        }
    }

    debug!(
        routes = routes.len(),
        nodes = traffic.len(),
        segments = segments.len(),
        "built route segments"
    );
    segments
}
