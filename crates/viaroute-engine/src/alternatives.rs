//! Alternative routes between controls.
//!
//! Route search runs on the waypoint graph that the shortest-path pass
//! leaves behind: nodes are waypoints and edge weights are the stored
//! shortest path lengths. Alternatives come from a loopless
//! branch-and-splice search in the spirit of Yen's algorithm, bounded by
//! a length ratio and by halving the pending candidate pool after every
//! accepted route.

use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::sync::Arc;

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::course::Leg;
use crate::geometry::is_u_turn;
use crate::graph::{MapGraph, MapNode};
use crate::path::{Hop, Path};
use crate::route::Route;
use crate::shortest_path::Frontier;
use crate::types::{NodeId, PathId, Relation};

/// Constraints for a search that branches off an existing route.
#[derive(Debug, Clone, Copy)]
struct Branching<'a> {
    /// The path that arrived at the branch waypoint, for U-turn checks.
    last_path: Option<&'a Arc<Path>>,
    excluded_paths: &'a BTreeSet<PathId>,
    excluded_waypoints: &'a BTreeSet<NodeId>,
}

#[derive(Debug, Clone, Copy)]
struct RouteStep {
    waypoint: NodeId,
    parent: Option<usize>,
}

/// Whether continuing from `incoming` into `outgoing` doubles back.
///
/// Turns onto or off a portal are never U-turns.
fn doubles_back(graph: &MapGraph, incoming: &Path, outgoing: &Path, tolerance: f64) -> bool {
    let portal = |hop: Option<&Hop>| hop.is_some_and(|h| h.relation == Relation::Portal);
    if portal(incoming.last_hop()) || portal(outgoing.first_hop()) {
        return false;
    }
    let points = (
        incoming.penultimate_node().and_then(|n| graph.position(n)),
        outgoing.from().and_then(|n| graph.position(n)),
        outgoing.second_node().and_then(|n| graph.position(n)),
    );
    match points {
        (Some(a), Some(b), Some(c)) => is_u_turn(a, b, c, tolerance),
        _ => false,
    }
}

fn build_route(graph: &MapGraph, steps: &[RouteStep], last: usize) -> Option<Route> {
    let mut waypoints = Vec::new();
    let mut cursor = Some(last);
    while let Some(index) = cursor {
        waypoints.push(steps[index].waypoint);
        cursor = steps[index].parent;
    }
    waypoints.reverse();

    let mut paths = Vec::with_capacity(waypoints.len().saturating_sub(1));
    for pair in waypoints.windows(2) {
        let path = graph.waypoint_facet(pair[0])?.shortest_path(pair[1])?;
        paths.push(Arc::clone(path));
    }
    if paths.is_empty() {
        return None;
    }
    Some(Route::from_paths(graph, paths))
}

/// Waypoint-level Dijkstra from `from` to `to`.
///
/// Controls other than `to` are never stopped at. A hop that would turn
/// back sharply against the incoming direction is pruned. Stale frontier
/// entries are still expanded: they carry a different parent, so a hop
/// the best entry pruned as a U-turn may be fine from them.
fn find_shortest_route(
    graph: &MapGraph,
    from: NodeId,
    to: NodeId,
    branching: Option<Branching<'_>>,
    tolerance: f64,
) -> Option<Route> {
    let excluded = |waypoint: &NodeId| branching.is_some_and(|b| b.excluded_waypoints.contains(waypoint));
    let mut best: BTreeMap<NodeId, f64> = BTreeMap::new();
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut steps = vec![RouteStep {
        waypoint: from,
        parent: None,
    }];
    let mut heap = BinaryHeap::new();
    let mut sequence = 0;
    let mut current = Frontier {
        distance: 0.0,
        sequence,
        step: 0,
    };

    loop {
        let step = steps[current.step];
        if step.waypoint == to {
            return build_route(graph, &steps, current.step);
        }

        if let Some(facet) = graph.waypoint_facet(step.waypoint) {
            let incoming = match step.parent {
                Some(parent) => graph
                    .waypoint_facet(steps[parent].waypoint)
                    .and_then(|f| f.shortest_path(step.waypoint)),
                None => branching.and_then(|b| b.last_path),
            };

            for (next, paths) in facet.iter() {
                if next == from || visited.contains(&next) || excluded(&next) {
                    continue;
                }
                if next != to && graph.is_control(next) {
                    continue;
                }
                let Some(path) = paths.first() else {
                    continue;
                };
                if branching.is_some_and(|b| b.excluded_paths.contains(&path.id())) {
                    continue;
                }
                if incoming.is_some_and(|incoming| doubles_back(graph, incoming, path, tolerance)) {
                    continue;
                }

                let candidate = current.distance + path.distance();
                if candidate < best.get(&next).copied().unwrap_or(f64::INFINITY) {
                    best.insert(next, candidate);
                    steps.push(RouteStep {
                        waypoint: next,
                        parent: Some(current.step),
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

        visited.insert(step.waypoint);
        current = heap.pop()?;
    }
}

/// Insert keeping ascending distance; equal distances keep arrival order.
fn insert_by_distance(candidates: &mut Vec<Route>, route: Route) {
    let at = candidates.partition_point(|c| c.distance() <= route.distance());
    candidates.insert(at, route);
}

/// Just the shortest route for a leg, skipping the alternative search.
#[must_use]
pub fn shortest_route_for_leg(graph: &MapGraph, from: NodeId, to: NodeId, config: &AnalysisConfig) -> Option<Route> {
    if from == to {
        return None;
    }
    find_shortest_route(graph, from, to, None, config.u_turn_tolerance)
}

/// The shortest route for a leg followed by its accepted alternatives,
/// in acceptance order.
///
/// Reachability is not checked here: an unreachable `to` simply yields
/// no routes. `from == to` yields no routes.
#[must_use]
pub fn find_routes_for_leg(graph: &MapGraph, from: NodeId, to: NodeId, config: &AnalysisConfig) -> Vec<Route> {
    if from == to {
        return Vec::new();
    }
    let tolerance = config.u_turn_tolerance;
    let Some(first) = find_shortest_route(graph, from, to, None, tolerance) else {
        debug!(from = %from, to = %to, "no route found");
        return Vec::new();
    };
    let limit = config.max_route_length_ratio * first.distance();
    let mut accepted = vec![first];
    let mut candidates: Vec<Route> = Vec::new();

    loop {
        let Some(last) = accepted.last().cloned() else {
            break;
        };

        for (k, branch_path) in last.paths().iter().enumerate() {
            let root = &last.paths()[..k];
            let excluded_paths: BTreeSet<PathId> = accepted
                .iter()
                .filter(|route| {
                    route
                        .paths()
                        .get(..k)
                        .is_some_and(|prefix| prefix.iter().zip(root).all(|(a, b)| a.id() == b.id()))
                })
                .filter_map(|route| route.paths().get(k).map(|path| path.id()))
                .collect();
            let excluded_waypoints: BTreeSet<NodeId> = root.iter().filter_map(|path| path.from()).collect();
            let Some(branch_waypoint) = branch_path.from() else {
                continue;
            };

            let branching = Branching {
                last_path: root.last(),
                excluded_paths: &excluded_paths,
                excluded_waypoints: &excluded_waypoints,
            };
            let Some(branch) = find_shortest_route(graph, branch_waypoint, to, Some(branching), tolerance) else {
                continue;
            };
            let route = last.create_branched(graph, &branch);
            if route.distance() < limit && !accepted.iter().any(|a| a.same_paths(&route)) {
                insert_by_distance(&mut candidates, route);
            }
        }

        if candidates.is_empty() {
            break;
        }
        accepted.push(candidates.remove(0));
        candidates.truncate(candidates.len() / 2);
    }

    debug!(from = %from, to = %to, routes = accepted.len(), "found alternative routes");
    accepted
}

/// Which controls can reach which, through any chain of waypoint
/// connections.
#[derive(Debug, Clone, Default)]
pub struct Reachability {
    reachable: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Reachability {
    /// Walk the waypoint graph from every control.
    #[must_use]
    pub fn from_graph(graph: &MapGraph) -> Self {
        let mut waypoints: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for node in graph.waypoints() {
            waypoints.add_node(node.id());
            if let Some(facet) = node.waypoint() {
                for neighbour in facet.neighbours() {
                    waypoints.add_edge(node.id(), neighbour, ());
                }
            }
        }

        let mut reachable = BTreeMap::new();
        for control in graph.controls() {
            let start = control.id();
            let mut found = BTreeSet::new();
            let mut dfs = Dfs::new(&waypoints, start);
            while let Some(node) = dfs.next(&waypoints) {
                if node != start && graph.is_control(node) {
                    found.insert(node);
                }
            }
            reachable.insert(start, found);
        }
        Self { reachable }
    }

    #[must_use]
    pub fn contains(&self, from: NodeId, to: NodeId) -> bool {
        self.reachable.get(&from).is_some_and(|set| set.contains(&to))
    }

    /// Controls reachable from `from`.
    pub fn from(&self, from: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.reachable.get(&from).into_iter().flatten().copied()
    }

    /// Number of reachable ordered control pairs.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.reachable.values().map(BTreeSet::len).sum()
    }
}

/// Reset every control's route table to one empty entry per reachable
/// control.
#[tracing::instrument(level = "debug", skip_all)]
pub fn find_control_neighbours(graph: &mut MapGraph) -> Reachability {
    let reachability = Reachability::from_graph(graph);
    let controls: Vec<NodeId> = graph.controls().map(MapNode::id).collect();
    for control in controls {
        let neighbours: Vec<NodeId> = reachability.from(control).collect();
        if let Some(facet) = graph.control_facet_mut(control) {
            facet.clear();
            for neighbour in neighbours {
                facet.insert_neighbour(neighbour);
            }
        }
    }
    reachability
}

/// Counts from solving a batch of legs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutesSummary {
    /// Legs requested.
    pub legs: usize,
    /// Distinct legs searched.
    pub solved: usize,
    /// Legs skipped as repeats, self-legs, non-controls or unreachable.
    pub skipped: usize,
    /// Routes stored across all solved legs.
    pub routes: usize,
    /// Largest number of routes stored for one leg.
    pub max_routes_per_leg: usize,
}

/// Solve each leg into its control's route table, assuming the control
/// neighbour tables are current.
///
/// A leg that was already solved in this batch is skipped.
#[tracing::instrument(level = "debug", skip_all)]
pub fn solve_legs(graph: &mut MapGraph, legs: &[Leg], config: &AnalysisConfig) -> RoutesSummary {
    let mut summary = RoutesSummary {
        legs: legs.len(),
        ..RoutesSummary::default()
    };
    let mut completed: BTreeSet<Leg> = BTreeSet::new();

    for &leg in legs {
        if !completed.insert(leg) {
            debug!(from = %leg.from, to = %leg.to, "routes already found, skipping");
            summary.skipped += 1;
            continue;
        }
        let reachable = leg.from != leg.to
            && graph
                .control_facet(leg.from)
                .is_some_and(|facet| facet.has_neighbour(leg.to));
        if !reachable {
            debug!(from = %leg.from, to = %leg.to, "controls not connected, skipping");
            summary.skipped += 1;
            continue;
        }

        let routes: Vec<Arc<Route>> = find_routes_for_leg(graph, leg.from, leg.to, config)
            .into_iter()
            .map(Arc::new)
            .collect();
        summary.solved += 1;
        summary.routes += routes.len();
        summary.max_routes_per_leg = summary.max_routes_per_leg.max(routes.len());
        if let Some(facet) = graph.control_facet_mut(leg.from) {
            facet.set_routes(leg.to, routes);
        }
    }
    summary
}

/// Rebuild control neighbour tables and solve every leg.
///
/// Requires the waypoint tables from
/// [`compute_all_shortest_paths`](crate::shortest_path::compute_all_shortest_paths).
pub fn compute_all_routes(graph: &mut MapGraph, legs: &[Leg], config: &AnalysisConfig) -> RoutesSummary {
    find_control_neighbours(graph);
    let summary = solve_legs(graph, legs, config);
    info!(
        legs = summary.legs,
        solved = summary.solved,
        routes = summary.routes,
        "computed routes"
    );
    summary
}
