//! Leg suggestions: control pairs whose shortest route changes floors.

use tracing::{debug, info};

use crate::alternatives::{Reachability, shortest_route_for_leg};
use crate::config::AnalysisConfig;
use crate::course::Leg;
use crate::graph::{MapGraph, MapNode};
use crate::route::Route;
use crate::types::NodeId;

/// Elevation gain (map units) a shortest route needs to be worth
/// suggesting.
pub const MIN_INTERESTING_CLIMB: f64 = 3.0;

/// Climbs enough and also goes down somewhere.
fn is_interesting(graph: &MapGraph, route: &Route) -> bool {
    if route.elevation_gain() < MIN_INTERESTING_CLIMB {
        return false;
    }
    let Some(mut height) = route.from().and_then(|id| graph.position(id)).map(|p| p.z) else {
        return false;
    };
    for node in route.paths().iter().flat_map(|path| path.nodes()) {
        let Some(position) = graph.position(*node) else {
            continue;
        };
        if position.z < height {
            return true;
        }
        height = position.z;
    }
    false
}

/// Every control pair, earlier id first, whose shortest route climbs at
/// least [`MIN_INTERESTING_CLIMB`] and descends along the way.
///
/// Needs the waypoint tables from
/// [`compute_all_shortest_paths`](crate::shortest_path::compute_all_shortest_paths).
#[tracing::instrument(level = "debug", skip_all)]
pub fn suggest_legs(graph: &MapGraph, config: &AnalysisConfig) -> Vec<Leg> {
    let reachability = Reachability::from_graph(graph);
    let controls: Vec<NodeId> = graph.controls().map(MapNode::id).collect();
    let mut suggestions = Vec::new();

    for (i, &from) in controls.iter().enumerate() {
        for &to in &controls[i + 1..] {
            if !reachability.contains(from, to) {
                continue;
            }
            let Some(route) = shortest_route_for_leg(graph, from, to, config) else {
                continue;
            };
            if is_interesting(graph, &route) {
                debug!(from = %from, to = %to, climb = route.elevation_gain(), "suggesting leg");
                suggestions.push(Leg::new(from, to));
            }
        }
    }

    info!(
        controls = controls.len(),
        suggestions = suggestions.len(),
        "suggested legs"
    );
    suggestions
}
