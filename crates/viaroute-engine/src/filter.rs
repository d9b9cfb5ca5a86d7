//! Route diversity filters.
//!
//! A candidate set for one control pair goes through up to six filters
//! in a fixed order, after which the flattest original candidate is put
//! back if it was dropped and the survivors are ranked by distance.
//!
//! Each filter is also exported on its own and works on a plain
//! `Vec<Arc<Route>>`, so callers can compose their own pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::FilterConfig;
use crate::graph::MapGraph;
use crate::route::{Route, route_colour};
use crate::types::{NodeId, RouteId};

/// Caps the self-power iteration in the sameness filter.
const MAX_POW_SELF_ITERATIONS: usize = 1024;

/// Lengths (in metres) below which short legs get stricter sameness
/// limits.
const SHORT_LEG_PENALTY_LENGTHS: [f64; 2] = [40.0, 50.0];

/// Base of the sameness decay.
const SAMENESS_DECAY: f64 = 0.95;

/// Scale of the sameness decay exponent.
const SAMENESS_DECAY_SCALE: f64 = 1.3;

/// A surviving route with its display rank and colour.
#[derive(Debug, Clone, Serialize)]
pub struct RankedRoute {
    #[serde(skip)]
    pub route: Arc<Route>,
    pub id: RouteId,
    /// 0 for the shortest.
    pub rank: usize,
    pub colour: &'static str,
    pub distance: f64,
    pub elevation_gain: f64,
}

/// Every stored route between any two controls of `controls`, taking
/// pairs in selection order (earlier control to later control).
#[must_use]
pub fn routes_between_controls(graph: &MapGraph, controls: &[NodeId]) -> Vec<Arc<Route>> {
    let mut routes = Vec::new();
    for (i, &from) in controls.iter().enumerate() {
        let Some(facet) = graph.control_facet(from) else {
            continue;
        };
        let later = &controls[i + 1..];
        for (to, stored) in facet.iter() {
            if later.contains(&to) {
                routes.extend(stored.iter().cloned());
            }
        }
    }
    routes
}

fn sort_by_distance(routes: &mut [Arc<Route>]) {
    routes.sort_by(|a, b| Route::cmp_by_distance(a, b));
}

fn remove_by_id(routes: &mut Vec<Arc<Route>>, id: RouteId) {
    if let Some(index) = routes.iter().position(|route| route.id() == id) {
        routes.remove(index);
    }
}

/// Keep the first of every group of routes with the same paths.
pub fn exclude_duplicates(routes: &mut Vec<Arc<Route>>) {
    let mut unique: Vec<Arc<Route>> = Vec::with_capacity(routes.len());
    for route in routes.drain(..) {
        if !unique.iter().any(|kept| kept.same_paths(&route)) {
            unique.push(route);
        }
    }
    *routes = unique;
}

/// Sort by distance and cut everything from the first route longer than
/// `threshold` times the median. Sets of two or fewer are left alone.
pub fn exclude_outliers_by_distance(routes: &mut Vec<Arc<Route>>, threshold: f64) {
    if routes.len() <= 2 {
        return;
    }
    sort_by_distance(routes);
    let lower = (routes.len() - 1) / 2;
    let upper = routes.len() / 2;
    let median = (routes[lower].distance() + routes[upper].distance()) / 2.0;
    if let Some(cut) = routes.iter().position(|r| r.distance() > threshold * median) {
        routes.truncate(cut);
    }
}

/// When one route visits every waypoint of another, drop the longer of
/// the two (the later-compared one on ties).
pub fn exclude_basic_detours(routes: &mut Vec<Arc<Route>>) {
    let mut pending: Vec<(Arc<Route>, BTreeSet<NodeId>)> = routes
        .iter()
        .map(|route| (Arc::clone(route), route.waypoint_set()))
        .collect();

    while let Some((reference, reference_waypoints)) = pending.pop() {
        for (other, other_waypoints) in &pending {
            let reference_covers = reference_waypoints.is_superset(other_waypoints);
            if !reference_covers && !other_waypoints.is_superset(&reference_waypoints) {
                continue;
            }
            let longer = if reference.distance() < other.distance() {
                other.id()
            } else {
                reference.id()
            };
            remove_by_id(routes, longer);
            if reference_covers {
                break;
            }
        }
    }
}

/// Drop routes whose length beyond the mandatory dead-end distance is too
/// large compared to the shortest route's.
///
/// The allowed multiple is `1 + (threshold - 1)^(((1 + e) / (1 + e0))^2)`
/// where `e` and `e0` are the elevation gains of the route and of the
/// shortest route, so steeper routes must stay closer to the shortest.
pub fn filter_by_distance(graph: &MapGraph, routes: &mut Vec<Arc<Route>>, threshold: f64) {
    sort_by_distance(routes);
    let Some(shortest) = routes.first().cloned() else {
        return;
    };
    let mandatory = shortest.mandatory_distance(graph);
    let baseline = shortest.distance() - mandatory;
    let base_climb = 1.0 + shortest.elevation_gain();

    routes.retain(|route| {
        let exponent = ((1.0 + route.elevation_gain()) / base_climb).powi(2);
        let weighted = 1.0 + (threshold - 1.0).powf(exponent);
        route.distance() - mandatory < weighted * baseline
    });
}

/// `x` raised to itself, `n` times over (a fractional `n` rounds up).
#[allow(clippy::float_cmp)]
fn pow_self(x: f64, n: f64) -> f64 {
    let mut x = x;
    let mut i = 0.0;
    for _ in 0..MAX_POW_SELF_ITERATIONS {
        if i >= n {
            break;
        }
        let next = x.powf(x);
        if !next.is_finite() || next == x {
            return next;
        }
        x = next;
        i += 1.0;
    }
    x
}

/// Drop routes that share too much of their length with a shorter route.
///
/// The allowed share shrinks with the route's detour ratio and extra
/// climbing, and shrinks faster on short legs.
pub fn filter_by_sameness(graph: &MapGraph, routes: &mut Vec<Arc<Route>>, max_sameness: f64) {
    sort_by_distance(routes);
    let Some(shortest) = routes.first().cloned() else {
        return;
    };
    let mandatory = shortest.mandatory_distance(graph);
    let shortest_distance = shortest.distance() - mandatory;
    let penalty: f64 = SHORT_LEG_PENALTY_LENGTHS
        .iter()
        .map(|length| (length / shortest_distance).floor())
        .sum();

    let mut index = 1;
    while index < routes.len() {
        let current = &routes[index];
        let extra_climb = (current.elevation_gain() - shortest.elevation_gain()).max(0.0);
        let detour_ratio = (current.distance() - mandatory) / shortest_distance;
        let iterations = 2.0f64.mul_add(extra_climb + penalty, 1.0);
        let weighted = SAMENESS_DECAY.powf(SAMENESS_DECAY_SCALE * pow_self(detour_ratio, iterations));

        let too_similar = routes[..index].iter().any(|shorter| {
            let shared = Route::shared_distance(shorter, current, graph) - mandatory;
            let sameness = shared / (shorter.distance() - mandatory);
            // NaN limits never exclude.
            sameness > max_sameness && sameness > weighted
        });

        if too_similar {
            routes.remove(index);
        } else {
            index += 1;
        }
    }
}

/// Drop a route when it takes one waypoint only a shorter route `y` uses
/// and another only a different shorter route `z` uses.
///
/// Waypoint usage is taken from the set as passed in, and each route is
/// judged against every pair of shorter routes still present.
pub fn exclude_crossover_detours(routes: &mut Vec<Arc<Route>>) {
    if routes.len() < 3 {
        return;
    }
    sort_by_distance(routes);

    let mut usage: BTreeMap<NodeId, BTreeSet<RouteId>> = BTreeMap::new();
    for route in routes.iter() {
        for waypoint in route.waypoints() {
            usage.entry(waypoint).or_default().insert(route.id());
        }
    }

    let crossover = |x: RouteId, y: RouteId, z: RouteId| {
        let (mut match_y, mut match_z) = (false, false);
        for users in usage.values().filter(|users| users.contains(&x)) {
            let (in_y, in_z) = (users.contains(&y), users.contains(&z));
            match_y |= in_y && !in_z;
            match_z |= in_z && !in_y;
            if match_y && match_z {
                return true;
            }
        }
        false
    };

    let mut index = 2;
    while index < routes.len() {
        let x = routes[index].id();
        let ids: Vec<RouteId> = routes[..index].iter().map(|r| r.id()).collect();
        let crossing = ids
            .iter()
            .enumerate()
            .any(|(i, &y)| ids[i + 1..].iter().any(|&z| crossover(x, y, z)));
        if crossing {
            routes.remove(index);
        } else {
            index += 1;
        }
    }
}

/// Run the enabled filters, restore the flattest candidate and rank the
/// survivors by distance.
#[tracing::instrument(level = "debug", skip_all, fields(candidates = candidates.len()))]
pub fn filter_routes(graph: &MapGraph, candidates: Vec<Arc<Route>>, config: &FilterConfig) -> Vec<RankedRoute> {
    let mut routes = candidates;
    routes.sort_by(|a, b| Route::cmp_by_elevation(a, b));
    let Some(flattest) = routes.first().cloned() else {
        return Vec::new();
    };

    if config.exclude_duplicates.enabled {
        exclude_duplicates(&mut routes);
    }
    if config.exclude_outliers_by_distance.enabled {
        exclude_outliers_by_distance(&mut routes, config.exclude_outliers_by_distance.threshold);
    }
    if config.exclude_basic_detours.enabled {
        exclude_basic_detours(&mut routes);
    }
    if config.filter_by_distance.enabled {
        filter_by_distance(graph, &mut routes, config.filter_by_distance.threshold);
    }
    if config.filter_by_sameness.enabled {
        filter_by_sameness(graph, &mut routes, config.filter_by_sameness.max_sameness);
    }
    if config.exclude_crossover_detours.enabled {
        exclude_crossover_detours(&mut routes);
    }

    if !routes.iter().any(|route| route.id() == flattest.id()) {
        routes.push(flattest);
    }
    sort_by_distance(&mut routes);
    debug!(kept = routes.len(), "filtered routes");

    routes
        .into_iter()
        .enumerate()
        .map(|(rank, route)| RankedRoute {
            id: route.id(),
            rank,
            colour: route_colour(rank),
            distance: route.distance(),
            elevation_gain: route.elevation_gain(),
            route,
        })
        .collect()
}
