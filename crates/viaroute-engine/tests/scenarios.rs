//! Integration tests: whole analyses on small hand-built maps.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;
use std::sync::Arc;

use viaroute_engine::filter::{exclude_duplicates, filter_by_distance};
use viaroute_engine::{
    AnalysisConfig, FilterConfig, Leg, MapGraph, NodeId, NodeKind, Point, Relation, Route, RouteId,
    compute_all_routes, compute_all_shortest_paths, filter_routes, routes_between_controls,
};

fn add(graph: &mut MapGraph, x: f64, y: f64, z: f64, kind: NodeKind) -> NodeId {
    graph.add_node(Point::new(x, y, z), kind)
}

fn link(graph: &mut MapGraph, pairs: &[(NodeId, NodeId)]) {
    for &(a, b) in pairs {
        graph.connect(a, b, Relation::Normal).unwrap();
    }
}

fn solve(graph: &mut MapGraph, legs: &[Leg]) {
    compute_all_shortest_paths(graph);
    compute_all_routes(graph, legs, &AnalysisConfig::default());
}

fn ids(routes: &[Arc<Route>]) -> BTreeSet<RouteId> {
    routes.iter().map(|route| route.id()).collect()
}

// ─────────── Diamond ─────────────────────────────────────────

#[test]
fn diamond_keeps_both_roads() {
    let mut graph = MapGraph::new();
    let s = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Start);
    let w1 = add(&mut graph, 10.0, 5.0, 3.0, NodeKind::Waypoint);
    let w2 = add(&mut graph, 10.0, -12.0, 0.0, NodeKind::Waypoint);
    let f = add(&mut graph, 20.0, 0.0, 0.0, NodeKind::Finish);
    link(&mut graph, &[(s, w1), (w1, f), (s, w2), (w2, f)]);

    let leg = Leg::new(s, f);
    solve(&mut graph, &[leg]);

    let from_s = graph.waypoint_facet(s).unwrap();
    assert_eq!(from_s.paths_to(w1).len(), 1);
    assert_eq!(from_s.paths_to(w2).len(), 1);
    assert!(!from_s.has_neighbour(f), "finish lies behind the waypoints");
    assert_eq!(graph.waypoint_facet(w1).unwrap().paths_to(f).len(), 1);
    assert_eq!(graph.waypoint_facet(w2).unwrap().paths_to(f).len(), 1);

    let routes = graph.control_facet(s).unwrap().routes_to(f).to_vec();
    assert_eq!(routes.len(), 2);
    let through: BTreeSet<Vec<NodeId>> = routes.iter().map(|route| route.flatten()).collect();
    assert!(through.contains(&vec![s, w1, f]));
    assert!(through.contains(&vec![s, w2, f]));

    let mut filters = FilterConfig::default();
    filters.filter_by_sameness.enabled = false;
    let ranked = filter_routes(&graph, routes, &filters);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].route.flatten(), vec![s, w1, f]);
    assert_eq!(ranked[0].colour, "blue");
    assert_eq!(ranked[1].colour, "red");
}

// ─────────── Controls in a line ──────────────────────────────

#[test]
fn controls_in_a_line_only_solve_adjacent_legs() {
    let mut graph = MapGraph::new();
    let a = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Control);
    let b = add(&mut graph, 10.0, 0.0, 0.0, NodeKind::Control);
    let c = add(&mut graph, 20.0, 0.0, 0.0, NodeKind::Control);
    link(&mut graph, &[(a, b), (b, c)]);

    let legs = [Leg::new(a, c), Leg::new(a, b), Leg::new(b, c)];
    solve(&mut graph, &legs);

    assert!(routes_between_controls(&graph, &[a, c]).is_empty());
    assert_eq!(routes_between_controls(&graph, &[a, b]).len(), 1);
    assert_eq!(routes_between_controls(&graph, &[b, c]).len(), 1);
}

// ─────────── Blockades and portals ───────────────────────────

#[test]
fn crossing_wall_cuts_the_only_edge() {
    let mut graph = MapGraph::new();
    let a = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Waypoint);
    let b = add(&mut graph, 10.0, 0.0, 0.0, NodeKind::Waypoint);
    let top = add(&mut graph, 5.0, 5.0, 0.0, NodeKind::Blockade);
    let bottom = add(&mut graph, 5.0, -5.0, 0.0, NodeKind::Blockade);
    link(&mut graph, &[(a, b), (top, bottom)]);

    let summary = compute_all_shortest_paths(&mut graph);
    assert_eq!(summary.blockades, 1);
    assert!(graph.waypoint_facet(a).unwrap().is_empty());
    assert!(graph.waypoint_facet(b).unwrap().is_empty());
}

#[test]
fn touching_wall_leaves_edge_open() {
    let mut graph = MapGraph::new();
    let a = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Waypoint);
    let b = add(&mut graph, 10.0, 0.0, 0.0, NodeKind::Waypoint);
    // The wall passes through b, the end of the edge.
    let top = add(&mut graph, 10.0, 5.0, 0.0, NodeKind::Blockade);
    let bottom = add(&mut graph, 10.0, -5.0, 0.0, NodeKind::Blockade);
    link(&mut graph, &[(a, b), (top, bottom)]);

    compute_all_shortest_paths(&mut graph);
    let path = graph.waypoint_facet(a).unwrap().shortest_path(b).unwrap();
    assert!((path.distance() - 10.0).abs() < 1e-9);
}

#[test]
fn portals_are_free_but_climb() {
    let mut graph = MapGraph::new();
    let a = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Waypoint);
    let stairs_low = add(&mut graph, 6.0, 0.0, 0.0, NodeKind::Normal);
    let stairs_high = add(&mut graph, 6.0, 0.0, 4.0, NodeKind::Normal);
    let b = add(&mut graph, 6.0, 8.0, 4.0, NodeKind::Waypoint);
    link(&mut graph, &[(a, stairs_low), (stairs_high, b)]);
    graph.connect(stairs_low, stairs_high, Relation::Portal).unwrap();

    compute_all_shortest_paths(&mut graph);
    let path = graph.waypoint_facet(a).unwrap().shortest_path(b).unwrap();
    assert_eq!(path.nodes(), &[a, stairs_low, stairs_high, b]);
    assert!((path.distance() - 14.0).abs() < 1e-9);
    assert!((path.elevation_gain() - 4.0).abs() < 1e-9);
}

#[test]
fn shortest_path_takes_the_cheaper_corridor() {
    let mut graph = MapGraph::new();
    let a = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Waypoint);
    let detour = add(&mut graph, 5.0, 8.0, 0.0, NodeKind::Normal);
    let direct = add(&mut graph, 5.0, 1.0, 0.0, NodeKind::Normal);
    let b = add(&mut graph, 10.0, 0.0, 0.0, NodeKind::Waypoint);
    link(&mut graph, &[(a, detour), (detour, b), (a, direct), (direct, b)]);

    compute_all_shortest_paths(&mut graph);
    let path = graph.waypoint_facet(a).unwrap().shortest_path(b).unwrap();
    assert_eq!(path.nodes(), &[a, direct, b]);
    assert!((path.distance() - 2.0 * 26.0_f64.sqrt()).abs() < 1e-9);
}

// ─────────── Graph and route identity ────────────────────────

#[test]
fn adjacency_is_symmetric() {
    let mut graph = MapGraph::new();
    let a = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Normal);
    let b = add(&mut graph, 1.0, 0.0, 0.0, NodeKind::Normal);
    graph.connect(a, b, Relation::Portal).unwrap();
    assert!(graph.has_neighbour(a, b, Relation::Portal));
    assert!(graph.has_neighbour(b, a, Relation::Portal));
    assert!(!graph.has_neighbour(a, b, Relation::Normal));

    assert!(graph.disconnect(b, a).unwrap());
    assert_eq!(graph.relation(a, b), None);
    assert_eq!(graph.relation(b, a), None);
}

#[test]
fn routes_compare_by_paths() {
    let mut graph = MapGraph::new();
    let s = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Start);
    let up = add(&mut graph, 10.0, 5.0, 0.0, NodeKind::Waypoint);
    let down = add(&mut graph, 10.0, -5.0, 0.0, NodeKind::Waypoint);
    let f = add(&mut graph, 20.0, 0.0, 0.0, NodeKind::Finish);
    link(&mut graph, &[(s, up), (up, f), (s, down), (down, f)]);
    solve(&mut graph, &[Leg::new(s, f)]);

    let routes = graph.control_facet(s).unwrap().routes_to(f);
    assert_eq!(routes.len(), 2);
    let copy = Route::from_paths(&graph, routes[0].paths().to_vec());
    assert_ne!(copy.id(), routes[0].id());
    assert_eq!(copy, *routes[0]);
    assert!((routes[0].distance() - routes[1].distance()).abs() < 1e-9);
    assert_ne!(*routes[0], *routes[1]);
}

// ─────────── Filter properties ───────────────────────────────

/// Start and finish joined through five waypoints; the longer the road,
/// the flatter it is.
fn fan() -> (MapGraph, NodeId, NodeId, Vec<Arc<Route>>) {
    let mut graph = MapGraph::new();
    let s = add(&mut graph, 0.0, 0.0, 0.0, NodeKind::Start);
    let f = add(&mut graph, 20.0, 0.0, 0.0, NodeKind::Finish);
    for (h, z) in [(3.0, 4.0), (-5.0, 3.0), (8.0, 2.0), (-10.0, 1.0), (12.0, 0.0)] {
        let w = add(&mut graph, 10.0, h, z, NodeKind::Waypoint);
        link(&mut graph, &[(s, w), (w, f)]);
    }
    solve(&mut graph, &[Leg::new(s, f)]);
    let routes = routes_between_controls(&graph, &[s, f]);
    (graph, s, f, routes)
}

#[test]
fn fan_finds_every_road() {
    let (_, _, _, routes) = fan();
    assert_eq!(routes.len(), 5);
}

#[test]
fn exclude_duplicates_is_idempotent() {
    let (graph, _, _, mut routes) = fan();
    routes.push(Arc::new(Route::from_paths(&graph, routes[0].paths().to_vec())));

    exclude_duplicates(&mut routes);
    let once = ids(&routes);
    exclude_duplicates(&mut routes);
    assert_eq!(ids(&routes), once);
    assert_eq!(once.len(), 5);
}

#[test]
fn raising_distance_threshold_never_drops_routes() {
    let (graph, _, _, routes) = fan();
    let mut previous: Option<BTreeSet<RouteId>> = None;
    for threshold in [1.0, 1.1, 1.3, 1.7, 2.5, 4.0] {
        let mut kept = routes.clone();
        filter_by_distance(&graph, &mut kept, threshold);
        let kept = ids(&kept);
        if let Some(previous) = previous {
            assert!(kept.is_superset(&previous), "threshold {threshold} lost a route");
        }
        previous = Some(kept);
    }
}

#[test]
fn flattest_route_always_survives() {
    let (graph, _, _, routes) = fan();
    let flattest = routes
        .iter()
        .min_by(|a, b| a.elevation_gain().total_cmp(&b.elevation_gain()))
        .unwrap()
        .id();

    let mut strict = FilterConfig::default();
    strict.filter_by_distance.threshold = 1.0;
    strict.filter_by_sameness.max_sameness = 0.0;
    for filters in [FilterConfig::default(), FilterConfig::disabled(), strict] {
        let ranked = filter_routes(&graph, routes.clone(), &filters);
        assert!(ranked.iter().any(|r| r.id == flattest));
        assert!(ranked.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
    }
}
