//! Waypoint-level routes: ordered chains of paths between two controls.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::dead_end::dead_end_distance;
use crate::graph::MapGraph;
use crate::path::Path;
use crate::types::{NodeId, RouteId};

/// Display colours handed out to ranked routes, best first.
pub const ROUTE_COLOURS: [&str; 9] = [
    "blue",
    "red",
    "green",
    "cyan",
    "mediumpurple",
    "deeppink",
    "yellowgreen",
    "skyblue",
    "olive",
];

/// Colour for routes ranked past the end of [`ROUTE_COLOURS`].
pub const FALLBACK_ROUTE_COLOUR: &str = "gray";

/// The display colour for the route at `rank` (0 = best).
#[must_use]
pub fn route_colour(rank: usize) -> &'static str {
    ROUTE_COLOURS
        .get(rank)
        .copied()
        .unwrap_or(FALLBACK_ROUTE_COLOUR)
}

/// A sequence of paths where each path starts where the previous ended.
///
/// Two routes are equal when they consist of the same paths in the same
/// order; the [`RouteId`] is only used to follow a route through the
/// filters.
#[derive(Debug, Clone)]
pub struct Route {
    id: RouteId,
    paths: Vec<Arc<Path>>,
    distance: f64,
    elevation_gain: f64,
}

impl Route {
    #[must_use]
    pub fn new(graph: &MapGraph) -> Self {
        Self::from_paths(graph, Vec::new())
    }

    #[must_use]
    pub fn from_paths(graph: &MapGraph, paths: Vec<Arc<Path>>) -> Self {
        let mut route = Self {
            id: graph.next_route_id(),
            paths,
            distance: 0.0,
            elevation_gain: 0.0,
        };
        route.measure();
        route
    }

    fn measure(&mut self) {
        self.distance = self.paths.iter().map(|path| path.distance()).sum();
        self.elevation_gain = self.paths.iter().map(|path| path.elevation_gain()).sum();
    }

    pub fn push(&mut self, path: Arc<Path>) {
        debug_assert!(
            self.to().is_none() || self.to() == path.from(),
            "route paths must be contiguous"
        );
        self.paths.push(path);
        self.measure();
    }

    pub fn pop(&mut self) -> Option<Arc<Path>> {
        let path = self.paths.pop();
        self.measure();
        path
    }

    #[must_use]
    pub const fn id(&self) -> RouteId {
        self.id
    }

    #[must_use]
    pub fn paths(&self) -> &[Arc<Path>] {
        &self.paths
    }

    /// Start waypoint.
    #[must_use]
    pub fn from(&self) -> Option<NodeId> {
        self.paths.first().and_then(|path| path.from())
    }

    /// End waypoint.
    #[must_use]
    pub fn to(&self) -> Option<NodeId> {
        self.paths.last().and_then(|path| path.to())
    }

    /// Length in metres.
    #[must_use]
    pub const fn distance(&self) -> f64 {
        self.distance
    }

    #[must_use]
    pub const fn elevation_gain(&self) -> f64 {
        self.elevation_gain
    }

    /// Number of paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Same paths, same order.
    #[must_use]
    pub fn same_paths(&self, other: &Self) -> bool {
        self.paths.len() == other.paths.len()
            && self
                .paths
                .iter()
                .zip(&other.paths)
                .all(|(a, b)| a.id() == b.id())
    }

    /// Every waypoint passed, path by path. Join waypoints appear twice.
    pub fn waypoints(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.paths
            .iter()
            .flat_map(|path| path.waypoints().iter().copied())
    }

    /// The distinct waypoints passed.
    #[must_use]
    pub fn waypoint_set(&self) -> BTreeSet<NodeId> {
        self.waypoints().collect()
    }

    /// The nodes of the route, each kept at its first occurrence.
    #[must_use]
    pub fn flatten(&self) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        self.paths
            .iter()
            .flat_map(|path| path.nodes().iter().copied())
            .filter(|&node| seen.insert(node))
            .collect()
    }

    /// Metres of `a` that `b` also walks in the same direction.
    ///
    /// Every directed hop of `a` that appears as a consecutive pair in
    /// `b` contributes its planar length (portals contribute nothing).
    #[must_use]
    pub fn shared_distance(a: &Self, b: &Self, graph: &MapGraph) -> f64 {
        let flat_a = a.flatten();
        let flat_b = b.flatten();
        let pairs_b: BTreeSet<(NodeId, NodeId)> =
            flat_b.windows(2).map(|pair| (pair[0], pair[1])).collect();
        flat_a
            .windows(2)
            .filter(|pair| pairs_b.contains(&(pair[0], pair[1])))
            .map(|pair| graph.hop_distance(pair[0], pair[1]))
            .sum()
    }

    /// Replace everything from the waypoint `branch` starts at with the
    /// paths of `branch`.
    ///
    /// If no path of this route starts there the result is a copy of
    /// this route with a fresh id.
    #[must_use]
    pub fn create_branched(&self, graph: &MapGraph, branch: &Self) -> Self {
        let branch_from = branch.from();
        let mut paths = Vec::with_capacity(self.paths.len() + branch.paths.len());
        for path in &self.paths {
            if branch_from.is_some() && path.from() == branch_from {
                paths.extend(branch.paths.iter().cloned());
                break;
            }
            paths.push(Arc::clone(path));
        }
        Self::from_paths(graph, paths)
    }

    /// Distance any route between the two end waypoints must walk to get
    /// out of their dead ends.
    #[must_use]
    pub fn mandatory_distance(&self, graph: &MapGraph) -> f64 {
        let from = self.from().map_or(0.0, |w| dead_end_distance(graph, w, None));
        let to = self.to().map_or(0.0, |w| dead_end_distance(graph, w, None));
        from + to
    }

    /// Ascending distance.
    #[must_use]
    pub fn cmp_by_distance(a: &Self, b: &Self) -> Ordering {
        a.distance.total_cmp(&b.distance)
    }

    /// Ascending elevation gain, then ascending distance.
    #[must_use]
    pub fn cmp_by_elevation(a: &Self, b: &Self) -> Ordering {
        a.elevation_gain
            .total_cmp(&b.elevation_gain)
            .then_with(|| Self::cmp_by_distance(a, b))
    }

    /// The shortest routes; among equally short ones, those with the
    /// least climbing.
    #[must_use]
    pub fn shortest(routes: &[Arc<Self>]) -> Vec<Arc<Self>> {
        let mut shortest = routes.to_vec();
        shortest.sort_by(|a, b| Self::cmp_by_distance(a, b));
        let Some(best) = shortest.first().map(|route| route.distance) else {
            return shortest;
        };
        shortest.retain(|route| route.distance <= best);
        shortest.sort_by(|a, b| Self::cmp_by_elevation(a, b));
        let least = shortest.first().map_or(0.0, |route| route.elevation_gain);
        shortest.retain(|route| route.elevation_gain <= least);
        shortest
    }

    /// The routes with the least climbing; among those, the shortest.
    #[must_use]
    pub fn least_elevation(routes: &[Arc<Self>]) -> Vec<Arc<Self>> {
        let mut flattest = routes.to_vec();
        flattest.sort_by(|a, b| Self::cmp_by_elevation(a, b));
        let Some(least) = flattest.first().map(|route| route.elevation_gain) else {
            return flattest;
        };
        flattest.retain(|route| route.elevation_gain <= least);
        flattest.sort_by(|a, b| Self::cmp_by_distance(a, b));
        let best = flattest.first().map_or(0.0, |route| route.distance);
        flattest.retain(|route| route.distance <= best);
        flattest
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.same_paths(other)
    }
}

impl Eq for Route {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::types::{Point, Relation};

    /// Square a-b-c-d with a diagonal a-c:
    ///
    /// ```text
    /// d(0,4) ---- c(4,4)
    ///   |       / |
    ///   |     /   |
    /// a(0,0) ---- b(4,0)
    /// ```
    fn square() -> (MapGraph, [NodeId; 4]) {
        let mut graph = MapGraph::new();
        let a = graph.add_node(Point::new(0.0, 0.0, 0.0), NodeKind::Control);
        let b = graph.add_node(Point::new(4.0, 0.0, 2.0), NodeKind::Waypoint);
        let c = graph.add_node(Point::new(4.0, 4.0, 0.0), NodeKind::Control);
        let d = graph.add_node(Point::new(0.0, 4.0, 0.0), NodeKind::Waypoint);
        for (x, y) in [(a, b), (b, c), (c, d), (d, a), (a, c)] {
            graph.connect(x, y, Relation::Normal).unwrap();
        }
        (graph, [a, b, c, d])
    }

    fn route(graph: &MapGraph, legs: &[&[NodeId]]) -> Route {
        let paths = legs
            .iter()
            .map(|nodes| Arc::new(Path::from_nodes(graph, nodes.iter().copied())))
            .collect();
        Route::from_paths(graph, paths)
    }

    #[test]
    fn measures_paths() {
        let (graph, [a, b, c, _]) = square();
        let route = route(&graph, &[&[a, b], &[b, c]]);
        assert!((route.distance() - 8.0).abs() < 1e-12);
        assert!((route.elevation_gain() - 2.0).abs() < 1e-12);
        assert_eq!(route.from(), Some(a));
        assert_eq!(route.to(), Some(c));
    }

    #[test]
    fn push_and_pop_remeasure() {
        let (graph, [a, b, c, _]) = square();
        let mut route = route(&graph, &[&[a, b]]);
        route.push(Arc::new(Path::from_nodes(&graph, [b, c])));
        assert_eq!(route.len(), 2);
        assert!((route.distance() - 8.0).abs() < 1e-12);
        route.pop();
        assert_eq!(route.to(), Some(b));
        assert!((route.distance() - 4.0).abs() < 1e-12);
        route.pop();
        assert!(route.is_empty());
        assert_eq!(route.from(), None);
    }

    #[test]
    fn flatten_keeps_first_occurrence() {
        let (graph, [a, b, c, _]) = square();
        let route = route(&graph, &[&[a, b], &[b, c]]);
        assert_eq!(route.flatten(), vec![a, b, c]);
        assert_eq!(route.waypoints().collect::<Vec<_>>(), vec![a, b, b, c]);
        assert_eq!(route.waypoint_set().len(), 3);
    }

    #[test]
    fn equality_compares_path_sequences() {
        let (graph, [a, b, c, _]) = square();
        let first = Arc::new(Path::from_nodes(&graph, [a, b]));
        let second = Arc::new(Path::from_nodes(&graph, [b, c]));
        let x = Route::from_paths(&graph, vec![Arc::clone(&first), Arc::clone(&second)]);
        let y = Route::from_paths(&graph, vec![first, second]);
        assert_ne!(x.id(), y.id());
        assert_eq!(x, y);

        // Same nodes, different path objects.
        let z = route(&graph, &[&[a, b], &[b, c]]);
        assert_ne!(x, z);
    }

    #[test]
    fn shared_distance_is_directional() {
        let (graph, [a, b, c, d]) = square();
        let via_b = route(&graph, &[&[a, b], &[b, c]]);
        let via_d = route(&graph, &[&[a, d], &[d, c]]);
        let back = route(&graph, &[&[c, b], &[b, a]]);

        assert!((Route::shared_distance(&via_b, &via_b, &graph) - 8.0).abs() < 1e-12);
        assert!(Route::shared_distance(&via_b, &via_d, &graph).abs() < f64::EPSILON);
        assert!(Route::shared_distance(&via_b, &back, &graph).abs() < f64::EPSILON);
    }

    #[test]
    fn create_branched_splices_at_branch_start() {
        let (graph, [a, b, c, d]) = square();
        let base = route(&graph, &[&[a, b], &[b, c]]);
        let branch = route(&graph, &[&[b, a], &[a, d], &[d, c]]);
        let spliced = base.create_branched(&graph, &branch);
        assert_eq!(spliced.len(), 4);
        assert_eq!(spliced.paths()[0].id(), base.paths()[0].id());
        assert_eq!(spliced.paths()[1].id(), branch.paths()[0].id());
        assert_eq!(spliced.to(), Some(c));

        let unrelated = route(&graph, &[&[d, c]]);
        let copy = base.create_branched(&graph, &unrelated);
        assert_eq!(copy, base);
        assert_ne!(copy.id(), base.id());
    }

    #[test]
    fn shortest_and_least_elevation() {
        let (graph, [a, b, c, d]) = square();
        let direct = Arc::new(route(&graph, &[&[a, c]]));
        let via_b = Arc::new(route(&graph, &[&[a, b], &[b, c]]));
        let via_d = Arc::new(route(&graph, &[&[a, d], &[d, c]]));
        let all = vec![Arc::clone(&via_b), Arc::clone(&via_d), Arc::clone(&direct)];

        let shortest = Route::shortest(&all);
        assert_eq!(shortest.len(), 1);
        assert_eq!(shortest[0].id(), direct.id());

        // Both the direct and the d route are flat; direct is shorter.
        let flattest = Route::least_elevation(&all);
        assert_eq!(flattest.len(), 1);
        assert_eq!(flattest[0].id(), direct.id());

        assert!(Route::shortest(&[]).is_empty());
        assert!(Route::least_elevation(&[]).is_empty());
    }

    #[test]
    fn colours_fall_back_to_gray() {
        assert_eq!(route_colour(0), "blue");
        assert_eq!(route_colour(8), "olive");
        assert_eq!(route_colour(9), FALLBACK_ROUTE_COLOUR);
        assert_eq!(route_colour(100), "gray");
    }
}
