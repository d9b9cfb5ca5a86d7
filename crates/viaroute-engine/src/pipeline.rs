//! Staged analysis: advance one pass at a time, inspecting each result
//! before continuing.
//!
//! ```rust
//! # use viaroute_engine::{Analysis, AnalysisConfig, EngineError, Leg, MapGraph};
//! # fn run(graph: MapGraph, legs: &[Leg]) -> Result<(), EngineError> {
//! let analysis = Analysis::new(graph, AnalysisConfig::default())?
//!     .find_paths()
//!     .find_routes(legs);
//!
//! for leg in analysis.legs() {
//!     let ranked = analysis.filtered(*leg);
//!     let segments = analysis.segments(*leg);
//! #   let _ = (ranked, segments);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Each stage consumes `self` and returns the next state, so alternative
//! routes can only be requested once the waypoint path tables exist.
//! The graph travels with the stages and comes back out through
//! `into_graph()`.

use std::sync::Arc;

use tracing::debug;

use crate::alternatives::{RoutesSummary, compute_all_routes};
use crate::blockade::BlockadeSet;
use crate::config::AnalysisConfig;
use crate::course::{Course, CourseSummary, Leg, shortest_route_choices};
use crate::filter::{RankedRoute, filter_routes};
use crate::graph::MapGraph;
use crate::route::Route;
use crate::shortest_path::{PathsSummary, compute_shortest_paths_with};
use crate::suggest::suggest_legs;
use crate::traffic::{RouteSegment, TrafficMap, build_route_segments};
use crate::types::EngineError;

// ───────────────────────── Stage 0: Analysis ─────────────────────────

/// A graph and configuration, before any search has run.
#[must_use = "analysis stages are consumed by advancing, call .find_paths() to continue"]
#[derive(Debug)]
pub struct Analysis {
    graph: MapGraph,
    config: AnalysisConfig,
}

impl Analysis {
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if `config` fails validation.
    pub fn new(graph: MapGraph, config: AnalysisConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { graph, config })
    }

    #[must_use]
    pub const fn graph(&self) -> &MapGraph {
        &self.graph
    }

    pub const fn graph_mut(&mut self) -> &mut MapGraph {
        &mut self.graph
    }

    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Rebuild every waypoint's path table and advance to [`PathsFound`].
    pub fn find_paths(mut self) -> PathsFound {
        let fingerprint = self.graph.fingerprint();
        let blockades = BlockadeSet::from_graph(&self.graph);
        let summary = compute_shortest_paths_with(&mut self.graph, &blockades);
        PathsFound {
            graph: self.graph,
            config: self.config,
            blockades,
            summary,
            fingerprint,
        }
    }

    pub fn into_graph(self) -> MapGraph {
        self.graph
    }
}

// ───────────────────────── Stage 1: PathsFound ───────────────────────

/// Waypoint path tables are filled in.
///
/// The graph may still be edited through [`graph_mut`](Self::graph_mut);
/// the tables are then stale until [`refresh`](Self::refresh) runs.
#[must_use = "analysis stages are consumed by advancing, call .find_routes() to continue"]
#[derive(Debug)]
pub struct PathsFound {
    graph: MapGraph,
    config: AnalysisConfig,
    blockades: BlockadeSet,
    summary: PathsSummary,
    fingerprint: u64,
}

impl PathsFound {
    #[must_use]
    pub const fn graph(&self) -> &MapGraph {
        &self.graph
    }

    /// Edit the graph. Path tables are not updated.
    pub const fn graph_mut(&mut self) -> &mut MapGraph {
        &mut self.graph
    }

    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    #[must_use]
    pub const fn blockades(&self) -> &BlockadeSet {
        &self.blockades
    }

    #[must_use]
    pub const fn summary(&self) -> PathsSummary {
        self.summary
    }

    /// Topology fingerprint the path tables were computed for.
    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Whether the path tables still describe `graph`.
    #[must_use]
    pub fn is_current_for(&self, graph: &MapGraph) -> bool {
        graph.fingerprint() == self.fingerprint
    }

    /// Whether the held graph is unchanged since the last search.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.is_current_for(&self.graph)
    }

    /// Recompute the path tables if the graph changed since they were
    /// built.
    pub fn refresh(self) -> Self {
        if self.is_current() {
            debug!("path tables current, skipping search");
            return self;
        }
        Analysis {
            graph: self.graph,
            config: self.config,
        }
        .find_paths()
    }

    /// Control pairs worth training on, see [`suggest_legs`].
    #[must_use]
    pub fn suggest_legs(&self) -> Vec<Leg> {
        suggest_legs(&self.graph, &self.config)
    }

    /// Solve every leg and advance to [`RoutesFound`]. Stale path tables
    /// are refreshed first.
    pub fn find_routes(self, legs: &[Leg]) -> RoutesFound {
        let mut current = self.refresh();
        let summary = compute_all_routes(&mut current.graph, legs, &current.config);
        RoutesFound {
            graph: current.graph,
            config: current.config,
            paths: current.summary,
            summary,
            legs: legs.to_vec(),
        }
    }

    pub fn into_graph(self) -> MapGraph {
        self.graph
    }
}

// ───────────────────────── Stage 2: RoutesFound ──────────────────────

/// Route tables are filled in for the requested legs.
#[must_use = "call .into_graph() to recover the analysed graph"]
#[derive(Debug)]
pub struct RoutesFound {
    graph: MapGraph,
    config: AnalysisConfig,
    paths: PathsSummary,
    summary: RoutesSummary,
    legs: Vec<Leg>,
}

impl RoutesFound {
    #[must_use]
    pub const fn graph(&self) -> &MapGraph {
        &self.graph
    }

    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The legs requested, repeats included.
    #[must_use]
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    #[must_use]
    pub const fn paths_summary(&self) -> PathsSummary {
        self.paths
    }

    #[must_use]
    pub const fn summary(&self) -> RoutesSummary {
        self.summary
    }

    /// Every stored route for `leg`, in acceptance order.
    #[must_use]
    pub fn routes_for(&self, leg: Leg) -> &[Arc<Route>] {
        self.graph
            .control_facet(leg.from)
            .map_or(&[], |facet| facet.routes_to(leg.to))
    }

    /// The routes for `leg` after diversity filtering, ranked.
    #[must_use]
    pub fn filtered(&self, leg: Leg) -> Vec<RankedRoute> {
        filter_routes(&self.graph, self.routes_for(leg).to_vec(), &self.config.filters)
    }

    fn filtered_routes(&self, leg: Leg) -> Vec<Arc<Route>> {
        self.filtered(leg).into_iter().map(|ranked| ranked.route).collect()
    }

    /// Per-node traffic of the filtered routes for `leg`.
    #[must_use]
    pub fn traffic(&self, leg: Leg) -> TrafficMap {
        TrafficMap::build(&self.graph, &self.filtered_routes(leg))
    }

    /// Display segments of the filtered routes for `leg`.
    #[must_use]
    pub fn segments(&self, leg: Leg) -> Vec<RouteSegment> {
        build_route_segments(&self.graph, &self.filtered_routes(leg))
    }

    /// Shortest route per leg of `course`, see [`shortest_route_choices`].
    #[must_use]
    pub fn course_summary(&self, course: &Course) -> Option<CourseSummary> {
        shortest_route_choices(&self.graph, course)
    }

    pub fn into_graph(self) -> MapGraph {
        self.graph
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::types::{NodeId, Point, Relation};

    /// Start and finish with a short high road and a long flat road.
    fn diamond() -> (MapGraph, NodeId, NodeId) {
        let mut graph = MapGraph::new();
        let s = graph.add_node(Point::new(0.0, 0.0, 0.0), NodeKind::Start);
        let high = graph.add_node(Point::new(10.0, 5.0, 3.0), NodeKind::Waypoint);
        let low = graph.add_node(Point::new(10.0, -12.0, 0.0), NodeKind::Waypoint);
        let f = graph.add_node(Point::new(20.0, 0.0, 0.0), NodeKind::Finish);
        for (a, b) in [(s, high), (high, f), (s, low), (low, f)] {
            graph.connect(a, b, Relation::Normal).unwrap();
        }
        (graph, s, f)
    }

    // --- Typed API tests ---

    #[test]
    fn stages_advance_in_order() {
        let (graph, s, f) = diamond();
        let leg = Leg::new(s, f);
        let paths = Analysis::new(graph, AnalysisConfig::default()).unwrap().find_paths();
        assert_eq!(paths.summary().waypoints, 4);
        assert!(paths.is_current());

        let routes = paths.find_routes(&[leg]);
        assert_eq!(routes.summary().solved, 1);
        assert_eq!(routes.routes_for(leg).len(), 2);
        assert!(routes.routes_for(leg.reversed()).is_empty());

        let graph = routes.into_graph();
        assert_eq!(graph.control_facet(s).unwrap().routes_to(f).len(), 2);
    }

    #[test]
    fn rejects_invalid_config() {
        let (graph, ..) = diamond();
        let mut config = AnalysisConfig::default();
        config.u_turn_tolerance = 2.0;
        assert!(Analysis::new(graph, config).is_err());
    }

    #[test]
    fn edits_make_paths_stale_until_refresh() {
        let (graph, s, f) = diamond();
        let mut paths = Analysis::new(graph, AnalysisConfig::default()).unwrap().find_paths();
        let before = paths.fingerprint();

        let extra = paths
            .graph_mut()
            .add_node(Point::new(10.0, 0.0, 0.0), NodeKind::Waypoint);
        paths.graph_mut().connect(s, extra, Relation::Normal).unwrap();
        paths.graph_mut().connect(extra, f, Relation::Normal).unwrap();
        assert!(!paths.is_current());

        let paths = paths.refresh();
        assert!(paths.is_current());
        assert_ne!(paths.fingerprint(), before);
        assert_eq!(paths.summary().waypoints, 5);
        let direct = paths.graph().waypoint_facet(s).unwrap().shortest_path(extra).unwrap();
        assert!((direct.distance() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn find_routes_refreshes_stale_tables() {
        let (graph, s, f) = diamond();
        let mut paths = Analysis::new(graph, AnalysisConfig::default()).unwrap().find_paths();
        let extra = paths
            .graph_mut()
            .add_node(Point::new(10.0, 0.0, 0.0), NodeKind::Waypoint);
        paths.graph_mut().connect(s, extra, Relation::Normal).unwrap();
        paths.graph_mut().connect(extra, f, Relation::Normal).unwrap();

        let routes = paths.find_routes(&[Leg::new(s, f)]);
        let shortest = &routes.routes_for(Leg::new(s, f))[0];
        assert!((shortest.distance() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn is_current_for_compares_topology() {
        let (graph, ..) = diamond();
        let copy = graph.clone();
        let paths = Analysis::new(graph, AnalysisConfig::default()).unwrap().find_paths();
        assert!(paths.is_current_for(&copy));

        let mut moved = copy;
        moved.set_position(NodeId::new(1), Point::new(11.0, 5.0, 3.0)).unwrap();
        assert!(!paths.is_current_for(&moved));
    }

    // --- Result accessor tests ---

    #[test]
    fn filtered_routes_are_ranked() {
        let (graph, s, f) = diamond();
        let leg = Leg::new(s, f);
        let mut config = AnalysisConfig::default();
        config.filters.filter_by_sameness.enabled = false;
        let routes = Analysis::new(graph, config).unwrap().find_paths().find_routes(&[leg]);

        let ranked = routes.filtered(leg);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].rank, 0);
        assert_eq!(ranked[0].colour, "blue");
        assert!(ranked[0].distance < ranked[1].distance);

        // Two disjoint roads between the shared start and finish.
        let segments = routes.segments(leg);
        assert_eq!(segments.len(), 2);
        assert_eq!(routes.traffic(leg).junctions(), vec![s, f]);
    }

    #[test]
    fn course_summary_uses_stored_routes() {
        let (graph, s, f) = diamond();
        let course = Course::from_parts(&graph, "sprint", Some(s), [], Some(f)).unwrap();
        let routes = Analysis::new(graph, AnalysisConfig::default())
            .unwrap()
            .find_paths()
            .find_routes(&course.legs());

        let summary = routes.course_summary(&course).unwrap();
        assert_eq!(summary.routes.len(), 1);
        assert!((summary.distance - 2.0 * 125.0_f64.sqrt()).abs() < 1e-9);
        assert!((summary.elevation_gain - 3.0).abs() < 1e-9);
    }
}
