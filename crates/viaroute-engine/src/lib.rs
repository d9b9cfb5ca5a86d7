//! viaroute-engine: route choice analysis on an indoor navigation graph
//! (sans-IO).
//!
//! The graph is a set of nodes on a floor plan joined by normal edges
//! (walkable, measured) and portal edges (stairs, lifts, doors between
//! floors: free to take). Waypoints are the decision points routes fork
//! at, controls are the checkpoints of an orienteering course.
//!
//! An analysis runs in passes:
//!
//! 1. [`compute_all_shortest_paths`]: a Dijkstra search from every
//!    waypoint fills its table of shortest paths to the waypoints it
//!    can see, avoiding walls built from blockade nodes.
//! 2. [`compute_all_routes`]: for every requested leg, a branching
//!    search over those paths fills the start control's table with the
//!    shortest route and its near-shortest alternatives.
//! 3. [`filter_routes`]: a leg's route set is narrowed to a small set of
//!    meaningfully different choices and ranked.
//! 4. [`build_route_segments`]: the chosen routes are split into the
//!    segments a renderer draws.
//!
//! [`Analysis`] strings the passes together as typed stages. This crate
//! has **no I/O dependencies**: loading a map and timing a run belong to
//! the caller (see `viaroute-bench`).

pub mod alternatives;
pub mod blockade;
pub mod config;
pub mod course;
pub mod dead_end;
pub mod diagnostics;
pub mod filter;
pub mod geometry;
pub mod graph;
pub mod path;
pub mod pipeline;
pub mod route;
pub mod shortest_path;
pub mod suggest;
pub mod traffic;
pub mod types;

pub use alternatives::{Reachability, RoutesSummary, compute_all_routes, find_routes_for_leg};
pub use blockade::{Blockade, BlockadeSet};
pub use config::{AnalysisConfig, FilterConfig, SamenessFilter, ThresholdFilter, Toggle};
pub use course::{Course, CourseIndex, CourseSummary, Leg, shortest_route_choices};
pub use diagnostics::{AnalysisDiagnostics, Clock, run_with_diagnostics};
pub use filter::{RankedRoute, filter_routes, routes_between_controls};
pub use graph::{MapGraph, MapNode, NodeKind};
pub use path::Path;
pub use pipeline::{Analysis, PathsFound, RoutesFound};
pub use route::Route;
pub use shortest_path::{PathsSummary, compute_all_shortest_paths};
pub use suggest::suggest_legs;
pub use traffic::{NodeTraffic, RouteSegment, TrafficMap, build_route_segments};
pub use types::{EngineError, MapScale, NodeId, PathId, Point, Relation, RouteId};
