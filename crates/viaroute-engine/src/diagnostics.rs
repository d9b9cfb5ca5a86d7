//! Analysis diagnostics: timing and counts for each stage of a run.
//!
//! The engine never reads the system clock itself. Callers hand in a
//! [`Clock`], which keeps the crate usable in tests with a fake clock and
//! on targets without `std::time::Instant`.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alternatives::{find_control_neighbours, solve_legs};
use crate::blockade::BlockadeSet;
use crate::config::AnalysisConfig;
use crate::course::Leg;
use crate::filter::{filter_routes, routes_between_controls};
use crate::graph::MapGraph;
use crate::shortest_path::compute_shortest_paths_with;
use crate::types::EngineError;

/// Source of timestamps for stage timing.
pub trait Clock {
    type Instant;

    fn now(&self) -> Self::Instant;

    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration seconds must be finite and non-negative"))
    }
}

/// Diagnostics collected from one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDiagnostics {
    /// Stage 1: wall segments collected from blockade nodes.
    pub blockades: StageDiagnostics,
    /// Stage 2: per-waypoint shortest paths.
    pub shortest_paths: StageDiagnostics,
    /// Stage 3: control-to-control reachability.
    pub control_neighbours: StageDiagnostics,
    /// Stage 4: alternative routes per leg.
    pub routes: StageDiagnostics,
    /// Stage 5: diversity filtering of each solved leg.
    pub filtering: StageDiagnostics,
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    pub summary: AnalysisSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub metrics: StageMetrics,
}

/// Stage-specific counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    Blockades {
        /// Nodes of kind blockade.
        blockade_nodes: usize,
        /// Wall segments built from them.
        blockades: usize,
    },
    ShortestPaths {
        waypoints: usize,
        paths: usize,
        /// Mean stored paths per waypoint.
        mean_paths_per_waypoint: f64,
    },
    ControlNeighbours {
        controls: usize,
        /// Ordered control pairs with some connection.
        reachable_pairs: usize,
    },
    Routes {
        legs: usize,
        solved: usize,
        skipped: usize,
        routes: usize,
        max_routes_per_leg: usize,
    },
    Filtering {
        /// Distinct legs filtered.
        legs: usize,
        candidates: usize,
        kept: usize,
    },
}

/// Summary counts across all stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub nodes: usize,
    pub waypoints: usize,
    pub controls: usize,
    pub blockades: usize,
    pub paths: usize,
    pub legs: usize,
    pub routes: usize,
    /// Routes left after filtering.
    pub kept_routes: usize,
}

impl AnalysisDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Analysis Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Graph: {} nodes, {} waypoints, {} controls, {} blockades",
            self.summary.nodes, self.summary.waypoints, self.summary.controls, self.summary.blockades,
        ));
        lines.push(format!("Total duration: {:.3}ms", duration_ms(self.total_duration)));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 { ms / total_ms * 100.0 } else { 0.0 };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Paths: {}  |  Legs: {}  |  Routes: {} ({} kept)",
            self.summary.paths, self.summary.legs, self.summary.routes, self.summary.kept_routes,
        ));

        lines.join("\n")
    }

    /// Stages in run order with their display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 5] {
        [
            ("Blockades", &self.blockades),
            ("Shortest Paths", &self.shortest_paths),
            ("Control Neighbours", &self.control_neighbours),
            ("Routes", &self.routes),
            ("Filtering", &self.filtering),
        ]
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Blockades {
            blockade_nodes,
            blockades,
        } => format!("{blockade_nodes} nodes -> {blockades} walls"),
        StageMetrics::ShortestPaths {
            waypoints,
            paths,
            mean_paths_per_waypoint,
        } => format!("{waypoints} waypoints, {paths} paths (mean={mean_paths_per_waypoint:.1})"),
        StageMetrics::ControlNeighbours {
            controls,
            reachable_pairs,
        } => format!("{controls} controls, {reachable_pairs} reachable pairs"),
        StageMetrics::Routes {
            legs,
            solved,
            skipped,
            routes,
            max_routes_per_leg,
        } => format!("{solved}/{legs} legs solved ({skipped} skipped), {routes} routes (max {max_routes_per_leg}/leg)"),
        StageMetrics::Filtering { legs, candidates, kept } => {
            format!("{legs} legs, {candidates}->{kept} routes")
        }
    }
}

/// Time one stage, returning its result and diagnostics.
fn timed<C: Clock, T>(clock: &C, stage: impl FnOnce() -> (T, StageMetrics)) -> (T, StageDiagnostics) {
    let start = clock.now();
    let (value, metrics) = stage();
    let diagnostics = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics,
    };
    (value, diagnostics)
}

/// Run a full analysis over `graph`, collecting per-stage diagnostics.
///
/// Leaves the waypoint and control tables of `graph` populated, exactly
/// as [`compute_all_shortest_paths`](crate::shortest_path::compute_all_shortest_paths)
/// followed by [`compute_all_routes`](crate::alternatives::compute_all_routes)
/// would. The filtering stage does not modify the graph.
///
/// # Errors
///
/// Returns [`EngineError::InvalidConfig`] if `config` fails validation.
#[tracing::instrument(level = "debug", skip_all, fields(legs = legs.len()))]
pub fn run_with_diagnostics<C: Clock>(
    graph: &mut MapGraph,
    legs: &[Leg],
    config: &AnalysisConfig,
    clock: &C,
) -> Result<AnalysisDiagnostics, EngineError> {
    config.validate()?;
    let total_start = clock.now();

    let (blockade_set, blockades) = timed(clock, || {
        let set = BlockadeSet::from_graph(graph);
        let metrics = StageMetrics::Blockades {
            blockade_nodes: graph.blockade_nodes().count(),
            blockades: set.len(),
        };
        (set, metrics)
    });

    let (paths, shortest_paths) = timed(clock, || {
        let summary = compute_shortest_paths_with(graph, &blockade_set);
        #[allow(clippy::cast_precision_loss)]
        let mean = if summary.waypoints == 0 {
            0.0
        } else {
            summary.paths as f64 / summary.waypoints as f64
        };
        let metrics = StageMetrics::ShortestPaths {
            waypoints: summary.waypoints,
            paths: summary.paths,
            mean_paths_per_waypoint: mean,
        };
        (summary, metrics)
    });

    let (controls, control_neighbours) = timed(clock, || {
        let reachability = find_control_neighbours(graph);
        let controls = graph.controls().count();
        let metrics = StageMetrics::ControlNeighbours {
            controls,
            reachable_pairs: reachability.pair_count(),
        };
        (controls, metrics)
    });

    let (solved, routes) = timed(clock, || {
        let summary = solve_legs(graph, legs, config);
        let metrics = StageMetrics::Routes {
            legs: summary.legs,
            solved: summary.solved,
            skipped: summary.skipped,
            routes: summary.routes,
            max_routes_per_leg: summary.max_routes_per_leg,
        };
        (summary, metrics)
    });

    let (kept_routes, filtering) = timed(clock, || {
        let distinct: BTreeSet<Leg> = legs.iter().copied().collect();
        let mut candidates = 0;
        let mut kept = 0;
        for leg in &distinct {
            let routes = routes_between_controls(graph, &[leg.from, leg.to]);
            candidates += routes.len();
            kept += filter_routes(graph, routes, &config.filters).len();
        }
        let metrics = StageMetrics::Filtering {
            legs: distinct.len(),
            candidates,
            kept,
        };
        (kept, metrics)
    });

    let total_duration = clock.elapsed(&total_start);
    let summary = AnalysisSummary {
        nodes: graph.node_count(),
        waypoints: paths.waypoints,
        controls,
        blockades: paths.blockades,
        paths: paths.paths,
        legs: legs.len(),
        routes: solved.routes,
        kept_routes,
    };
    info!(
        paths = summary.paths,
        routes = summary.routes,
        kept = summary.kept_routes,
        elapsed_ms = duration_ms(total_duration),
        "analysis finished"
    );

    Ok(AnalysisDiagnostics {
        blockades,
        shortest_paths,
        control_neighbours,
        routes,
        filtering,
        total_duration,
        summary,
    })
}
