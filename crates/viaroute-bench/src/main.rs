//! viaroute-bench: CLI tool for route choice experiments and diagnostics.
//!
//! Loads a saved map state (nodes and courses), runs the full analysis
//! over every course leg with configurable filter thresholds and prints
//! detailed per-stage diagnostics. Useful for:
//!
//! - Tuning the diversity filters on a real map
//! - Measuring per-stage durations to identify bottlenecks
//! - Inspecting the ranked route choices of a single leg
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin viaroute-bench -- [OPTIONS] <STATE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod state;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use viaroute_engine::config::{
    DEFAULT_DISTANCE_THRESHOLD, DEFAULT_MAX_ROUTE_LENGTH_RATIO, DEFAULT_MAX_SAMENESS, DEFAULT_OUTLIER_THRESHOLD,
};
use viaroute_engine::geometry::DEFAULT_U_TURN_TOLERANCE;
use viaroute_engine::{
    AnalysisConfig, AnalysisDiagnostics, Clock, FilterConfig, Leg, MapGraph, RankedRoute, filter_routes,
    run_with_diagnostics, shortest_route_choices, suggest_legs,
};

use crate::state::LoadedState;

/// Route choice experiments and diagnostics for indoor orienteering maps.
///
/// Runs the analysis on every leg of the courses in a saved map state and
/// prints per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "viaroute-bench", version)]
struct Cli {
    /// Path to the JSON map state.
    state_path: PathBuf,

    /// Alternatives must be shorter than this multiple of the shortest route.
    #[arg(long, default_value_t = DEFAULT_MAX_ROUTE_LENGTH_RATIO)]
    max_route_length_ratio: f64,

    /// Turn cosine below which a path continuation counts as a U-turn.
    #[arg(long, default_value_t = DEFAULT_U_TURN_TOLERANCE, allow_hyphen_values = true)]
    u_turn_tolerance: f64,

    /// Outlier cut-off as a multiple of the median route length.
    #[arg(long, default_value_t = DEFAULT_OUTLIER_THRESHOLD)]
    outlier_threshold: f64,

    /// Base threshold of the elevation-weighted distance filter.
    #[arg(long, default_value_t = DEFAULT_DISTANCE_THRESHOLD)]
    distance_threshold: f64,

    /// Largest share of a shorter route another route may repeat (0-1).
    #[arg(long, default_value_t = DEFAULT_MAX_SAMENESS)]
    max_sameness: f64,

    /// Keep routes that repeat another route's paths.
    #[arg(long)]
    keep_duplicates: bool,

    /// Skip the median-based outlier cut.
    #[arg(long)]
    keep_outliers: bool,

    /// Keep routes that only add waypoints to another route.
    #[arg(long)]
    keep_basic_detours: bool,

    /// Skip the elevation-weighted distance filter.
    #[arg(long)]
    no_distance_filter: bool,

    /// Skip the sameness filter.
    #[arg(long)]
    no_sameness_filter: bool,

    /// Keep routes stitched together from two shorter routes.
    #[arg(long)]
    keep_crossover_detours: bool,

    /// Full analysis config as a JSON string.
    ///
    /// When provided, all other analysis parameter flags are ignored.
    /// The JSON must be a valid `AnalysisConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the ranked route choices between two nodes (state-file ids).
    ///
    /// The leg is analysed even if no course contains it.
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"], allow_hyphen_values = true)]
    leg: Option<Vec<i64>>,

    /// Print the legs worth analysing that no course asks for.
    #[arg(long)]
    suggest: bool,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Log more (`-v` info, `-vv` debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Build an [`AnalysisConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<AnalysisConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let mut filters = FilterConfig::default();
    filters.exclude_duplicates.enabled = !cli.keep_duplicates;
    filters.exclude_outliers_by_distance.enabled = !cli.keep_outliers;
    filters.exclude_outliers_by_distance.threshold = cli.outlier_threshold;
    filters.exclude_basic_detours.enabled = !cli.keep_basic_detours;
    filters.filter_by_distance.enabled = !cli.no_distance_filter;
    filters.filter_by_distance.threshold = cli.distance_threshold;
    filters.filter_by_sameness.enabled = !cli.no_sameness_filter;
    filters.filter_by_sameness.max_sameness = cli.max_sameness;
    filters.exclude_crossover_detours.enabled = !cli.keep_crossover_detours;

    Ok(AnalysisConfig {
        max_route_length_ratio: cli.max_route_length_ratio,
        u_turn_tolerance: cli.u_turn_tolerance,
        filters,
    })
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve `--leg FROM TO` against the loaded state.
fn requested_leg(cli: &Cli, state: &LoadedState) -> Result<Option<Leg>, String> {
    let Some(ids) = cli.leg.as_deref() else {
        return Ok(None);
    };
    let [from, to] = ids else {
        return Err(format!("--leg takes two node ids, got {}", ids.len()));
    };
    let resolve = |id: i64| state.node(id).ok_or_else(|| format!("--leg: no node with id {id}"));
    Ok(Some(Leg::new(resolve(*from)?, resolve(*to)?)))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let mut state = match state::load_state_file(&cli.state_path) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error loading {}: {e}", cli.state_path.display());
            return ExitCode::FAILURE;
        }
    };

    let leg = match requested_leg(&cli, &state) {
        Ok(leg) => leg,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let mut legs = state.course_legs();
    if let Some(leg) = leg
        && !legs.contains(&leg)
    {
        legs.push(leg);
    }

    eprintln!(
        "State: {} ({} nodes, {} courses)",
        cli.state_path.display(),
        state.graph.node_count(),
        state.courses.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Legs: {}", legs.len());
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match run_with_diagnostics(&mut state.graph, &legs, &config, &StdClock) {
            Ok(diagnostics) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Analysis error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    if !cli.json {
        print_course_summaries(&state);
    }

    if cli.suggest {
        print_suggestions(&state, &legs, &config);
    }

    if let Some(leg) = leg {
        let ranked = ranked_routes(&state.graph, leg, &config.filters);
        if cli.json {
            match serde_json::to_string_pretty(&ranked) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing routes: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            print_ranked_routes(leg, &ranked);
        }
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// The filtered, ranked routes stored for `leg`.
fn ranked_routes(graph: &MapGraph, leg: Leg, filters: &FilterConfig) -> Vec<RankedRoute> {
    let candidates = graph
        .control_facet(leg.from)
        .map(|facet| facet.routes_to(leg.to).to_vec())
        .unwrap_or_default();
    filter_routes(graph, candidates, filters)
}

fn print_ranked_routes(leg: Leg, ranked: &[RankedRoute]) {
    println!();
    println!("Routes {} -> {}\n{}", leg.from, leg.to, "=".repeat(60));
    if ranked.is_empty() {
        println!("No route found");
        return;
    }
    println!(
        "{:<6} {:<14} {:>12} {:>10} {:>10}",
        "Rank", "Colour", "Distance", "Climb", "Waypoints"
    );
    println!("{}", "-".repeat(56));
    for route in ranked {
        println!(
            "{:<6} {:<14} {:>10.1}m {:>10.1} {:>10}",
            route.rank,
            route.colour,
            route.distance,
            route.elevation_gain,
            route.route.waypoints().count(),
        );
    }
}

fn print_course_summaries(state: &LoadedState) {
    if state.courses.is_empty() {
        return;
    }
    println!();
    println!("{:<24} {:>6} {:>12} {:>10}", "Course", "Legs", "Shortest", "Climb");
    println!("{}", "-".repeat(56));
    for course in &state.courses {
        let legs = course.legs().len();
        match shortest_route_choices(&state.graph, course) {
            Some(summary) => println!(
                "{:<24} {legs:>6} {:>10.1}m {:>10.1}",
                course.name(),
                summary.distance,
                summary.elevation_gain,
            ),
            None => println!("{:<24} {legs:>6} {:>12} {:>10}", course.name(), "unsolved", "-"),
        }
    }
}

fn print_suggestions(state: &LoadedState, analysed: &[Leg], config: &AnalysisConfig) {
    let suggestions: Vec<Leg> = suggest_legs(&state.graph, config)
        .into_iter()
        .filter(|leg| !analysed.contains(leg) && !analysed.contains(&leg.reversed()))
        .collect();
    println!();
    println!("Suggested legs ({})", suggestions.len());
    for leg in suggestions {
        println!("  {} -> {}", leg.from, leg.to);
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&AnalysisDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[AnalysisDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Blockades", |d| d.blockades.duration),
        ("Shortest Paths", |d| d.shortest_paths.duration),
        ("Control Neighbours", |d| d.control_neighbours.duration),
        ("Routes", |d| d.routes.duration),
        ("Filtering", |d| d.filtering.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
