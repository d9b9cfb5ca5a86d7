//! JSON map state: nodes with their adjacency, plus courses.
//!
//! Node ids in a state file are arbitrary integers; they are remapped to
//! fresh [`NodeId`]s on load. Course references use `-1` for "none".

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use viaroute_engine::{Course, EngineError, Leg, MapGraph, MapScale, NodeId, NodeKind, Point, Relation};

/// Errors that can occur while loading a state file.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The state file could not be read.
    #[error("failed to read state: {0}")]
    Io(#[from] std::io::Error),

    /// The state file is not valid JSON for the state schema.
    #[error("failed to parse state: {0}")]
    Json(#[from] serde_json::Error),

    /// The graph rejected a node, connection or course.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A neighbour list or course names an id no node in the file has.
    #[error("{context} refers to unknown node id {id}")]
    UnknownReference { context: String, id: i64 },
}

/// Physical calibration of the scanned map the coordinates come from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapMeta {
    /// Scan resolution in pixels per inch.
    pub resolution: f64,
    /// Map scale denominator (`1:scale`).
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub id: i64,
    pub position: Point,
    #[serde(default)]
    pub normal_neighbours: Vec<i64>,
    #[serde(default)]
    pub portal_neighbours: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseData {
    #[serde(default)]
    pub name: String,
    #[serde(default = "no_node")]
    pub start: i64,
    #[serde(default)]
    pub controls: Vec<i64>,
    #[serde(default = "no_node")]
    pub finish: i64,
}

const fn no_node() -> i64 {
    -1
}

/// The on-disk state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateData {
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub courses: Vec<CourseData>,
    #[serde(default)]
    pub map: Option<MapMeta>,
}

/// A state file turned into a graph and its courses.
#[derive(Debug)]
pub struct LoadedState {
    pub graph: MapGraph,
    pub courses: Vec<Course>,
    ids: BTreeMap<i64, NodeId>,
}

impl LoadedState {
    /// The graph node a state-file id was loaded as.
    #[must_use]
    pub fn node(&self, file_id: i64) -> Option<NodeId> {
        self.ids.get(&file_id).copied()
    }

    /// Every leg of every course, each once, in course order.
    #[must_use]
    pub fn course_legs(&self) -> Vec<Leg> {
        let mut legs: Vec<Leg> = Vec::new();
        for leg in self.courses.iter().flat_map(Course::legs) {
            if !legs.contains(&leg) {
                legs.push(leg);
            }
        }
        legs
    }
}

/// Read and load a state file.
///
/// # Errors
///
/// Returns [`StateError`] if the file cannot be read, parsed or loaded.
pub fn load_state_file(path: &Path) -> Result<LoadedState, StateError> {
    let json = std::fs::read_to_string(path)?;
    let state = load_state(&json)?;
    info!(
        path = %path.display(),
        nodes = state.graph.node_count(),
        courses = state.courses.len(),
        "loaded state"
    );
    Ok(state)
}

/// Parse and load a state document.
///
/// # Errors
///
/// Returns [`StateError`] if the JSON is malformed or references unknown
/// nodes or non-control course entries.
pub fn load_state(json: &str) -> Result<LoadedState, StateError> {
    let data: StateData = serde_json::from_str(json)?;
    build_state(&data)
}

/// Build the graph and courses described by `data`.
///
/// # Errors
///
/// See [`load_state`].
pub fn build_state(data: &StateData) -> Result<LoadedState, StateError> {
    let scale = data
        .map
        .map_or(MapScale::IDENTITY, |meta| MapScale::from_print(meta.resolution, meta.scale));
    let mut graph = MapGraph::with_scale(scale);

    let mut ids = BTreeMap::new();
    for node in &data.nodes {
        let id = graph.add_node(node.position, node.kind);
        if ids.insert(node.id, id).is_some() {
            debug!(id = node.id, "duplicate node id, later node wins");
        }
    }

    let lookup = |context: &str, id: i64| {
        ids.get(&id).copied().ok_or_else(|| StateError::UnknownReference {
            context: context.to_owned(),
            id,
        })
    };

    for node in &data.nodes {
        let from = lookup("node", node.id)?;
        for (neighbours, relation) in [
            (&node.normal_neighbours, Relation::Normal),
            (&node.portal_neighbours, Relation::Portal),
        ] {
            for &neighbour in neighbours {
                let to = lookup(&format!("node {}", node.id), neighbour)?;
                graph.connect(from, to, relation)?;
            }
        }
    }

    let optional = |context: &str, id: i64| {
        if id < 0 { Ok(None) } else { lookup(context, id).map(Some) }
    };

    let mut courses = Vec::with_capacity(data.courses.len());
    for course in &data.courses {
        let context = format!("course {:?}", course.name);
        let start = optional(&context, course.start)?;
        let finish = optional(&context, course.finish)?;
        let controls = course
            .controls
            .iter()
            .map(|&id| lookup(&context, id))
            .collect::<Result<Vec<_>, _>>()?;
        courses.push(Course::from_parts(&graph, course.name.clone(), start, controls, finish)?);
    }

    Ok(LoadedState { graph, courses, ids })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const STATE: &str = r#"{
        "nodes": [
            { "type": "Start", "id": 10, "position": { "x": 0, "y": 0, "z": 0 },
              "normal_neighbours": [11], "portal_neighbours": [] },
            { "type": "Waypoint", "id": 11, "position": { "x": 10, "y": 0, "z": 0 },
              "normal_neighbours": [10, 12], "portal_neighbours": [13] },
            { "type": "Control", "id": 12, "position": { "x": 20, "y": 0, "z": 0 },
              "normal_neighbours": [11], "portal_neighbours": [] },
            { "type": "Normal", "id": 13, "position": { "x": 10, "y": 0, "z": 4 },
              "normal_neighbours": [14], "portal_neighbours": [11] },
            { "type": "Finish", "id": 14, "position": { "x": 10, "y": 8, "z": 4 },
              "normal_neighbours": [13], "portal_neighbours": [] }
        ],
        "courses": [
            { "type": "Course", "id": 0, "name": "Short", "start": 10, "controls": [12], "finish": 14 },
            { "name": "Open", "start": -1, "controls": [], "finish": -1 }
        ]
    }"#;

    // --- load_state tests ---

    #[test]
    fn loads_nodes_and_connections() {
        let state = load_state(STATE).unwrap();
        assert_eq!(state.graph.node_count(), 5);

        let waypoint = state.node(11).unwrap();
        let upstairs = state.node(13).unwrap();
        assert!(state.graph.has_neighbour(waypoint, state.node(10).unwrap(), Relation::Normal));
        assert!(state.graph.has_neighbour(waypoint, upstairs, Relation::Portal));
        assert!(state.graph.has_neighbour(upstairs, waypoint, Relation::Portal));
        assert_eq!(state.graph.node(state.node(14).unwrap()).unwrap().kind(), NodeKind::Finish);
        assert!(state.node(99).is_none());
    }

    #[test]
    fn loads_courses_with_missing_ends() {
        let state = load_state(STATE).unwrap();
        assert_eq!(state.courses.len(), 2);

        let short = &state.courses[0];
        assert_eq!(short.name(), "Short");
        assert_eq!(short.start(), state.node(10));
        assert_eq!(short.finish(), state.node(14));
        assert_eq!(short.controls(), &[state.node(12).unwrap()]);

        let open = &state.courses[1];
        assert_eq!(open.start(), None);
        assert_eq!(open.finish(), None);
        assert!(open.legs().is_empty());
    }

    #[test]
    fn course_legs_are_deduplicated() {
        let state = load_state(STATE).unwrap();
        let legs = state.course_legs();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0], Leg::new(state.node(10).unwrap(), state.node(12).unwrap()));
        assert_eq!(legs[1], Leg::new(state.node(12).unwrap(), state.node(14).unwrap()));
    }

    #[test]
    fn map_meta_sets_the_scale() {
        let json = r#"{ "nodes": [], "map": { "resolution": 300, "scale": 750 } }"#;
        let state = load_state(json).unwrap();
        let expected = 750.0 / 300.0 * 0.0254;
        assert!((state.graph.scale().meters_per_unit - expected).abs() < 1e-12);
        assert!(state.courses.is_empty());
    }

    #[test]
    fn unknown_neighbour_is_rejected() {
        let json = r#"{ "nodes": [
            { "type": "Normal", "id": 1, "position": { "x": 0, "y": 0 },
              "normal_neighbours": [2], "portal_neighbours": [] }
        ] }"#;
        let err = load_state(json).unwrap_err();
        assert!(matches!(err, StateError::UnknownReference { id: 2, .. }));
    }

    #[test]
    fn non_control_in_course_is_rejected() {
        let json = r#"{
            "nodes": [ { "type": "Waypoint", "id": 1, "position": { "x": 0, "y": 0 } } ],
            "courses": [ { "name": "Bad", "start": 1, "controls": [], "finish": -1 } ]
        }"#;
        let err = load_state(json).unwrap_err();
        assert!(matches!(err, StateError::Engine(EngineError::NotAControl(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(load_state("{ nodes: "), Err(StateError::Json(_))));
    }
}
