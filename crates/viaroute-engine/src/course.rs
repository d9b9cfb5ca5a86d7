//! Courses: a start, an ordered list of controls and a finish.
//!
//! A course only stores node ids. It is checked against a graph when
//! built or edited, but keeps no reference to it, so the graph can be
//! mutated freely between analyses.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::filter::routes_between_controls;
use crate::graph::MapGraph;
use crate::route::Route;
use crate::types::{EngineError, NodeId};

/// An ordered pair of controls to find routes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Leg {
    pub from: NodeId,
    pub to: NodeId,
}

impl Leg {
    #[must_use]
    pub const fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub const fn reversed(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

/// A position along a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseIndex {
    Start,
    /// Zero-based position in the full sequence (start included).
    At(usize),
    Finish,
}

/// An orienteering course.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Course {
    name: String,
    start: Option<NodeId>,
    controls: Vec<NodeId>,
    finish: Option<NodeId>,
    /// Start, controls and finish, in running order.
    sequence: Vec<NodeId>,
    selected_leg: usize,
}

impl Course {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build a complete course, checking every entry is a control.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownNode`] or [`EngineError::NotAControl`]
    /// for the first offending entry.
    pub fn from_parts(
        graph: &MapGraph,
        name: impl Into<String>,
        start: Option<NodeId>,
        controls: impl IntoIterator<Item = NodeId>,
        finish: Option<NodeId>,
    ) -> Result<Self, EngineError> {
        let controls: Vec<NodeId> = controls.into_iter().collect();
        for id in start.iter().chain(&controls).chain(finish.iter()) {
            check_control(graph, *id)?;
        }
        let mut course = Self {
            name: name.into(),
            start,
            controls,
            finish,
            ..Self::default()
        };
        course.rebuild();
        Ok(course)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub const fn start(&self) -> Option<NodeId> {
        self.start
    }

    #[must_use]
    pub const fn finish(&self) -> Option<NodeId> {
        self.finish
    }

    /// The controls between start and finish.
    #[must_use]
    pub fn controls(&self) -> &[NodeId] {
        &self.controls
    }

    /// Start, controls and finish in running order.
    #[must_use]
    pub fn sequence(&self) -> &[NodeId] {
        &self.sequence
    }

    #[must_use]
    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    /// # Errors
    ///
    /// Returns an error if `start` is not a control in `graph`.
    pub fn set_start(&mut self, graph: &MapGraph, start: Option<NodeId>) -> Result<(), EngineError> {
        if let Some(id) = start {
            check_control(graph, id)?;
        }
        self.start = start;
        self.rebuild();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `finish` is not a control in `graph`.
    pub fn set_finish(&mut self, graph: &MapGraph, finish: Option<NodeId>) -> Result<(), EngineError> {
        if let Some(id) = finish {
            check_control(graph, id)?;
        }
        self.finish = finish;
        self.rebuild();
        Ok(())
    }

    /// Append a control before the finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `control` is not a control in `graph`.
    pub fn push_control(&mut self, graph: &MapGraph, control: NodeId) -> Result<(), EngineError> {
        self.insert_control(graph, self.controls.len(), control)
    }

    /// Insert a control at `index` among the controls (clamped to the end).
    ///
    /// # Errors
    ///
    /// Returns an error if `control` is not a control in `graph`.
    pub fn insert_control(&mut self, graph: &MapGraph, index: usize, control: NodeId) -> Result<(), EngineError> {
        check_control(graph, control)?;
        let index = index.min(self.controls.len());
        self.controls.insert(index, control);
        self.rebuild();
        Ok(())
    }

    /// Remove the last visit to `control`. Returns whether it was found.
    pub fn remove_control(&mut self, control: NodeId) -> bool {
        let Some(index) = self.controls.iter().rposition(|&id| id == control) else {
            return false;
        };
        self.controls.remove(index);
        self.rebuild();
        true
    }

    /// Drop every reference to `node`, e.g. after it left the graph.
    pub fn forget_node(&mut self, node: NodeId) {
        if self.start == Some(node) {
            self.start = None;
        }
        if self.finish == Some(node) {
            self.finish = None;
        }
        self.controls.retain(|&id| id != node);
        self.rebuild();
    }

    /// Collapse repeated controls and reset the leg selection.
    fn rebuild(&mut self) {
        self.controls.dedup();
        self.sequence = self
            .start
            .iter()
            .chain(&self.controls)
            .chain(self.finish.iter())
            .copied()
            .collect();
        self.sequence.dedup();
        self.selected_leg = 0;
    }

    fn bounded(&self, index: CourseIndex) -> usize {
        let last = self.sequence.len().saturating_sub(1);
        match index {
            CourseIndex::Start => 0,
            CourseIndex::Finish => last,
            CourseIndex::At(n) => n.min(last),
        }
    }

    /// The controls from `begin` to `end` inclusive, clamped into the
    /// course. A reversed range gives the controls in reverse order.
    #[must_use]
    pub fn segment(&self, begin: CourseIndex, end: CourseIndex) -> Vec<NodeId> {
        if self.sequence.is_empty() {
            return Vec::new();
        }
        let begin = self.bounded(begin);
        let end = self.bounded(end);
        if begin <= end {
            self.sequence[begin..=end].to_vec()
        } else {
            self.sequence[end..=begin].iter().rev().copied().collect()
        }
    }

    /// Every consecutive pair of the running order.
    #[must_use]
    pub fn legs(&self) -> Vec<Leg> {
        self.sequence
            .windows(2)
            .map(|pair| Leg::new(pair[0], pair[1]))
            .collect()
    }

    /// Whether the course runs directly from `leg.from` to `leg.to`.
    #[must_use]
    pub fn has_leg(&self, leg: Leg) -> bool {
        self.sequence
            .windows(2)
            .any(|pair| pair[0] == leg.from && pair[1] == leg.to)
    }

    #[must_use]
    pub fn has_control(&self, control: NodeId) -> bool {
        self.sequence.contains(&control)
    }

    /// The distinct controls between start and finish.
    #[must_use]
    pub fn unique_controls(&self) -> BTreeSet<NodeId> {
        self.controls.iter().copied().collect()
    }

    /// Orient a pair of selected controls the way the course runs them.
    /// If the course never runs `a` straight to `b`, the pair is flipped.
    #[must_use]
    pub fn ordered_selection(&self, a: NodeId, b: NodeId) -> Leg {
        let leg = Leg::new(a, b);
        if self.has_leg(leg) { leg } else { leg.reversed() }
    }

    /// Index of the first control of the selected leg.
    #[must_use]
    pub const fn selected_leg_index(&self) -> usize {
        self.selected_leg
    }

    /// The selected leg, if the course has at least two controls.
    #[must_use]
    pub fn selected_leg(&self) -> Option<Leg> {
        let from = *self.sequence.get(self.selected_leg)?;
        let to = *self.sequence.get(self.selected_leg + 1)?;
        Some(Leg::new(from, to))
    }

    /// Move to the next leg, wrapping to the first after the last.
    /// Courses with a single leg keep it selected.
    pub const fn select_next_leg(&mut self) {
        if self.sequence.len() < 3 {
            return;
        }
        if self.selected_leg + 3 > self.sequence.len() {
            self.selected_leg = 0;
        } else {
            self.selected_leg += 1;
        }
    }

    /// Move to the previous leg, wrapping to the last after the first.
    pub const fn select_previous_leg(&mut self) {
        if self.sequence.len() < 3 {
            return;
        }
        if self.selected_leg == 0 {
            self.selected_leg = self.sequence.len() - 2;
        } else {
            self.selected_leg -= 1;
        }
    }
}

fn check_control(graph: &MapGraph, id: NodeId) -> Result<(), EngineError> {
    let node = graph.node(id).ok_or(EngineError::UnknownNode(id))?;
    if node.is_control() {
        Ok(())
    } else {
        Err(EngineError::NotAControl(id))
    }
}

/// The shortest stored route of every leg of a course, with totals.
#[derive(Debug, Clone)]
pub struct CourseSummary {
    pub routes: Vec<Arc<Route>>,
    /// Metres.
    pub distance: f64,
    pub elevation_gain: f64,
}

/// Sum the shortest stored route of every leg.
///
/// Returns `None` if any leg has no stored route. Reads the route tables
/// filled by [`compute_all_routes`](crate::alternatives::compute_all_routes).
#[must_use]
pub fn shortest_route_choices(graph: &MapGraph, course: &Course) -> Option<CourseSummary> {
    let mut summary = CourseSummary {
        routes: Vec::new(),
        distance: 0.0,
        elevation_gain: 0.0,
    };
    for leg in course.legs() {
        let shortest = routes_between_controls(graph, &[leg.from, leg.to])
            .into_iter()
            .min_by(|a, b| Route::cmp_by_distance(a, b))?;
        summary.distance += shortest.distance();
        summary.elevation_gain += shortest.elevation_gain();
        summary.routes.push(shortest);
    }
    Some(summary)
}
