//! Node-level paths between waypoints.

use serde::Serialize;

use crate::graph::MapGraph;
use crate::types::{NodeId, PathId, Relation};

/// One step of a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hop {
    /// Kind of edge walked.
    pub relation: Relation,
    /// Length in metres (zero for portals).
    pub distance: f64,
    /// Signed elevation change.
    pub climb: f64,
}

/// A maximal run of consecutive hops of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSegment {
    pub relation: Relation,
    pub nodes: Vec<NodeId>,
}

/// An ordered sequence of adjacent nodes.
///
/// Hops are measured against the graph when nodes are pushed, so
/// [`distance`](Self::distance) and
/// [`elevation_gain`](Self::elevation_gain) always describe the current
/// node list. Equality is identity: two paths are equal only if they
/// share a [`PathId`].
#[derive(Debug, Clone, Serialize)]
pub struct Path {
    id: PathId,
    nodes: Vec<NodeId>,
    waypoints: Vec<NodeId>,
    hops: Vec<Hop>,
    distance: f64,
    elevation_gain: f64,
}

impl Path {
    /// An empty path with a fresh id.
    #[must_use]
    pub fn new(graph: &MapGraph) -> Self {
        Self {
            id: graph.next_path_id(),
            nodes: Vec::new(),
            waypoints: Vec::new(),
            hops: Vec::new(),
            distance: 0.0,
            elevation_gain: 0.0,
        }
    }

    /// A path through `nodes`, in order.
    #[must_use]
    pub fn from_nodes(graph: &MapGraph, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let mut path = Self::new(graph);
        for node in nodes {
            path.push(graph, node);
        }
        path
    }

    /// Append a node, measuring the hop from the current end.
    pub fn push(&mut self, graph: &MapGraph, node: NodeId) {
        if let Some(&last) = self.nodes.last() {
            let relation = graph.relation(last, node);
            debug_assert!(relation.is_some(), "path hop {last} -> {node} is not an edge");
            let climb = match (graph.position(last), graph.position(node)) {
                (Some(from), Some(to)) => from.climb_to(to),
                _ => 0.0,
            };
            self.hops.push(Hop {
                relation: relation.unwrap_or(Relation::Normal),
                distance: graph.hop_distance(last, node),
                climb,
            });
        }
        if graph.is_waypoint(node) {
            self.waypoints.push(node);
        }
        self.nodes.push(node);
        self.measure();
    }

    /// Remove the last node.
    pub fn pop(&mut self) -> Option<NodeId> {
        let node = self.nodes.pop()?;
        self.hops.pop();
        if self.waypoints.last() == Some(&node) {
            self.waypoints.pop();
        }
        self.measure();
        Some(node)
    }

    fn measure(&mut self) {
        self.distance = self.hops.iter().map(|hop| hop.distance).sum();
        self.elevation_gain = self.hops.iter().map(|hop| hop.climb.max(0.0)).sum();
    }

    #[must_use]
    pub const fn id(&self) -> PathId {
        self.id
    }

    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The waypoints on this path, in order.
    #[must_use]
    pub fn waypoints(&self) -> &[NodeId] {
        &self.waypoints
    }

    #[must_use]
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Length in metres.
    #[must_use]
    pub const fn distance(&self) -> f64 {
        self.distance
    }

    /// Sum of positive elevation changes along the path.
    #[must_use]
    pub const fn elevation_gain(&self) -> f64 {
        self.elevation_gain
    }

    #[must_use]
    pub fn from(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    #[must_use]
    pub fn to(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The first node after the start.
    #[must_use]
    pub fn second_node(&self) -> Option<NodeId> {
        self.nodes.get(1).copied()
    }

    /// The last node before the end.
    #[must_use]
    pub fn penultimate_node(&self) -> Option<NodeId> {
        self.nodes.len().checked_sub(2).map(|i| self.nodes[i])
    }

    #[must_use]
    pub fn first_hop(&self) -> Option<&Hop> {
        self.hops.first()
    }

    #[must_use]
    pub fn last_hop(&self) -> Option<&Hop> {
        self.hops.last()
    }

    /// Distance covered by the first `nodes` nodes.
    #[must_use]
    pub fn prefix_distance(&self, nodes: usize) -> f64 {
        self.hops
            .iter()
            .take(nodes.saturating_sub(1))
            .map(|hop| hop.distance)
            .sum()
    }

    /// Split into maximal runs of the same edge kind. Adjacent segments
    /// share their boundary node.
    #[must_use]
    pub fn segments(&self) -> Vec<PathSegment> {
        let mut segments: Vec<PathSegment> = Vec::new();
        for (i, hop) in self.hops.iter().enumerate() {
            let next = self.nodes[i + 1];
            match segments.last_mut() {
                Some(segment) if segment.relation == hop.relation => segment.nodes.push(next),
                _ => segments.push(PathSegment {
                    relation: hop.relation,
                    nodes: vec![self.nodes[i], next],
                }),
            }
        }
        segments
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Path {}
