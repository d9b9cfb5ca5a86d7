//! The navigation graph: an arena of map nodes with normal and portal
//! adjacency.
//!
//! Nodes live in a `Vec<Option<MapNode>>` indexed by [`NodeId`]. A
//! removed node leaves a tombstone so ids are never reused. Adjacency is
//! stored as id sets on both endpoints and every edit keeps the two
//! sides symmetric.
//!
//! Waypoint nodes own a [`WaypointFacet`] (shortest paths to the next
//! waypoints) and control nodes additionally own a [`ControlFacet`]
//! (candidate routes to other controls). Both tables are rewritten
//! wholesale by each analysis run.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use tracing::debug;

use crate::path::Path;
use crate::route::Route;
use crate::types::{EngineError, IdAllocator, MapScale, NodeId, PathId, Point, Relation, RouteId};

/// What a node is on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeKind {
    /// Plain corridor geometry.
    #[default]
    Normal,
    /// A decision point (junction, doorway) that route search can stop at.
    Waypoint,
    /// An orienteering control.
    Control,
    /// The course start. Also a control.
    Start,
    /// The course finish. Also a control.
    Finish,
    /// One end of a wall segment that paths may not cross.
    Blockade,
}

impl NodeKind {
    /// Waypoints, controls, start and finish all carry a path table.
    #[must_use]
    pub const fn is_waypoint(self) -> bool {
        matches!(
            self,
            Self::Waypoint | Self::Control | Self::Start | Self::Finish
        )
    }

    /// Controls, start and finish all carry a route table.
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Control | Self::Start | Self::Finish)
    }

    #[must_use]
    pub const fn is_blockade(self) -> bool {
        matches!(self, Self::Blockade)
    }
}

/// Shortest paths from a waypoint to each waypoint directly reachable
/// without passing through another waypoint.
///
/// Each list is kept sorted by ascending distance.
#[derive(Debug, Clone, Default)]
pub struct WaypointFacet {
    paths: BTreeMap<NodeId, Vec<Arc<Path>>>,
}

impl WaypointFacet {
    /// Waypoints this one has at least one path to.
    pub fn neighbours(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.paths.keys().copied()
    }

    /// `(neighbour, paths)` entries in neighbour id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &[Arc<Path>])> + '_ {
        self.paths.iter().map(|(&id, paths)| (id, paths.as_slice()))
    }

    #[must_use]
    pub fn has_neighbour(&self, waypoint: NodeId) -> bool {
        self.paths.contains_key(&waypoint)
    }

    /// All paths to `waypoint`, shortest first.
    #[must_use]
    pub fn paths_to(&self, waypoint: NodeId) -> &[Arc<Path>] {
        self.paths.get(&waypoint).map_or(&[], Vec::as_slice)
    }

    /// The shortest path to `waypoint`, if any.
    #[must_use]
    pub fn shortest_path(&self, waypoint: NodeId) -> Option<&Arc<Path>> {
        self.paths.get(&waypoint).and_then(|paths| paths.first())
    }

    /// Number of neighbouring waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Total number of stored paths.
    #[must_use]
    pub fn path_count(&self) -> usize {
        self.paths.values().map(Vec::len).sum()
    }

    pub(crate) fn add_path(&mut self, to: NodeId, path: Arc<Path>) {
        let paths = self.paths.entry(to).or_default();
        let at = paths.partition_point(|p| p.distance() <= path.distance());
        paths.insert(at, path);
    }

    pub(crate) fn forget(&mut self, waypoint: NodeId) {
        self.paths.remove(&waypoint);
    }

    pub(crate) fn clear(&mut self) {
        self.paths.clear();
    }
}

/// Candidate routes from a control to every control reachable through
/// the waypoint graph.
///
/// A neighbour entry exists (possibly empty) for each reachable control;
/// routes are only filled in for legs that were solved.
#[derive(Debug, Clone, Default)]
pub struct ControlFacet {
    routes: BTreeMap<NodeId, Vec<Arc<Route>>>,
}

impl ControlFacet {
    pub fn neighbours(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.routes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &[Arc<Route>])> + '_ {
        self.routes.iter().map(|(&id, routes)| (id, routes.as_slice()))
    }

    #[must_use]
    pub fn has_neighbour(&self, control: NodeId) -> bool {
        self.routes.contains_key(&control)
    }

    #[must_use]
    pub fn routes_to(&self, control: NodeId) -> &[Arc<Route>] {
        self.routes.get(&control).map_or(&[], Vec::as_slice)
    }

    /// The shortest stored route to `control`.
    #[must_use]
    pub fn shortest_route(&self, control: NodeId) -> Option<&Arc<Route>> {
        self.routes_to(control)
            .iter()
            .min_by(|a, b| a.distance().total_cmp(&b.distance()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn insert_neighbour(&mut self, control: NodeId) {
        self.routes.entry(control).or_default();
    }

    pub(crate) fn set_routes(&mut self, control: NodeId, routes: Vec<Arc<Route>>) {
        self.routes.insert(control, routes);
    }

    pub(crate) fn forget(&mut self, control: NodeId) {
        self.routes.remove(&control);
    }

    pub(crate) fn clear(&mut self) {
        self.routes.clear();
    }
}

/// A node of the navigation graph.
#[derive(Debug, Clone)]
pub struct MapNode {
    id: NodeId,
    position: Point,
    kind: NodeKind,
    normal: BTreeSet<NodeId>,
    portal: BTreeSet<NodeId>,
    waypoint: Option<WaypointFacet>,
    control: Option<ControlFacet>,
}

impl MapNode {
    fn new(id: NodeId, position: Point, kind: NodeKind) -> Self {
        let mut node = Self {
            id,
            position,
            kind,
            normal: BTreeSet::new(),
            portal: BTreeSet::new(),
            waypoint: None,
            control: None,
        };
        node.apply_kind(kind);
        node
    }

    fn apply_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
        if kind.is_waypoint() {
            self.waypoint.get_or_insert_with(WaypointFacet::default);
        } else {
            self.waypoint = None;
        }
        if kind.is_control() {
            self.control.get_or_insert_with(ControlFacet::default);
        } else {
            self.control = None;
        }
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub const fn position(&self) -> Point {
        self.position
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub const fn is_waypoint(&self) -> bool {
        self.kind.is_waypoint()
    }

    #[must_use]
    pub const fn is_control(&self) -> bool {
        self.kind.is_control()
    }

    #[must_use]
    pub const fn is_start(&self) -> bool {
        matches!(self.kind, NodeKind::Start)
    }

    #[must_use]
    pub const fn is_finish(&self) -> bool {
        matches!(self.kind, NodeKind::Finish)
    }

    #[must_use]
    pub const fn is_blockade(&self) -> bool {
        self.kind.is_blockade()
    }

    /// The path table, present on waypoints.
    #[must_use]
    pub const fn waypoint(&self) -> Option<&WaypointFacet> {
        self.waypoint.as_ref()
    }

    /// The route table, present on controls.
    #[must_use]
    pub const fn control(&self) -> Option<&ControlFacet> {
        self.control.as_ref()
    }

    pub fn normal_neighbours(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.normal.iter().copied()
    }

    pub fn portal_neighbours(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.portal.iter().copied()
    }

    /// Every neighbour with the kind of edge leading to it.
    pub fn adjacency(&self) -> impl Iterator<Item = (NodeId, Relation)> + '_ {
        self.normal
            .iter()
            .map(|&id| (id, Relation::Normal))
            .chain(self.portal.iter().map(|&id| (id, Relation::Portal)))
    }

    /// The kind of edge to `other`, if the two are adjacent.
    #[must_use]
    pub fn relation_to(&self, other: NodeId) -> Option<Relation> {
        if self.normal.contains(&other) {
            Some(Relation::Normal)
        } else if self.portal.contains(&other) {
            Some(Relation::Portal)
        } else {
            None
        }
    }

    #[must_use]
    pub fn has_neighbour(&self, other: NodeId, relation: Relation) -> bool {
        match relation {
            Relation::Normal => self.normal.contains(&other),
            Relation::Portal => self.portal.contains(&other),
        }
    }

    #[must_use]
    pub fn degree(&self) -> usize {
        self.normal.len() + self.portal.len()
    }

    fn neighbours_mut(&mut self, relation: Relation) -> &mut BTreeSet<NodeId> {
        match relation {
            Relation::Normal => &mut self.normal,
            Relation::Portal => &mut self.portal,
        }
    }
}

/// The navigation graph.
#[derive(Debug, Clone, Default)]
pub struct MapGraph {
    nodes: Vec<Option<MapNode>>,
    live: usize,
    scale: MapScale,
    path_ids: IdAllocator,
    route_ids: IdAllocator,
}

impl MapGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty graph measuring distances with `scale`.
    #[must_use]
    pub fn with_scale(scale: MapScale) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn scale(&self) -> MapScale {
        self.scale
    }

    /// Change the map scale. Stored paths keep the distances they were
    /// measured with until the next analysis run.
    pub const fn set_scale(&mut self, scale: MapScale) {
        self.scale = scale;
    }

    /// Add a node and return its fresh id.
    pub fn add_node(&mut self, position: Point, kind: NodeKind) -> NodeId {
        let raw = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        let id = NodeId::new(raw);
        self.nodes.push(Some(MapNode::new(id, position, kind)));
        self.live += 1;
        id
    }

    /// Remove a node, dropping every edge and table entry that refers
    /// to it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownNode`] if `id` is not in the graph.
    pub fn remove_node(&mut self, id: NodeId) -> Result<MapNode, EngineError> {
        let removed = self
            .nodes
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(EngineError::UnknownNode(id))?;
        self.live -= 1;

        for (neighbour, relation) in removed.adjacency() {
            if let Some(node) = self.node_slot_mut(neighbour) {
                node.neighbours_mut(relation).remove(&id);
            }
        }
        for node in self.nodes.iter_mut().flatten() {
            if let Some(facet) = node.waypoint.as_mut() {
                facet.forget(id);
            }
            if let Some(facet) = node.control.as_mut() {
                facet.forget(id);
            }
        }
        debug!(node = %id, "removed node");
        Ok(removed)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&MapNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    fn node_slot_mut(&mut self, id: NodeId) -> Option<&mut MapNode> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn require_mut(&mut self, id: NodeId) -> Result<&mut MapNode, EngineError> {
        self.node_slot_mut(id).ok_or(EngineError::UnknownNode(id))
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    #[must_use]
    pub fn position(&self, id: NodeId) -> Option<Point> {
        self.node(id).map(MapNode::position)
    }

    /// Move a node.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownNode`] if `id` is not in the graph.
    pub fn set_position(&mut self, id: NodeId, position: Point) -> Result<(), EngineError> {
        self.require_mut(id)?.position = position;
        Ok(())
    }

    /// Change what a node is. Gaining or losing waypoint/control status
    /// creates or drops the corresponding table.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownNode`] if `id` is not in the graph.
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) -> Result<(), EngineError> {
        self.require_mut(id)?.apply_kind(kind);
        Ok(())
    }

    /// Live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &MapNode> + '_ {
        self.nodes.iter().flatten()
    }

    /// Number of live nodes.
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.live
    }

    /// One past the highest id ever handed out; sizes per-node scratch
    /// buffers.
    #[must_use]
    pub const fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn waypoints(&self) -> impl Iterator<Item = &MapNode> + '_ {
        self.nodes().filter(|node| node.is_waypoint())
    }

    pub fn controls(&self) -> impl Iterator<Item = &MapNode> + '_ {
        self.nodes().filter(|node| node.is_control())
    }

    pub fn blockade_nodes(&self) -> impl Iterator<Item = &MapNode> + '_ {
        self.nodes().filter(|node| node.is_blockade())
    }

    #[must_use]
    pub fn is_waypoint(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(MapNode::is_waypoint)
    }

    #[must_use]
    pub fn is_control(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(MapNode::is_control)
    }

    /// The path table of a waypoint.
    #[must_use]
    pub fn waypoint_facet(&self, id: NodeId) -> Option<&WaypointFacet> {
        self.node(id).and_then(MapNode::waypoint)
    }

    /// The route table of a control.
    #[must_use]
    pub fn control_facet(&self, id: NodeId) -> Option<&ControlFacet> {
        self.node(id).and_then(MapNode::control)
    }

    pub(crate) fn waypoint_facet_mut(&mut self, id: NodeId) -> Option<&mut WaypointFacet> {
        self.node_slot_mut(id).and_then(|node| node.waypoint.as_mut())
    }

    pub(crate) fn control_facet_mut(&mut self, id: NodeId) -> Option<&mut ControlFacet> {
        self.node_slot_mut(id).and_then(|node| node.control.as_mut())
    }

    /// Connect two nodes with an edge of the given kind.
    ///
    /// Connecting nodes that are already adjacent (by either kind of
    /// edge) is a no-op; disconnect first to change the edge kind.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownNode`] if either node is missing and
    /// [`EngineError::SelfConnection`] if `a == b`.
    pub fn connect(&mut self, a: NodeId, b: NodeId, relation: Relation) -> Result<(), EngineError> {
        if a == b {
            return Err(EngineError::SelfConnection(a));
        }
        if !self.contains(b) {
            return Err(EngineError::UnknownNode(b));
        }
        let from = self.require_mut(a)?;
        if from.relation_to(b).is_some() {
            return Ok(());
        }
        from.neighbours_mut(relation).insert(b);
        self.require_mut(b)?.neighbours_mut(relation).insert(a);
        Ok(())
    }

    /// Remove any edge between two nodes. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownNode`] if either node is missing.
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) -> Result<bool, EngineError> {
        if !self.contains(b) {
            return Err(EngineError::UnknownNode(b));
        }
        let from = self.require_mut(a)?;
        let existed = from.normal.remove(&b) | from.portal.remove(&b);
        let to = self.require_mut(b)?;
        to.normal.remove(&a);
        to.portal.remove(&a);
        Ok(existed)
    }

    /// The kind of edge between two nodes, if adjacent.
    #[must_use]
    pub fn relation(&self, a: NodeId, b: NodeId) -> Option<Relation> {
        self.node(a).and_then(|node| node.relation_to(b))
    }

    #[must_use]
    pub fn has_neighbour(&self, a: NodeId, b: NodeId, relation: Relation) -> bool {
        self.node(a).is_some_and(|node| node.has_neighbour(b, relation))
    }

    /// Length of the hop `a -> b` in metres: zero across a portal, the
    /// scaled planar distance otherwise.
    #[must_use]
    pub fn hop_distance(&self, a: NodeId, b: NodeId) -> f64 {
        match (self.relation(a, b), self.position(a), self.position(b)) {
            (Some(Relation::Portal), _, _) => 0.0,
            (_, Some(from), Some(to)) => self.scale.to_meters(from.planar_distance(to)),
            _ => 0.0,
        }
    }

    /// A stable hash over the graph structure: node ids, kinds,
    /// positions, adjacency and scale.
    ///
    /// Stored tables are only valid for the fingerprint they were
    /// computed against.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = SipHasher13::new();
        self.scale.meters_per_unit.to_bits().hash(&mut hasher);
        for node in self.nodes() {
            node.id.hash(&mut hasher);
            node.kind.hash(&mut hasher);
            node.position.x.to_bits().hash(&mut hasher);
            node.position.y.to_bits().hash(&mut hasher);
            node.position.z.to_bits().hash(&mut hasher);
            node.normal.len().hash(&mut hasher);
            for id in &node.normal {
                id.hash(&mut hasher);
            }
            node.portal.len().hash(&mut hasher);
            for id in &node.portal {
                id.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    pub(crate) fn next_path_id(&self) -> PathId {
        PathId::new(self.path_ids.allocate())
    }

    pub(crate) fn next_route_id(&self) -> RouteId {
        RouteId::new(self.route_ids.allocate())
    }
}
