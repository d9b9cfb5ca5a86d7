//! Blockades: wall segments that normal edges may not cross.
//!
//! A blockade is a pair of adjacent blockade nodes. The set is indexed in
//! an R-tree so each edge test only checks walls whose bounding boxes
//! overlap the edge.

use std::collections::BTreeSet;

use geo::Line;
use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject};
use tracing::debug;

use crate::geometry::{planar_line, segments_cross};
use crate::graph::MapGraph;
use crate::types::{NodeId, Point};

/// One wall segment between two blockade nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Blockade {
    pub a: NodeId,
    pub b: NodeId,
    pub line: Line<f64>,
}

impl Blockade {
    /// Whether the segment `from -> to` strictly crosses this wall.
    #[must_use]
    pub fn obstructs(&self, from: Point, to: Point) -> bool {
        segments_cross(self.line, planar_line(from, to))
    }
}

type IndexedLine = GeomWithData<Line<f64>, usize>;

/// All blockades of a graph, spatially indexed.
#[derive(Debug, Clone)]
pub struct BlockadeSet {
    blockades: Vec<Blockade>,
    index: RTree<IndexedLine>,
}

impl BlockadeSet {
    /// Index a list of blockades.
    #[must_use]
    pub fn new(blockades: Vec<Blockade>) -> Self {
        let lines = blockades
            .iter()
            .enumerate()
            .map(|(i, blockade)| GeomWithData::new(blockade.line, i))
            .collect();
        Self {
            blockades,
            index: RTree::bulk_load(lines),
        }
    }

    /// Pair up adjacent blockade nodes.
    ///
    /// Blockade nodes are visited in id order; each pairs with every
    /// adjacent blockade node not yet visited, so every wall appears
    /// exactly once.
    #[must_use]
    pub fn from_graph(graph: &MapGraph) -> Self {
        let mut remaining: BTreeSet<NodeId> = graph.blockade_nodes().map(|n| n.id()).collect();
        let mut blockades = Vec::new();

        for node in graph.blockade_nodes() {
            for (neighbour, _) in node.adjacency() {
                if !remaining.contains(&neighbour) {
                    continue;
                }
                let Some(other) = graph.node(neighbour) else {
                    continue;
                };
                blockades.push(Blockade {
                    a: node.id(),
                    b: neighbour,
                    line: planar_line(node.position(), other.position()),
                });
            }
            remaining.remove(&node.id());
        }

        debug!(count = blockades.len(), "built blockades");
        Self::new(blockades)
    }

    /// Whether any blockade strictly crosses the segment `from -> to`.
    #[must_use]
    pub fn obstructs(&self, from: Point, to: Point) -> bool {
        if self.blockades.is_empty() {
            return false;
        }
        let line = planar_line(from, to);
        let envelope = line.envelope();
        self.index
            .locate_in_envelope_intersecting(&envelope)
            .any(|candidate| segments_cross(*candidate.geom(), line))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blockades.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blockades.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Blockade> + '_ {
        self.blockades.iter()
    }
}

impl Default for BlockadeSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use crate::types::Relation;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y, 0.0)
    }

    /// A vertical wall from (5,-5) to (5,5).
    fn walled_graph() -> MapGraph {
        let mut graph = MapGraph::new();
        let top = graph.add_node(p(5.0, 5.0), NodeKind::Blockade);
        let bottom = graph.add_node(p(5.0, -5.0), NodeKind::Blockade);
        graph.connect(top, bottom, Relation::Normal).unwrap();
        graph
    }

    #[test]
    fn pairs_each_wall_once() {
        let mut graph = walled_graph();
        let third = graph.add_node(p(10.0, 5.0), NodeKind::Blockade);
        graph.connect(NodeId::new(0), third, Relation::Normal).unwrap();
        graph.connect(NodeId::new(1), third, Relation::Normal).unwrap();

        let set = BlockadeSet::from_graph(&graph);
        assert_eq!(set.len(), 3);
        let pairs: BTreeSet<(NodeId, NodeId)> = set.iter().map(|b| (b.a, b.b)).collect();
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn ignores_non_blockade_neighbours() {
        let mut graph = walled_graph();
        let plain = graph.add_node(p(0.0, 0.0), NodeKind::Normal);
        graph.connect(NodeId::new(0), plain, Relation::Normal).unwrap();
        let lonely = graph.add_node(p(20.0, 0.0), NodeKind::Blockade);
        graph.connect(lonely, plain, Relation::Normal).unwrap();

        assert_eq!(BlockadeSet::from_graph(&graph).len(), 1);
    }

    #[test]
    fn obstructs_crossing_edges_only() {
        let set = BlockadeSet::from_graph(&walled_graph());
        assert!(set.obstructs(p(0.0, 0.0), p(10.0, 0.0)));
        assert!(!set.obstructs(p(0.0, 0.0), p(4.0, 0.0)));
        assert!(!set.obstructs(p(0.0, 10.0), p(10.0, 10.0)));
        // Touching the wall end is not crossing.
        assert!(!set.obstructs(p(0.0, 5.0), p(5.0, 5.0)));
    }

    #[test]
    fn single_blockade_obstructs() {
        let blockade = Blockade {
            a: NodeId::new(0),
            b: NodeId::new(1),
            line: planar_line(p(0.0, -1.0), p(0.0, 1.0)),
        };
        assert!(blockade.obstructs(p(-1.0, 0.0), p(1.0, 0.0)));
        assert!(!blockade.obstructs(p(-1.0, 2.0), p(1.0, 2.0)));
    }

    #[test]
    fn empty_set_obstructs_nothing() {
        let set = BlockadeSet::default();
        assert!(set.is_empty());
        assert!(!set.obstructs(p(0.0, 0.0), p(10.0, 0.0)));
    }
}
