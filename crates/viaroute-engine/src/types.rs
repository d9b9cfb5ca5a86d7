//! Shared types for the viaroute route choice engine.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// A position on the floor plan.
///
/// `x` and `y` are map coordinates (raw map units, converted to metres
/// through [`MapScale`]); `z` is the floor/elevation level.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position in map units.
    pub x: f64,
    /// Vertical position in map units.
    pub y: f64,
    /// Elevation.
    #[serde(default)]
    pub z: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared planar (x/y) distance to another point.
    #[must_use]
    pub fn planar_distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Planar (x/y) distance to another point. Elevation is ignored.
    #[must_use]
    pub fn planar_distance(self, other: Self) -> f64 {
        self.planar_distance_squared(other).sqrt()
    }

    /// Planar direction towards another point, in radians.
    #[must_use]
    pub fn direction_to(self, other: Self) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// Signed elevation change when moving to another point.
    #[must_use]
    pub fn climb_to(self, other: Self) -> f64 {
        other.z - self.z
    }

    /// The planar projection as a `geo::Coord`.
    #[must_use]
    pub const fn coord(self) -> geo::Coord<f64> {
        geo::Coord {
            x: self.x,
            y: self.y,
        }
    }
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw id value.
            #[must_use]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// The raw id value.
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0
            }

            pub(crate) const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Stable identity of a node in a [`MapGraph`](crate::graph::MapGraph).
    ///
    /// Ids are handed out in increasing order and never reused, even
    /// after the node is removed.
    #[derive(Default)]
    NodeId,
    "n"
);

id_type!(
    /// Identity of a [`Path`](crate::path::Path). Two paths are the same
    /// path only if their ids match.
    PathId,
    "p"
);

id_type!(
    /// Identity of a [`Route`](crate::route::Route), used to track a
    /// route through the filter pipeline.
    RouteId,
    "r"
);

/// Monotonic id source owned by a graph/session context.
///
/// Allocation takes `&self` so searches running against a shared graph
/// (including the parallel shortest-path pass) can mint ids.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    /// An allocator whose first id is `first`.
    #[must_use]
    pub const fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Take the next id.
    pub fn allocate(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to [`allocate`](Self::allocate) will return.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Clone for IdAllocator {
    fn clone(&self) -> Self {
        Self::starting_at(self.peek())
    }
}

/// The kind of adjacency between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// A physically walked connection. Contributes its planar length to
    /// path distance and can be obstructed by blockades.
    Normal,
    /// A teleport-like shortcut (stairs, elevator). Contributes zero
    /// distance but still counts towards elevation gain.
    Portal,
}

/// Conversion from raw map units into metres.
///
/// Owned by the map-calibration layer; the engine only applies it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapScale {
    /// Real-world metres represented by one map unit.
    pub meters_per_unit: f64,
}

impl MapScale {
    /// One map unit is one metre.
    pub const IDENTITY: Self = Self {
        meters_per_unit: 1.0,
    };

    /// Metres per inch, used by [`from_print`](Self::from_print).
    pub const METERS_PER_INCH: f64 = 0.0254;

    /// Scale for a scanned map: `resolution` pixels per inch of paper,
    /// printed at `1:scale`.
    #[must_use]
    pub fn from_print(resolution: f64, scale: f64) -> Self {
        Self {
            meters_per_unit: scale / resolution * Self::METERS_PER_INCH,
        }
    }

    /// Convert a length in map units into metres.
    #[must_use]
    pub fn to_meters(self, units: f64) -> f64 {
        units * self.meters_per_unit
    }

    /// Convert a length in metres into map units.
    #[must_use]
    pub fn to_units(self, meters: f64) -> f64 {
        meters / self.meters_per_unit
    }
}

impl Default for MapScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Errors raised by graph editing and configuration.
///
/// The search and filter algorithms never fail: unreachable targets
/// and unsolvable legs produce empty results instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum EngineError {
    /// The node id does not exist in the graph (or was removed).
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A node cannot be connected to itself.
    #[error("node {0} cannot be connected to itself")]
    SelfConnection(NodeId),

    /// The operation needs a waypoint.
    #[error("node {0} is not a waypoint")]
    NotAWaypoint(NodeId),

    /// The operation needs a control.
    #[error("node {0} is not a control")]
    NotAControl(NodeId),

    /// Analysis configuration is invalid.
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),
}
