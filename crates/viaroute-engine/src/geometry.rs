//! Planar geometry helpers: strict segment intersection and turn angles.

use geo::Line;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};

use crate::types::Point;

/// Default cosine tolerance below which a turn counts as doubling back.
///
/// `cos(Δθ) < -0.3` roughly means the direction changes by more than
/// ~107 degrees.
pub const DEFAULT_U_TURN_TOLERANCE: f64 = -0.3;

/// The planar projection of the segment `from -> to`.
#[must_use]
pub const fn planar_line(from: Point, to: Point) -> Line<f64> {
    Line {
        start: from.coord(),
        end: to.coord(),
    }
}

/// Whether two segments cross each other strictly.
///
/// Touching at an endpoint, T-junctions and collinear overlap do not
/// count: only a single proper intersection interior to both segments.
#[must_use]
pub fn segments_cross(a: Line<f64>, b: Line<f64>) -> bool {
    matches!(
        line_intersection(a, b),
        Some(LineIntersection::SinglePoint {
            is_proper: true,
            ..
        })
    )
}

/// [`segments_cross`] for segments given as point pairs.
#[must_use]
pub fn points_cross(a_from: Point, a_to: Point, b_from: Point, b_to: Point) -> bool {
    segments_cross(planar_line(a_from, a_to), planar_line(b_from, b_to))
}

/// Cosine of the direction change when walking `a -> b -> c`.
///
/// `1.0` is straight ahead, `-1.0` is a full reversal.
#[must_use]
pub fn turn_cosine(a: Point, b: Point, c: Point) -> f64 {
    let incoming = a.direction_to(b);
    let outgoing = b.direction_to(c);
    (outgoing - incoming).cos()
}

/// Whether walking `a -> b -> c` reverses direction more sharply than
/// `tolerance` allows.
#[must_use]
pub fn is_u_turn(a: Point, b: Point, c: Point, tolerance: f64) -> bool {
    turn_cosine(a, b, c) < tolerance
}
