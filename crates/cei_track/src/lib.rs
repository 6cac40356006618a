//! Track geometry for the CEI interaction model.
//!
//! A track maps a vehicle's scalar *traveled distance* to world
//! coordinates, and answers the one question the agent core asks of
//! geometry: "if I am at traveled distance `d`, which traveled distances of
//! the other vehicle imply a collision?" ([`Track::collision_bounds`] and
//! its fast linearised counterpart
//! [`Track::collision_bounds_approximation`]).

mod straight;
mod symmetric_merging;

use serde::{Deserialize, Serialize};
pub use straight::StraightTrack;
pub use symmetric_merging::SymmetricMergingTrack;

/// Errors raised while constructing a track.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum TrackError {
    /// The start points are so far apart that the approach branches would
    /// be longer than a track section.
    #[error(
        "start points {start_point_distance} m apart cannot be joined by two {section_length} m \
         sections"
    )]
    StartPointsTooFarApart {
        /// Lateral distance between the two start points, metres.
        start_point_distance: f64,
        /// Length of one track section, metres.
        section_length: f64,
    },
    /// A geometric parameter that must be strictly positive was not.
    #[error("{name} must be finite and positive, got {value}")]
    NonPositiveDimension {
        /// Name of the offending parameter.
        name: &'static str,
        /// Offered value.
        value: f64,
    },
}

/// Result type for fallible constructors in this crate.
pub type Result<T> = std::result::Result<T, TrackError>;

/// The interval of other-vehicle traveled distances that collide with the
/// ego vehicle, either end open when no collision is possible on that
/// side.
pub type CollisionBounds = (Option<f64>, Option<f64>);

/// Which of the two symmetric sides of a track a vehicle drives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackSide {
    /// The side starting left of the symmetry axis.
    Left,
    /// The side starting right of the symmetry axis.
    Right,
}

impl TrackSide {
    /// Both sides, in recording order.
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    /// The opposite side.
    #[inline(always)]
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl std::fmt::Display for TrackSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// A parameterized 1-D track embedded in the plane.
///
/// Traveled distance is arc length along a side's centerline, starting at
/// that side's start point. All implementations are symmetric: collision
/// bounds do not depend on which side the ego vehicle drives on.
pub trait Track {
    /// True when `position` has left the drivable surface.
    fn is_beyond_track_bounds(&self, position: [f64; 2]) -> bool;

    /// True when `position` has crossed the finish line.
    fn is_beyond_finish(&self, position: [f64; 2]) -> bool;

    /// World coordinates of the point at `distance` along `side`'s
    /// centerline. Extrapolates linearly beyond both ends.
    fn traveled_distance_to_coordinates(&self, distance: f64, side: TrackSide) -> [f64; 2];

    /// Traveled distance of the centerline point closest to `point` on
    /// `side`'s route.
    fn coordinates_to_traveled_distance(&self, point: [f64; 2], side: TrackSide) -> f64;

    /// Where `side` starts at t = 0.
    fn start_position(&self, side: TrackSide) -> [f64; 2];

    /// Exact collision bounds for an ego vehicle at `traveled_distance`,
    /// with both vehicles `vehicle_width` × `vehicle_length` rectangles
    /// aligned with their centerlines.
    fn collision_bounds(
        &self,
        traveled_distance: f64,
        vehicle_width: f64,
        vehicle_length: f64,
    ) -> CollisionBounds;

    /// Fast approximation of [`Track::collision_bounds`] for the vehicle
    /// dimensions the track was built with. This is the variant the risk
    /// evaluator calls once per belief point per tick.
    fn collision_bounds_approximation(&self, traveled_distance: f64) -> CollisionBounds;

    /// Total traveled distance from start to finish, per side.
    fn total_distance(&self) -> f64;

    /// Width of the drivable surface, metres.
    fn track_width(&self) -> f64;
}

/// Distance from `point` to the segment `a`–`b`.
pub(crate) fn point_segment_distance(point: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [point[0] - a[0], point[1] - a[1]];
    let len_sq = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len_sq > 0.0 {
        ((ap[0] * ab[0] + ap[1] * ab[1]) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = [a[0] + t * ab[0], a[1] + t * ab[1]];
    let d = [point[0] - closest[0], point[1] - closest[1]];
    (d[0] * d[0] + d[1] * d[1]).sqrt()
}
