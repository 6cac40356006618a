//! The symmetric merging track: two straight approach branches that meet
//! on the axis of symmetry and continue as one shared section.
//!
//! Collision bounds on this track are genuinely two-dimensional: before
//! the merge point the vehicles close in on each other at an angle, so the
//! interval of other-vehicle traveled distances that collides with the ego
//! vehicle opens up gradually from nothing (far from the merge) to the
//! full `±vehicle_length` of the shared section. The exact bounds run a
//! separating-axis test between the two vehicle footprints; a
//! piecewise-linear table of those bounds is precomputed for the
//! transition region and served by
//! [`Track::collision_bounds_approximation`].

use crate::{point_segment_distance, CollisionBounds, Result, Track, TrackError, TrackSide};

/// Spacing between precomputed approximation knots, metres.
const KNOT_SPACING: f64 = 0.5;

/// Bisection iterations used to pin an interval edge.
const EDGE_BISECTIONS: usize = 50;

/// Samples of the overlap depth across the search window.
const WINDOW_SAMPLES: usize = 96;

#[derive(Debug, Clone, Copy)]
struct Knot {
    lower: f64,
    upper: f64,
}

/// Two approach branches of `section_length` metres starting
/// `start_point_distance` apart, merging into one straight section of
/// another `section_length` metres. Total traveled distance per side is
/// `2 * section_length`.
#[derive(Debug, Clone)]
pub struct SymmetricMergingTrack {
    section_length: f64,
    track_width: f64,
    vehicle_width: f64,
    vehicle_length: f64,
    sin_approach: f64,
    cos_approach: f64,
    merge_point: [f64; 2],
    end_point: [f64; 2],
    /// Below this traveled distance no collision is geometrically
    /// possible.
    lower_threshold: f64,
    /// From this traveled distance on the bounds are exactly `d ± length`.
    upper_threshold: f64,
    knots: Vec<Knot>,
    knot_spacing: f64,
}

impl SymmetricMergingTrack {
    /// Default width of the drivable surface, metres.
    pub const DEFAULT_TRACK_WIDTH: f64 = 4.0;

    /// Build the track and precompute the linearised collision bounds for
    /// the given vehicle dimensions.
    pub fn new(
        section_length: f64,
        start_point_distance: f64,
        vehicle_width: f64,
        vehicle_length: f64,
    ) -> Result<Self> {
        let positive = |name, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(TrackError::NonPositiveDimension { name, value })
            }
        };
        positive("section length", section_length)?;
        positive("start point distance", start_point_distance)?;
        positive("vehicle width", vehicle_width)?;
        positive("vehicle length", vehicle_length)?;

        let sin_approach = (start_point_distance / 2.0) / section_length;
        if sin_approach >= 1.0 {
            return Err(TrackError::StartPointsTooFarApart {
                start_point_distance,
                section_length,
            });
        }
        let cos_approach = (1.0 - sin_approach * sin_approach).sqrt();
        let merge_point = [0.0, section_length * cos_approach];
        let end_point = [0.0, merge_point[1] + section_length];

        let mut track = Self {
            section_length,
            track_width: Self::DEFAULT_TRACK_WIDTH,
            vehicle_width,
            vehicle_length,
            sin_approach,
            cos_approach,
            merge_point,
            end_point,
            lower_threshold: 0.0,
            upper_threshold: section_length + vehicle_length,
            knots: Vec::new(),
            knot_spacing: KNOT_SPACING,
        };
        track.lower_threshold = track.find_lower_threshold();
        track.build_approximation_table();
        Ok(track)
    }

    /// Traveled distance below which no collision is possible.
    #[inline(always)]
    #[must_use]
    pub fn lower_bound_threshold(&self) -> f64 {
        self.lower_threshold
    }

    /// Traveled distance from which the bounds equal `d ± vehicle_length`.
    #[inline(always)]
    #[must_use]
    pub fn upper_bound_threshold(&self) -> f64 {
        self.upper_threshold
    }

    /// Centerline point and unit heading of a vehicle at `distance` along
    /// `side`. Both extend linearly beyond the track ends.
    fn footprint(&self, side: TrackSide, distance: f64) -> ([f64; 2], [f64; 2]) {
        let sign = match side {
            TrackSide::Left => -1.0,
            TrackSide::Right => 1.0,
        };
        if distance <= self.section_length {
            let center = [
                sign * self.sin_approach * (self.section_length - distance),
                self.cos_approach * distance,
            ];
            let heading = [-sign * self.sin_approach, self.cos_approach];
            (center, heading)
        } else {
            (
                [0.0, self.merge_point[1] + (distance - self.section_length)],
                [0.0, 1.0],
            )
        }
    }

    /// Separating-axis overlap depth of the two vehicle footprints:
    /// positive iff the rectangles intersect.
    fn overlap_depth(&self, ego_distance: f64, other_distance: f64, width: f64, length: f64) -> f64 {
        let (c1, t1) = self.footprint(TrackSide::Left, ego_distance);
        let (c2, t2) = self.footprint(TrackSide::Right, other_distance);
        let n1 = [-t1[1], t1[0]];
        let n2 = [-t2[1], t2[0]];
        let delta = [c2[0] - c1[0], c2[1] - c1[1]];
        let (half_w, half_l) = (width / 2.0, length / 2.0);

        let mut depth = f64::INFINITY;
        for axis in [t1, n1, t2, n2] {
            let dot = |a: [f64; 2], b: [f64; 2]| a[0] * b[0] + a[1] * b[1];
            let reach_1 = half_l * dot(axis, t1).abs() + half_w * dot(axis, n1).abs();
            let reach_2 = half_l * dot(axis, t2).abs() + half_w * dot(axis, n2).abs();
            depth = depth.min(reach_1 + reach_2 - dot(axis, delta).abs());
        }
        depth
    }

    /// Scan the window of other-vehicle distances around `ego_distance`
    /// and return the deepest overlap found together with its location.
    /// A collision at `ego_distance` is possible iff the depth is
    /// positive.
    fn deepest_overlap(&self, ego_distance: f64, width: f64, length: f64) -> (f64, f64) {
        let window = 2.5 * (width + length);
        let step = 2.0 * window / WINDOW_SAMPLES as f64;
        let mut best = (f64::NEG_INFINITY, ego_distance);
        for i in 0..=WINDOW_SAMPLES {
            let other = ego_distance - window + i as f64 * step;
            let depth = self.overlap_depth(ego_distance, other, width, length);
            if depth > best.0 {
                best = (depth, other);
            }
        }
        best
    }

    /// Pin the zero crossing of the overlap depth between a separated and
    /// a colliding other-vehicle distance.
    fn bisect_edge(
        &self,
        ego_distance: f64,
        mut separated: f64,
        mut colliding: f64,
        width: f64,
        length: f64,
    ) -> f64 {
        for _ in 0..EDGE_BISECTIONS {
            let mid = (separated + colliding) / 2.0;
            if self.overlap_depth(ego_distance, mid, width, length) > 0.0 {
                colliding = mid;
            } else {
                separated = mid;
            }
        }
        (separated + colliding) / 2.0
    }

    fn exact_bounds(&self, ego_distance: f64, width: f64, length: f64) -> CollisionBounds {
        // Fully merged: both footprints are aligned with the axis, and the
        // interval is the vehicle length either way.
        if ego_distance >= self.section_length + length {
            return (
                Some(ego_distance - length),
                Some(ego_distance + length),
            );
        }

        let (depth, witness) = self.deepest_overlap(ego_distance, width, length);
        if depth <= 0.0 {
            return (None, None);
        }

        let window = 2.5 * (width + length);
        let lower = self.bisect_edge(ego_distance, ego_distance - window, witness, width, length);
        let upper = self.bisect_edge(ego_distance, ego_distance + window, witness, width, length);
        (Some(lower), Some(upper))
    }

    /// Locate the traveled distance where a collision first becomes
    /// possible, by descending from the fully-merged region and bisecting
    /// the boundary.
    fn find_lower_threshold(&self) -> f64 {
        let (width, length) = (self.vehicle_width, self.vehicle_length);
        let step = 0.25 * (width + length);
        let floor = -3.0 * (width + length);

        let mut colliding = self.section_length + length;
        let mut probe = colliding - step;
        while probe > floor {
            if self.deepest_overlap(probe, width, length).0 > 0.0 {
                colliding = probe;
                probe -= step;
            } else {
                break;
            }
        }
        if probe <= floor {
            return floor;
        }

        let (mut separated, mut colliding) = (probe, colliding);
        for _ in 0..EDGE_BISECTIONS {
            let mid = (separated + colliding) / 2.0;
            if self.deepest_overlap(mid, width, length).0 > 0.0 {
                colliding = mid;
            } else {
                separated = mid;
            }
        }
        (separated + colliding) / 2.0
    }

    fn build_approximation_table(&mut self) {
        let span = self.upper_threshold - self.lower_threshold;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let segments = ((span / KNOT_SPACING).ceil() as usize).max(8);
        self.knot_spacing = span / segments as f64;

        let mut knots = Vec::with_capacity(segments + 1);
        for i in 0..=segments {
            let distance = self.lower_threshold + i as f64 * self.knot_spacing;
            let knot = match self.exact_bounds(distance, self.vehicle_width, self.vehicle_length) {
                (Some(lower), Some(upper)) => Knot { lower, upper },
                _ => {
                    // Right at the threshold the interval collapses to the
                    // tangency point; fall back to the deepest-overlap
                    // witness there.
                    let (_, witness) =
                        self.deepest_overlap(distance, self.vehicle_width, self.vehicle_length);
                    Knot {
                        lower: witness,
                        upper: witness,
                    }
                }
            };
            knots.push(knot);
        }
        self.knots = knots;
    }
}

impl Track for SymmetricMergingTrack {
    fn is_beyond_track_bounds(&self, position: [f64; 2]) -> bool {
        let left_start = self.start_position(TrackSide::Left);
        let right_start = self.start_position(TrackSide::Right);
        let distance = point_segment_distance(position, left_start, self.merge_point)
            .min(point_segment_distance(position, right_start, self.merge_point))
            .min(point_segment_distance(position, self.merge_point, self.end_point));
        distance > self.track_width / 2.0
    }

    fn is_beyond_finish(&self, position: [f64; 2]) -> bool {
        position[1] >= self.end_point[1]
    }

    fn traveled_distance_to_coordinates(&self, distance: f64, side: TrackSide) -> [f64; 2] {
        self.footprint(side, distance).0
    }

    fn coordinates_to_traveled_distance(&self, point: [f64; 2], side: TrackSide) -> f64 {
        if point[1] < self.merge_point[1] {
            let start = self.start_position(side);
            let (_, heading) = self.footprint(side, 0.0);
            (point[0] - start[0]) * heading[0] + (point[1] - start[1]) * heading[1]
        } else {
            self.section_length + (point[1] - self.merge_point[1])
        }
    }

    fn start_position(&self, side: TrackSide) -> [f64; 2] {
        self.footprint(side, 0.0).0
    }

    fn collision_bounds(
        &self,
        traveled_distance: f64,
        vehicle_width: f64,
        vehicle_length: f64,
    ) -> CollisionBounds {
        self.exact_bounds(traveled_distance, vehicle_width, vehicle_length)
    }

    fn collision_bounds_approximation(&self, traveled_distance: f64) -> CollisionBounds {
        if traveled_distance < self.lower_threshold {
            return (None, None);
        }
        if traveled_distance >= self.upper_threshold {
            return (
                Some(traveled_distance - self.vehicle_length),
                Some(traveled_distance + self.vehicle_length),
            );
        }

        let offset = (traveled_distance - self.lower_threshold) / self.knot_spacing;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = (offset.floor() as usize).min(self.knots.len() - 2);
        let fraction = offset - index as f64;
        let (a, b) = (self.knots[index], self.knots[index + 1]);
        (
            Some(a.lower + fraction * (b.lower - a.lower)),
            Some(a.upper + fraction * (b.upper - a.upper)),
        )
    }

    fn total_distance(&self) -> f64 {
        2.0 * self.section_length
    }

    fn track_width(&self) -> f64 {
        self.track_width
    }
}
