//! A straight two-vehicle track: both vehicles share one line, so a
//! leader/follower pair is the only possible configuration.

use crate::{CollisionBounds, Result, Track, TrackError, TrackSide};

/// A straight track of two sections. The right-hand vehicle starts
/// `start_point_distance` metres ahead of the left-hand one on the same
/// line; traveled distance is counted from the left vehicle's start point
/// for both.
#[derive(Debug, Clone)]
pub struct StraightTrack {
    track_width: f64,
    track_length: f64,
    start_point_distance: f64,
    vehicle_length: f64,
}

impl StraightTrack {
    /// Default width of the drivable surface, metres.
    pub const DEFAULT_TRACK_WIDTH: f64 = 4.0;

    /// Build a straight track. `section_length` is half the total length;
    /// `vehicle_length` parameterizes the collision bounds.
    pub fn new(
        section_length: f64,
        start_point_distance: f64,
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
        positive("vehicle length", vehicle_length)?;
        if !start_point_distance.is_finite() || start_point_distance < 0.0 {
            return Err(TrackError::NonPositiveDimension {
                name: "start point distance",
                value: start_point_distance,
            });
        }

        Ok(Self {
            track_width: Self::DEFAULT_TRACK_WIDTH,
            track_length: 2.0 * section_length,
            start_point_distance,
            vehicle_length,
        })
    }
}

impl Track for StraightTrack {
    fn is_beyond_track_bounds(&self, position: [f64; 2]) -> bool {
        position[0].abs() > self.track_width / 2.0
    }

    fn is_beyond_finish(&self, position: [f64; 2]) -> bool {
        position[1] >= self.track_length
    }

    fn traveled_distance_to_coordinates(&self, distance: f64, _side: TrackSide) -> [f64; 2] {
        [0.0, distance]
    }

    fn coordinates_to_traveled_distance(&self, point: [f64; 2], _side: TrackSide) -> f64 {
        point[1]
    }

    fn start_position(&self, side: TrackSide) -> [f64; 2] {
        match side {
            TrackSide::Left => [0.0, 0.0],
            TrackSide::Right => [0.0, self.start_point_distance],
        }
    }

    fn collision_bounds(
        &self,
        traveled_distance: f64,
        _vehicle_width: f64,
        vehicle_length: f64,
    ) -> CollisionBounds {
        (
            Some(traveled_distance - vehicle_length),
            Some(traveled_distance + vehicle_length),
        )
    }

    fn collision_bounds_approximation(&self, traveled_distance: f64) -> CollisionBounds {
        (
            Some(traveled_distance - self.vehicle_length),
            Some(traveled_distance + self.vehicle_length),
        )
    }

    fn total_distance(&self) -> f64 {
        self.track_length
    }

    fn track_width(&self) -> f64 {
        self.track_width
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bounds_are_the_vehicle_length_either_way() {
        let track = StraightTrack::new(200.0, 10.0, 4.5).unwrap();
        let (lower, upper) = track.collision_bounds_approximation(30.0);
        assert_relative_eq!(lower.unwrap(), 25.5);
        assert_relative_eq!(upper.unwrap(), 34.5);
        assert_eq!(
            track.collision_bounds(30.0, 1.8, 4.5),
            track.collision_bounds_approximation(30.0)
        );
    }

    #[test]
    fn right_vehicle_starts_ahead() {
        let track = StraightTrack::new(200.0, 10.0, 4.5).unwrap();
        assert_eq!(track.start_position(TrackSide::Left), [0.0, 0.0]);
        assert_eq!(track.start_position(TrackSide::Right), [0.0, 10.0]);
        let start = track.start_position(TrackSide::Right);
        assert_relative_eq!(
            track.coordinates_to_traveled_distance(start, TrackSide::Right),
            10.0
        );
    }

    #[test]
    fn finish_and_bounds_predicates() {
        let track = StraightTrack::new(200.0, 10.0, 4.5).unwrap();
        assert!(!track.is_beyond_finish([0.0, 399.0]));
        assert!(track.is_beyond_finish([0.0, 400.0]));
        assert!(!track.is_beyond_track_bounds([1.9, 10.0]));
        assert!(track.is_beyond_track_bounds([2.1, 10.0]));
    }
}
