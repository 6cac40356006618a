//! Collision risk of a position plan against the belief.
//!
//! Every belief point except the final one (which only seeds the next
//! roll) is matched to the plan entry at its instant; the track supplies
//! the interval of other-vehicle traveled distances that would collide
//! with the ego vehicle there, and the belief point's Gaussian mass
//! inside that interval is the point's collision probability. The
//! perceived risk is the maximum over all points.

use cei_track::Track;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::{belief::BeliefPoint, AgentError, Result};

/// Gaussian mass inside an interval with either end optionally open.
pub(crate) fn normal_probability(
    mean: f64,
    std_dev: f64,
    lower: Option<f64>,
    upper: Option<f64>,
) -> Result<f64> {
    let normal = Normal::new(mean, std_dev).map_err(|_| AgentError::NonFinite {
        quantity: "belief distribution",
    })?;
    let probability = match (lower, upper) {
        (None, None) => 0.0,
        (None, Some(upper)) => normal.cdf(upper),
        (Some(lower), None) => 1.0 - normal.cdf(lower),
        (Some(lower), Some(upper)) => normal.cdf(upper) - normal.cdf(lower),
    };
    if probability.is_finite() {
        Ok(probability)
    } else {
        Err(AgentError::NonFinite {
            quantity: "collision probability",
        })
    }
}

/// Per-belief-point collision probabilities of `position_plan`.
///
/// Each belief point's offset from `now` must be an exact multiple of the
/// control tick; the matching plan entry is one tick earlier than that
/// multiple (the plan entry at index `i` takes effect over tick `i + 1`).
pub(crate) fn collision_probabilities(
    points: &[BeliefPoint],
    time_stamps: &[f64],
    position_plan: &[f64],
    track: &dyn Track,
    now: f64,
    dt: f64,
    dt_ms: u64,
) -> Result<Vec<f64>> {
    let considered = points.len().saturating_sub(1);
    let mut probabilities = Vec::with_capacity(considered);

    for (point, stamp) in points.iter().zip(time_stamps).take(considered) {
        let seconds_from_now = stamp - now;
        let ticks_from_now = seconds_from_now / dt;
        if (ticks_from_now - ticks_from_now.round()).abs() >= 1e-10 {
            return Err(AgentError::OffTickBeliefPoint {
                seconds_from_now,
                dt_ms,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let index = ticks_from_now.round() as i64 - 1;
        let plan_position = usize::try_from(index)
            .ok()
            .and_then(|index| position_plan.get(index))
            .ok_or(AgentError::BeliefOutsidePlan {
                index,
                plan_length: position_plan.len(),
            })?;

        // A point only contributes when the track pins the collision
        // interval on both sides.
        let probability = match track.collision_bounds_approximation(*plan_position) {
            (Some(lower), Some(upper)) => {
                normal_probability(point.mean, point.std_dev, Some(lower), Some(upper))?
            }
            _ => 0.0,
        };
        probabilities.push(probability);
    }

    Ok(probabilities)
}

/// The perceived risk: the largest per-point probability, zero for an
/// empty list.
pub(crate) fn max_risk(probabilities: &[f64]) -> f64 {
    probabilities.iter().copied().fold(0.0, f64::max)
}
