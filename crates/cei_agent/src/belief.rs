//! The time-indexed Gaussian belief over the other vehicle's future
//! traveled distance.
//!
//! The belief is a fixed-length sequence of `(mean, std_dev)` pairs, one
//! per future instant on the belief timeline. It is seeded once from a
//! reachable-set envelope (maximum acceleration up, maximum braking
//! down), then updated every control tick with a conjugate Gaussian step
//! from the single observed velocity, and rolled forward by one slot once
//! per belief period.

use serde::Serialize;

use crate::{AgentError, ObservedState, Result};

/// Smallest admissible standard deviation of a belief point.
pub(crate) const MIN_STD_DEV: f64 = 1e-3;

/// A Gaussian over the other vehicle's traveled distance at one future
/// instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeliefPoint {
    /// Expected traveled distance, metres.
    pub mean: f64,
    /// Standard deviation, metres. Never below `1e-3`.
    pub std_dev: f64,
}

impl BeliefPoint {
    const ZERO: Self = Self {
        mean: 0.0,
        std_dev: 0.0,
    };
}

/// The belief sequence plus its absolute timeline.
#[derive(Debug, Clone)]
pub(crate) struct Belief {
    points: Vec<BeliefPoint>,
    time_stamps: Vec<f64>,
}

impl Belief {
    /// An uninitialized belief of `length` points. Time stamps stay empty
    /// until [`Belief::initialize`] runs on the first tick.
    pub fn empty(length: usize) -> Self {
        Self {
            points: vec![BeliefPoint::ZERO; length],
            time_stamps: Vec::with_capacity(length),
        }
    }

    /// Zero all points and drop the timeline.
    pub fn reset(&mut self) {
        self.points.fill(BeliefPoint::ZERO);
        self.time_stamps.clear();
    }

    #[inline(always)]
    pub fn points(&self) -> &[BeliefPoint] {
        &self.points
    }

    #[inline(always)]
    pub fn time_stamps(&self) -> &[f64] {
        &self.time_stamps
    }

    /// Seed the belief from the other vehicle's current state.
    ///
    /// Two envelopes are propagated in lockstep at the belief frequency:
    /// an upper one under sustained maximum acceleration and a lower one
    /// under maximum braking, clamped so that traveled distance never
    /// decreases. Each belief point is the Gaussian whose mean is the
    /// envelope midpoint and whose `3σ` reaches the upper envelope.
    ///
    /// A missing other vehicle is approximated as stationary at zero.
    pub fn initialize(
        &mut self,
        other: Option<ObservedState>,
        now: f64,
        max_acceleration: f64,
        period: f64,
    ) {
        let (position, velocity) = other.unwrap_or((0.0, 0.0));

        let mut upper_position = position;
        let mut upper_velocity = velocity;
        let mut lower_position = position;
        let mut lower_velocity = velocity;

        self.time_stamps.clear();
        for (index, point) in self.points.iter_mut().enumerate() {
            upper_position += upper_velocity * period + max_acceleration / 2.0 * period * period;
            upper_velocity += max_acceleration * period;

            let candidate =
                lower_position + lower_velocity * period - max_acceleration / 2.0 * period * period;
            if candidate >= lower_position {
                lower_position = candidate;
            }
            lower_velocity = (lower_velocity - max_acceleration * period).max(0.0);

            let mean = (upper_position - lower_position) / 2.0 + lower_position;
            let std_dev = ((upper_position - mean) / 3.0).max(MIN_STD_DEV);
            *point = BeliefPoint { mean, std_dev };
            self.time_stamps.push(now + period * (index + 1) as f64);
        }
    }

    /// Per-tick Bayesian update from the observed velocity, plus the
    /// once-per-period roll that drops the first point and seeds a new
    /// final one.
    ///
    /// Without an other vehicle only the timeline advances.
    pub fn update(
        &mut self,
        other: Option<ObservedState>,
        observed_velocity: Option<f64>,
        now: f64,
        generate_new_point: bool,
        max_acceleration: f64,
        max_comfortable_acceleration: f64,
        period: f64,
    ) {
        let Some((other_position, other_velocity)) = other else {
            if generate_new_point {
                self.shift_time_stamps(period);
            }
            return;
        };
        let sample = observed_velocity.unwrap_or(other_velocity);

        // When a new point is generated this tick, the first one is about
        // to be dropped and its remaining time is zero; start at index 1.
        let first_index = usize::from(generate_new_point);
        let length = self.points.len();

        let mut updated = Vec::with_capacity(length);
        for index in first_index..length {
            let BeliefPoint { mean, std_dev } = self.points[index];
            let prior_mean = mean - other_position;
            let time = self.time_stamps[index] - now;
            let likelihood_sigma = (max_comfortable_acceleration * time) / 6.0;

            let (posterior_mean, posterior_std_dev) =
                posterior(prior_mean, std_dev, likelihood_sigma, sample, time);
            updated.push(BeliefPoint {
                mean: posterior_mean + other_position,
                std_dev: posterior_std_dev,
            });
        }

        if generate_new_point {
            // Seed the fresh final point from the reachable envelope over
            // the full belief timeline.
            let time_until_last_point = period * length as f64;
            let min_velocity =
                (other_velocity - max_acceleration * time_until_last_point / 2.0).max(0.0);
            let max_velocity = other_velocity + max_acceleration * time_until_last_point / 2.0;

            let lower_position = other_position + min_velocity * time_until_last_point;
            let upper_position = other_position + max_velocity * time_until_last_point;

            let mean = lower_position + (upper_position - lower_position) / 2.0;
            let std_dev = ((upper_position - mean) / 3.0).max(MIN_STD_DEV);
            updated.push(BeliefPoint { mean, std_dev });

            self.points = updated;
            self.shift_time_stamps(period);
        } else {
            self.points = updated;
        }
    }

    /// Drop the first time stamp and append one belief period after the
    /// last.
    fn shift_time_stamps(&mut self, period: f64) {
        let Some(&last) = self.time_stamps.last() else {
            return;
        };
        self.time_stamps.remove(0);
        self.time_stamps.push(last + period);
    }

    /// All belief arithmetic must stay finite; anything else is fatal.
    pub fn ensure_finite(&self) -> Result<()> {
        let finite = self
            .points
            .iter()
            .all(|point| point.mean.is_finite() && point.std_dev.is_finite())
            && self.time_stamps.iter().all(|stamp| stamp.is_finite());
        if finite {
            Ok(())
        } else {
            Err(AgentError::NonFinite { quantity: "belief" })
        }
    }
}

/// Conjugate Gaussian update from a single velocity observation,
/// interpreted as a displacement of `sample * time` over the remaining
/// `time`, with the likelihood variance implicitly scaled by `time²`.
fn posterior(
    prior_mean: f64,
    prior_sigma: f64,
    likelihood_sigma: f64,
    sample: f64,
    time: f64,
) -> (f64, f64) {
    let denominator = likelihood_sigma.powi(2) + prior_sigma.powi(2) / time.powi(2);
    // The product over the precision sum is the new deviation itself, not
    // its square.
    let sigma = (likelihood_sigma.powi(2) * prior_sigma.powi(2)) / denominator;
    let mean =
        (prior_mean * likelihood_sigma.powi(2) + sample * prior_sigma.powi(2) / time) / denominator;
    (mean, sigma.max(MIN_STD_DEV))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    use super::*;

    const PERIOD: f64 = 0.25;
    const MAX_ACCELERATION: f64 = 2.5;

    fn initialized(other: Option<ObservedState>) -> Belief {
        let mut belief = Belief::empty(17);
        belief.initialize(other, 0.0, MAX_ACCELERATION, PERIOD);
        belief
    }

    #[test]
    fn initialization_builds_a_full_timeline() {
        let belief = initialized(Some((5.0, 10.0)));
        assert_eq!(belief.points().len(), 17);
        assert_eq!(belief.time_stamps().len(), 17);
        for (index, stamp) in belief.time_stamps().iter().enumerate() {
            assert_relative_eq!(*stamp, PERIOD * (index + 1) as f64);
        }
    }

    #[test]
    fn initial_means_advance_with_the_other_vehicle() {
        let belief = initialized(Some((5.0, 10.0)));
        let means: Vec<f64> = belief.points().iter().map(|point| point.mean).collect();
        assert!(means.windows(2).all(|pair| pair[1] > pair[0]));
        // after one period the midpoint of the envelopes is one period of
        // travel ahead (the acceleration terms cancel)
        assert_relative_eq!(means[0], 5.0 + 10.0 * PERIOD, epsilon = 1e-9);
    }

    #[test]
    fn initial_uncertainty_grows_along_the_horizon() {
        let belief = initialized(Some((5.0, 10.0)));
        let deviations: Vec<f64> = belief.points().iter().map(|point| point.std_dev).collect();
        assert!(deviations.windows(2).all(|pair| pair[1] > pair[0]));
        assert!(deviations.iter().all(|sigma| *sigma >= MIN_STD_DEV));
    }

    #[test]
    fn missing_other_vehicle_initializes_from_the_origin() {
        let belief = initialized(None);
        assert_relative_eq!(belief.points()[0].mean, MAX_ACCELERATION / 4.0 * PERIOD * PERIOD);
    }

    #[test]
    fn update_pulls_the_mean_toward_the_observation() {
        let mut belief = initialized(Some((0.0, 10.0)));
        let horizon_point = belief.points()[15];
        // the other vehicle reports a much lower velocity than the
        // envelope midpoint assumes
        belief.update(
            Some((0.0, 4.0)),
            Some(4.0),
            0.05,
            false,
            MAX_ACCELERATION,
            1.0,
            PERIOD,
        );
        let updated = belief.points()[15];
        assert!(updated.mean < horizon_point.mean);
        assert!(updated.std_dev < horizon_point.std_dev);
        assert!(updated.std_dev >= MIN_STD_DEV);
    }

    #[test]
    fn posterior_matches_the_hand_computed_update() {
        // prior N(2, 5), likelihood sigma 0.1, observed velocity 3 over a
        // remaining time of 1 s:
        //   denominator = 0.1^2 + 5^2 / 1^2            = 25.01
        //   sigma       = (0.1^2 * 5^2) / 25.01        = 0.25 / 25.01
        //   mean        = (2 * 0.1^2 + 3 * 5^2 / 1) / 25.01 = 75.02 / 25.01
        let (mean, std_dev) = posterior(2.0, 5.0, 0.1, 3.0, 1.0);
        assert_relative_eq!(mean, 75.02 / 25.01, epsilon = 1e-12);
        assert_relative_eq!(std_dev, 0.25 / 25.01, epsilon = 1e-12);
    }

    #[test]
    fn posterior_deviation_is_floored() {
        // a vanishing likelihood sigma collapses the update onto the
        // observation; the deviation must stop at the floor
        let (_, std_dev) = posterior(2.0, 5.0, 1e-6, 3.0, 1.0);
        assert_relative_eq!(std_dev, MIN_STD_DEV);
    }

    #[test]
    fn rolling_drops_the_first_point_and_extends_the_timeline() {
        let mut belief = initialized(Some((0.0, 10.0)));
        let second_stamp = belief.time_stamps()[1];
        belief.update(
            Some((2.5, 10.0)),
            Some(10.0),
            PERIOD,
            true,
            MAX_ACCELERATION,
            1.0,
            PERIOD,
        );
        assert_eq!(belief.points().len(), 17);
        assert_relative_eq!(belief.time_stamps()[0], second_stamp);
        assert_relative_eq!(belief.time_stamps()[16], PERIOD * 18.0);
    }

    #[test]
    fn missing_other_vehicle_only_shifts_the_timeline() {
        let mut belief = initialized(Some((0.0, 10.0)));
        let before = belief.points().to_vec();
        belief.update(None, None, PERIOD, true, MAX_ACCELERATION, 1.0, PERIOD);
        assert_eq!(belief.points(), &before[..]);
        assert_relative_eq!(belief.time_stamps()[0], PERIOD * 2.0);
    }

    #[test]
    fn reset_clears_the_timeline() {
        let mut belief = initialized(Some((0.0, 10.0)));
        belief.reset();
        assert!(belief.time_stamps().is_empty());
        assert!(belief.points().iter().all(|point| point.mean == 0.0));
    }
}
