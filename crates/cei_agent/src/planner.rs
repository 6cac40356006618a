//! Plan optimization: a bounded, inequality-constrained nonlinear program
//! over the normalized acceleration sequence.
//!
//! The cost tracks the preferred velocity and penalizes actuation effort;
//! its gradient is the hand-derived adjoint of the rollout recurrence.
//! The single inequality constraint keeps the plan's maximum collision
//! risk at or below the midpoint of the risk bounds. The solve runs
//! SLSQP seeded with the current plan; on failure a rough grid search
//! over four canonical seeds picks a restart point, and if the solver
//! still fails the best returned point is accepted anyway.

use std::rc::Rc;

use cei_track::Track;
use cei_vehicle::step_1d;
use nlopt::{Algorithm, Nlopt, Target};

use crate::{belief::BeliefPoint, risk};

/// Step used to finite-difference the constraint Jacobian.
const CONSTRAINT_FD_STEP: f64 = 1e-8;

/// Relative tolerance on the plan handed to the solver.
const SOLVER_XTOL_REL: f64 = 1e-8;

/// Everything needed to evaluate the cost of a candidate plan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CostModel {
    pub dt: f64,
    pub max_acceleration: f64,
    pub resistance_coefficient: f64,
    pub constant_resistance: f64,
    pub preferred_velocity: f64,
    pub theta: f64,
}

impl CostModel {
    /// Velocity sequence produced by rolling the vehicle model forward
    /// from `initial_velocity` under the plan. Position starts at zero:
    /// only velocities matter for the cost.
    pub fn velocities(&self, plan: &[f64], initial_velocity: f64) -> Vec<f64> {
        let mut velocities = Vec::with_capacity(plan.len());
        let mut position = 0.0;
        let mut velocity = initial_velocity;
        for &command in plan {
            let acceleration = command * self.max_acceleration;
            (position, velocity) = step_1d(
                self.dt,
                position,
                velocity,
                acceleration,
                self.resistance_coefficient,
                self.constant_resistance,
            );
            velocities.push(velocity);
        }
        velocities
    }

    /// Position and velocity sequences from an explicit initial state.
    pub fn rollout(
        &self,
        plan: &[f64],
        initial_position: f64,
        initial_velocity: f64,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut positions = Vec::with_capacity(plan.len());
        let mut velocities = Vec::with_capacity(plan.len());
        let mut position = initial_position;
        let mut velocity = initial_velocity;
        for &command in plan {
            let acceleration = command * self.max_acceleration;
            (position, velocity) = step_1d(
                self.dt,
                position,
                velocity,
                acceleration,
                self.resistance_coefficient,
                self.constant_resistance,
            );
            positions.push(position);
            velocities.push(velocity);
        }
        (positions, velocities)
    }

    /// `Σ (v_i - v_pref)² + θ · u_i²`.
    pub fn cost(&self, plan: &[f64], initial_velocity: f64) -> f64 {
        self.velocities(plan, initial_velocity)
            .iter()
            .zip(plan)
            .map(|(velocity, command)| {
                (velocity - self.preferred_velocity).powi(2) + self.theta * command.powi(2)
            })
            .sum()
    }

    /// Exact gradient of [`CostModel::cost`] with respect to the plan.
    ///
    /// The velocity recurrence is
    /// `v_i = v_{i-1} + (u_i·a_max - c_q·v_{i-1}² - c_c)·dt`, so
    /// `∂v_i/∂u_i = a_max·dt` and `∂v_{i+1}/∂v_i = 1 - 2·c_q·v_i·dt`;
    /// one backward sweep accumulates the downstream sensitivity.
    pub fn cost_gradient(&self, plan: &[f64], initial_velocity: f64) -> Vec<f64> {
        let velocities = self.velocities(plan, initial_velocity);
        let mut gradient = vec![0.0; plan.len()];

        let mut downstream = 0.0;
        for index in (0..plan.len()).rev() {
            let sensitivity = 2.0 * (velocities[index] - self.preferred_velocity)
                + downstream
                    * (1.0 - 2.0 * self.resistance_coefficient * velocities[index] * self.dt);
            gradient[index] =
                2.0 * self.theta * plan[index] + sensitivity * self.max_acceleration * self.dt;
            downstream = sensitivity;
        }
        gradient
    }
}

/// Everything needed to evaluate the risk constraint of a candidate plan.
/// Owns snapshots of the belief so the solver callbacks cannot alias
/// agent state.
#[derive(Clone)]
pub(crate) struct ConstraintData {
    pub cost_model: CostModel,
    pub initial_position: f64,
    pub initial_velocity: f64,
    pub belief_points: Vec<BeliefPoint>,
    pub time_stamps: Vec<f64>,
    pub track: Rc<dyn Track>,
    pub now: f64,
    pub dt_ms: u64,
    /// The risk level a fresh plan aims for: the midpoint of the bounds.
    pub risk_target: f64,
}

/// Inequality margin `risk_target - max_risk(plan)`; feasible when
/// non-negative.
pub(crate) fn constraint_margin(plan: &[f64], data: &ConstraintData) -> f64 {
    let (positions, _) = data
        .cost_model
        .rollout(plan, data.initial_position, data.initial_velocity);
    match risk::collision_probabilities(
        &data.belief_points,
        &data.time_stamps,
        &positions,
        data.track.as_ref(),
        data.now,
        data.cost_model.dt,
        data.dt_ms,
    ) {
        Ok(probabilities) => data.risk_target - risk::max_risk(&probabilities),
        Err(error) => {
            // Cannot happen after the agent's own risk evaluation passed
            // for the same belief; treat as violated to be safe.
            tracing::error!(%error, "risk evaluation failed inside the planner constraint");
            -1.0
        }
    }
}

/// The four canonical seeds of the fallback grid search: full braking,
/// coasting, full throttle, and the current plan. The feasible seed with
/// the lowest cost wins; with no feasible seed, the least-violated one.
pub(crate) fn grid_search_seed(current_plan: &[f64], data: &ConstraintData) -> Vec<f64> {
    let length = current_plan.len();
    let candidates = [
        vec![-1.0; length],
        vec![0.0; length],
        vec![1.0; length],
        current_plan.to_vec(),
    ];

    let mut best_cost = f64::INFINITY;
    let mut best_margin = f64::NEG_INFINITY;
    let mut feasible: Option<&Vec<f64>> = None;
    let mut least_violated: Option<&Vec<f64>> = None;

    for candidate in &candidates {
        let margin = constraint_margin(candidate, data);
        if margin > best_margin {
            best_margin = margin;
            least_violated = Some(candidate);
        }
        if margin >= 0.0 {
            let cost = data.cost_model.cost(candidate, data.initial_velocity);
            if cost < best_cost {
                best_cost = cost;
                feasible = Some(candidate);
            }
        }
    }

    feasible
        .or(least_violated)
        .cloned()
        .unwrap_or_else(|| current_plan.to_vec())
}

/// One SLSQP solve from `seed`. Returns the solver's final iterate and
/// whether it reported success; on failure the iterate is still the best
/// point the solver reached.
fn slsqp(seed: &[f64], data: &ConstraintData, max_evaluations: u32) -> (Vec<f64>, bool) {
    let dimensions = seed.len();

    let objective = {
        let model = data.cost_model;
        let initial_velocity = data.initial_velocity;
        move |plan: &[f64], gradient: Option<&mut [f64]>, _: &mut ()| -> f64 {
            if let Some(gradient) = gradient {
                gradient.copy_from_slice(&model.cost_gradient(plan, initial_velocity));
            }
            model.cost(plan, initial_velocity)
        }
    };

    let mut optimizer = Nlopt::new(
        Algorithm::Slsqp,
        dimensions,
        objective,
        Target::Minimize,
        (),
    );
    optimizer
        .set_lower_bounds(&vec![-1.0; dimensions])
        .expect("bounds match the plan dimension");
    optimizer
        .set_upper_bounds(&vec![1.0; dimensions])
        .expect("bounds match the plan dimension");
    optimizer
        .set_maxeval(max_evaluations)
        .expect("a positive evaluation cap is accepted");
    optimizer
        .set_xtol_rel(SOLVER_XTOL_REL)
        .expect("a positive tolerance is accepted");

    // nlopt expects fc(x) <= 0; the margin is >= 0 when feasible, so the
    // constraint value is its negation. SLSQP wants a Jacobian for the
    // constraint too; a forward difference matches the reference setup.
    let constraint =
        |plan: &[f64], gradient: Option<&mut [f64]>, data: &mut ConstraintData| -> f64 {
            let value = -constraint_margin(plan, data);
            if let Some(gradient) = gradient {
                let mut probe = plan.to_vec();
                for index in 0..plan.len() {
                    probe[index] = plan[index] + CONSTRAINT_FD_STEP;
                    gradient[index] =
                        (-constraint_margin(&probe, data) - value) / CONSTRAINT_FD_STEP;
                    probe[index] = plan[index];
                }
            }
            value
        };
    optimizer
        .add_inequality_constraint(constraint, data.clone(), 1e-8)
        .expect("the constraint is well-formed");

    let mut plan = seed.to_vec();
    let converged = optimizer.optimize(&mut plan).is_ok();
    (plan, converged)
}

/// Solve for a new plan: SLSQP from the current plan, then the
/// grid-search fallback, then accept the best effort.
pub(crate) fn optimize_plan(
    current_plan: &[f64],
    data: &ConstraintData,
    max_evaluations: u32,
) -> (Vec<f64>, bool) {
    let (plan, converged) = slsqp(current_plan, data, max_evaluations);
    if converged {
        return (plan, true);
    }
    let restart = grid_search_seed(current_plan, data);
    slsqp(&restart, data, max_evaluations)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;
    use cei_track::SymmetricMergingTrack;

    use super::*;

    fn model() -> CostModel {
        CostModel {
            dt: 0.05,
            max_acceleration: 2.5,
            resistance_coefficient: 0.0005,
            constant_resistance: 0.1,
            preferred_velocity: 10.0,
            theta: 1.0,
        }
    }

    #[test]
    fn cost_is_zero_effort_at_the_preferred_velocity_without_resistance() {
        let mut model = model();
        model.resistance_coefficient = 0.0;
        model.constant_resistance = 0.0;
        let plan = vec![0.0; 40];
        assert_relative_eq!(model.cost(&plan, 10.0), 0.0);
    }

    #[test]
    fn gradient_matches_central_finite_differences() {
        let model = model();
        let plan: Vec<f64> = (0..40).map(|i| 0.4 * ((i as f64) * 0.37).sin()).collect();
        let initial_velocity = 8.0;

        let gradient = model.cost_gradient(&plan, initial_velocity);
        let step = 1e-6;
        for index in 0..plan.len() {
            let mut probe = plan.clone();
            probe[index] = plan[index] + step;
            let upper = model.cost(&probe, initial_velocity);
            probe[index] = plan[index] - step;
            let lower = model.cost(&probe, initial_velocity);
            let estimate = (upper - lower) / (2.0 * step);
            assert!(
                (gradient[index] - estimate).abs() < 1e-5,
                "component {index}: analytic {} vs estimate {estimate}",
                gradient[index]
            );
        }
    }

    #[test]
    fn rollout_positions_integrate_the_velocities() {
        let model = model();
        let plan = vec![0.2; 20];
        let (positions, velocities) = model.rollout(&plan, 5.0, 10.0);
        assert_eq!(positions.len(), 20);
        assert!(positions.windows(2).all(|pair| pair[1] > pair[0]));
        assert_relative_eq!(velocities[0], model.velocities(&plan, 10.0)[0]);
    }

    #[test]
    fn grid_search_prefers_the_cheapest_feasible_seed() {
        let track = Rc::new(SymmetricMergingTrack::new(50.0, 25.0, 1.8, 4.5).unwrap());
        // far from the merge the constraint is slack for every seed, so
        // the grid search reduces to picking the cheapest candidate
        let data = ConstraintData {
            cost_model: model(),
            initial_position: 0.0,
            initial_velocity: 10.0,
            belief_points: vec![
                BeliefPoint {
                    mean: 0.0,
                    std_dev: 1.0,
                };
                3
            ],
            time_stamps: vec![0.25, 0.5, 0.75],
            track,
            now: 0.0,
            dt_ms: 50,
            risk_target: 0.35,
        };
        let current = vec![0.9; 15];
        let seed = grid_search_seed(&current, &data);
        // coasting tracks the preferred velocity better than full
        // throttle, full braking, or the near-full-throttle current plan
        assert_eq!(seed, vec![0.0; 15]);
    }
}
