//! The agent's per-tick control state machine.

use std::rc::Rc;

use cei_config::{AgentConfig, RiskBounds};
use cei_track::{Track, TrackSide};
use ndarray::Array1;
use unit_interval::SignedUnitInterval;

use crate::{
    belief::Belief,
    planner::{self, ConstraintData, CostModel},
    risk, Agent, AgentError, BeliefPoint, EgoState, Result, SimulationContext,
};

/// A communication-enabled interaction agent controlling one vehicle.
///
/// All plan and belief storage is allocated once at construction with its
/// final length; [`Agent::reset`] zeroes it in place. The agent is
/// initialized lazily on its first tick, when the other vehicle's state
/// first becomes observable.
pub struct CeiAgent {
    config: AgentConfig,
    side: TrackSide,
    track: Rc<dyn Track>,

    action_plan: Array1<f64>,
    velocity_plan: Array1<f64>,
    position_plan: Array1<f64>,

    belief: Belief,
    belief_point_contributing_to_risk: Vec<bool>,

    observed_communication: Option<f64>,
    perceived_risk: f64,
    time_of_last_update: f64,
    did_plan_update_on_last_tick: i8,
    is_initialized: bool,
}

impl std::fmt::Debug for CeiAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeiAgent")
            .field("side", &self.side)
            .field("perceived_risk", &self.perceived_risk)
            .field("is_initialized", &self.is_initialized)
            .finish_non_exhaustive()
    }
}

impl CeiAgent {
    /// Build an agent for the vehicle on `side` of `track`.
    ///
    /// Fails when the configuration violates the tick/belief/horizon
    /// commensurability rules.
    pub fn new(config: AgentConfig, side: TrackSide, track: Rc<dyn Track>) -> Result<Self> {
        config.validate()?;
        let plan_length = config.plan_length();
        let belief_length = config.belief_length();

        Ok(Self {
            config,
            side,
            track,
            action_plan: Array1::zeros(plan_length),
            velocity_plan: Array1::zeros(plan_length),
            position_plan: Array1::zeros(plan_length),
            belief: Belief::empty(belief_length),
            belief_point_contributing_to_risk: vec![false; belief_length - 1],
            observed_communication: None,
            perceived_risk: 0.0,
            time_of_last_update: 0.0,
            did_plan_update_on_last_tick: 0,
            is_initialized: false,
        })
    }

    /// The side of the track this agent drives on.
    #[inline(always)]
    #[must_use]
    pub fn side(&self) -> TrackSide {
        self.side
    }

    /// The agent's immutable configuration.
    #[inline(always)]
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The Gaussian belief over the other vehicle's future traveled
    /// distance, one point per belief instant.
    #[inline(always)]
    #[must_use]
    pub fn belief(&self) -> &[BeliefPoint] {
        self.belief.points()
    }

    /// Absolute simulation times of the belief points, seconds.
    #[inline(always)]
    #[must_use]
    pub fn belief_time_stamps(&self) -> &[f64] {
        self.belief.time_stamps()
    }

    /// The normalized acceleration sequence currently planned.
    #[inline(always)]
    #[must_use]
    pub fn action_plan(&self) -> &Array1<f64> {
        &self.action_plan
    }

    /// Planned velocities under the action plan.
    #[inline(always)]
    #[must_use]
    pub fn velocity_plan(&self) -> &Array1<f64> {
        &self.velocity_plan
    }

    /// Planned traveled distances under the action plan.
    #[inline(always)]
    #[must_use]
    pub fn position_plan(&self) -> &Array1<f64> {
        &self.position_plan
    }

    /// The maximum per-belief-point collision probability of the current
    /// plan.
    #[inline(always)]
    #[must_use]
    pub fn perceived_risk(&self) -> f64 {
        self.perceived_risk
    }

    /// The hysteresis band on perceived risk.
    #[inline(always)]
    #[must_use]
    pub fn risk_bounds(&self) -> RiskBounds {
        self.config.risk_bounds
    }

    /// `-1` after a comfort re-plan, `+1` after a safety re-plan, `0`
    /// otherwise.
    #[inline(always)]
    #[must_use]
    pub fn did_plan_update_on_last_tick(&self) -> i8 {
        self.did_plan_update_on_last_tick
    }

    /// Which belief points carried non-zero collision probability at the
    /// last risk evaluation.
    #[inline(always)]
    #[must_use]
    pub fn belief_point_contributing_to_risk(&self) -> &[bool] {
        &self.belief_point_contributing_to_risk
    }

    /// The last observed other-vehicle velocity, if any.
    #[inline(always)]
    #[must_use]
    pub fn observed_communication(&self) -> Option<f64> {
        self.observed_communication
    }

    /// Cost of an arbitrary candidate plan from the given vehicle state.
    #[must_use]
    pub fn plan_cost(&self, plan: &[f64], ego: &EgoState) -> f64 {
        self.cost_model(ego).cost(plan, ego.velocity)
    }

    /// Exact gradient of [`CeiAgent::plan_cost`] with respect to the
    /// plan.
    #[must_use]
    pub fn plan_cost_gradient(&self, plan: &[f64], ego: &EgoState) -> Vec<f64> {
        self.cost_model(ego).cost_gradient(plan, ego.velocity)
    }

    fn observe_communication(&mut self, context: &dyn SimulationContext) {
        self.observed_communication = context
            .current_state(self.side.other())
            .map(|(_, velocity)| velocity);
    }

    fn cost_model(&self, ego: &EgoState) -> CostModel {
        CostModel {
            dt: self.config.dt(),
            max_acceleration: ego.max_acceleration,
            resistance_coefficient: ego.resistance_coefficient,
            constant_resistance: ego.constant_resistance,
            preferred_velocity: self.config.preferred_velocity,
            theta: self.config.theta,
        }
    }

    /// Recompute `velocity_plan` and `position_plan` by integrating the
    /// vehicle model from the actual current state under `action_plan`.
    fn calculate_plans(&mut self, ego: &EgoState) {
        let model = self.cost_model(ego);
        let (positions, velocities) = model.rollout(
            self.action_plan
                .as_slice()
                .expect("plan arrays are contiguous"),
            ego.traveled_distance,
            ego.velocity,
        );
        self.position_plan = Array1::from(positions);
        self.velocity_plan = Array1::from(velocities);
    }

    /// Solve for a new action plan and refresh the derived plans.
    fn update_plan(&mut self, ego: &EgoState, now: f64) {
        let data = ConstraintData {
            cost_model: self.cost_model(ego),
            initial_position: ego.traveled_distance,
            initial_velocity: ego.velocity,
            belief_points: self.belief.points().to_vec(),
            time_stamps: self.belief.time_stamps().to_vec(),
            track: Rc::clone(&self.track),
            now,
            dt_ms: self.config.dt_ms,
            risk_target: self.config.risk_bounds.midpoint(),
        };

        let seed = self
            .action_plan
            .as_slice()
            .expect("plan arrays are contiguous");
        let (solution, converged) =
            planner::optimize_plan(seed, &data, self.config.max_solver_evaluations);
        if !converged {
            tracing::warn!(
                side = %self.side,
                time = now,
                "planning failed, accepting the solver's best effort"
            );
        }
        self.action_plan = Array1::from(solution);
        self.calculate_plans(ego);
    }

    /// Advance the plan one tick without re-optimizing: shift it left and
    /// refill the final slot with the acceleration that sustains the
    /// plan's terminal velocity against the resistances.
    fn continue_current_plan(&mut self, ego: &EgoState) {
        let length = self.action_plan.len();
        let target_velocity = self.velocity_plan[length - 1];

        self.action_plan
            .as_slice_mut()
            .expect("plan arrays are contiguous")
            .rotate_left(1);
        let sustaining = ego.resistance_coefficient * target_velocity * target_velocity
            + ego.constant_resistance;
        self.action_plan[length - 1] = sustaining / ego.max_acceleration;

        self.calculate_plans(ego);
    }

    /// Evaluate the collision risk of the current plans against the
    /// current belief, remembering which points contributed.
    fn evaluate_risk(&mut self, now: f64) -> Result<f64> {
        let probabilities = risk::collision_probabilities(
            self.belief.points(),
            self.belief.time_stamps(),
            self.position_plan
                .as_slice()
                .expect("plan arrays are contiguous"),
            self.track.as_ref(),
            now,
            self.config.dt(),
            self.config.dt_ms,
        )?;

        self.belief_point_contributing_to_risk.clear();
        self.belief_point_contributing_to_risk
            .extend(probabilities.iter().map(|probability| *probability > 0.0));

        let maximum = risk::max_risk(&probabilities);
        if maximum.is_finite() {
            Ok(maximum)
        } else {
            Err(AgentError::NonFinite {
                quantity: "perceived risk",
            })
        }
    }
}

impl Agent for CeiAgent {
    fn reset(&mut self) {
        self.action_plan.fill(0.0);
        self.velocity_plan.fill(0.0);
        self.position_plan.fill(0.0);
        self.belief.reset();
        self.belief_point_contributing_to_risk.fill(false);
        self.observed_communication = None;
        self.perceived_risk = 0.0;
        self.time_of_last_update = 0.0;
        self.did_plan_update_on_last_tick = 0;
        self.is_initialized = false;
    }

    fn compute_continuous_input(
        &mut self,
        _dt: f64,
        ego: EgoState,
        context: &dyn SimulationContext,
    ) -> Result<SignedUnitInterval> {
        let now = context.time_ms() as f64 / 1000.0;

        if !self.is_initialized {
            self.belief.initialize(
                context.current_state(self.side.other()),
                now,
                ego.max_acceleration,
                self.config.belief_period(),
            );
            self.belief.ensure_finite()?;
            self.update_plan(&ego, now);
            self.perceived_risk = self.evaluate_risk(now)?;
            self.is_initialized = true;
        } else {
            self.observe_communication(context);
            let new_point = context.time_ms() % self.config.belief_period_ms() == 0;
            self.belief.update(
                context.current_state(self.side.other()),
                self.observed_communication,
                now,
                new_point,
                ego.max_acceleration,
                self.config.max_comfortable_acceleration,
                self.config.belief_period(),
            );
            self.belief.ensure_finite()?;

            self.continue_current_plan(&ego);
            self.perceived_risk = self.evaluate_risk(now)?;

            if !ego.cruise_control_active {
                let saturated =
                    now - self.time_of_last_update > self.config.saturation_time;
                if self.perceived_risk < self.config.risk_bounds.lower() && saturated {
                    // comfort re-plan, rate limited by the saturation time
                    self.time_of_last_update = now;
                    self.did_plan_update_on_last_tick = -1;
                    self.update_plan(&ego, now);
                    self.perceived_risk = self.evaluate_risk(now)?;
                } else if self.perceived_risk > self.config.risk_bounds.upper() {
                    // safety re-plan, never rate limited
                    self.time_of_last_update = now;
                    self.did_plan_update_on_last_tick = 1;
                    self.update_plan(&ego, now);
                    self.perceived_risk = self.evaluate_risk(now)?;
                } else {
                    self.did_plan_update_on_last_tick = 0;
                }
            }
        }

        let command = self.action_plan[0];
        if command.is_finite() {
            Ok(SignedUnitInterval::saturating(command))
        } else {
            Err(AgentError::NonFinite {
                quantity: "action command",
            })
        }
    }
}
