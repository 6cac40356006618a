//! The longitudinal point-mass vehicle model.
//!
//! The integrator [`step_1d`] is a pure function of the previous state so
//! that the simulation, the agent's plan rollouts and the planner's cost
//! function all advance a vehicle in exactly the same way. [`PointMass`]
//! wraps it with the actuation interface the simulation driver uses.

use cei_config::VehicleParameters;
use unit_interval::SignedUnitInterval;

/// Advance a 1-D point mass by one time step.
///
/// The net acceleration is the commanded acceleration minus quadratic drag
/// (`c_quad * vel²`) and constant rolling resistance (`c_const`), held
/// constant across the step:
///
/// ```text
/// net  = accel - c_quad * vel^2 - c_const
/// pos' = pos + vel * dt + net / 2 * dt^2
/// vel' = vel + net * dt
/// ```
///
/// Returns `(pos', vel')`.
#[inline]
#[must_use]
pub fn step_1d(
    dt: f64,
    position: f64,
    velocity: f64,
    acceleration: f64,
    resistance_coefficient: f64,
    constant_resistance: f64,
) -> (f64, f64) {
    let net_acceleration =
        acceleration - resistance_coefficient * velocity * velocity - constant_resistance;
    let new_position = position + velocity * dt + net_acceleration / 2.0 * dt * dt;
    let new_velocity = velocity + net_acceleration * dt;
    (new_position, new_velocity)
}

/// A controllable 1-D point mass driving along a track centerline.
///
/// State is the traveled distance along its own track and the
/// longitudinal velocity; the world position is derived through the track
/// by whoever needs it.
#[derive(Debug, Clone)]
pub struct PointMass {
    traveled_distance: f64,
    velocity: f64,
    acceleration: f64,
    max_acceleration: f64,
    resistance_coefficient: f64,
    constant_resistance: f64,
    cruise_control_active: bool,
    cruise_control_velocity: f64,
    parameters: VehicleParameters,
}

impl PointMass {
    /// Build a vehicle from its parameters, at its configured initial
    /// state.
    #[must_use]
    pub fn new(parameters: VehicleParameters) -> Self {
        Self {
            traveled_distance: parameters.initial_traveled_distance,
            velocity: parameters.initial_velocity,
            acceleration: 0.0,
            max_acceleration: parameters.max_acceleration,
            resistance_coefficient: parameters.resistance_coefficient,
            constant_resistance: parameters.constant_resistance,
            cruise_control_active: parameters.cruise_control_active,
            cruise_control_velocity: parameters.cruise_velocity(),
            parameters,
        }
    }

    /// Restore the initial state.
    pub fn reset(&mut self) {
        *self = Self::new(self.parameters);
    }

    /// Apply a normalized acceleration command in `[-1, 1]`.
    ///
    /// While cruise control is active the command is ignored and replaced
    /// by the resistance-compensating acceleration plus a proportional
    /// correction toward the cruise velocity, clamped to the actuator
    /// limit.
    pub fn set_continuous_acceleration(&mut self, command: SignedUnitInterval) {
        self.acceleration = if self.cruise_control_active {
            let sustain = self.resistance_coefficient * self.velocity * self.velocity
                + self.constant_resistance;
            let correction = self.cruise_control_velocity - self.velocity;
            (sustain + correction).clamp(-self.max_acceleration, self.max_acceleration)
        } else {
            command.get() * self.max_acceleration
        };
    }

    /// Integrate one tick under the currently commanded acceleration.
    pub fn update_model(&mut self, dt: f64) {
        let (position, velocity) = step_1d(
            dt,
            self.traveled_distance,
            self.velocity,
            self.acceleration,
            self.resistance_coefficient,
            self.constant_resistance,
        );
        self.traveled_distance = position;
        self.velocity = velocity;
    }

    /// Arc length traveled along the vehicle's own track, metres.
    #[inline(always)]
    #[must_use]
    pub fn traveled_distance(&self) -> f64 {
        self.traveled_distance
    }

    /// Longitudinal velocity, m/s.
    #[inline(always)]
    #[must_use]
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// The currently commanded gross acceleration, m/s².
    #[inline(always)]
    #[must_use]
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// The commanded acceleration minus the resistances at the current
    /// velocity, m/s².
    #[must_use]
    pub fn net_acceleration(&self) -> f64 {
        self.acceleration
            - self.resistance_coefficient * self.velocity * self.velocity
            - self.constant_resistance
    }

    /// Largest acceleration the actuator can produce, m/s².
    #[inline(always)]
    #[must_use]
    pub fn max_acceleration(&self) -> f64 {
        self.max_acceleration
    }

    /// Quadratic drag coefficient, 1/m.
    #[inline(always)]
    #[must_use]
    pub fn resistance_coefficient(&self) -> f64 {
        self.resistance_coefficient
    }

    /// Constant rolling resistance, m/s².
    #[inline(always)]
    #[must_use]
    pub fn constant_resistance(&self) -> f64 {
        self.constant_resistance
    }

    /// Whether cruise control currently overrides acceleration commands.
    #[inline(always)]
    #[must_use]
    pub fn cruise_control_active(&self) -> bool {
        self.cruise_control_active
    }

    /// Engage or release cruise control.
    pub fn set_cruise_control_active(&mut self, active: bool) {
        self.cruise_control_active = active;
    }
}
