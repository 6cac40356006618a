//! The communication-enabled interaction (CEI) agent core.
//!
//! A [`CeiAgent`] controls one vehicle along a parameterized track while
//! interacting with one other vehicle. Each control tick it
//!
//! 1. observes the other vehicle's velocity (the "communication"),
//! 2. updates a time-indexed Gaussian belief over where the other vehicle
//!    will be ([`belief`]),
//! 3. rolls its own acceleration plan forward one tick,
//! 4. evaluates the perceived collision risk of the plan against the
//!    belief ([`risk`]), and
//! 5. re-optimizes the plan when the risk leaves a hysteresis band
//!    ([`planner`]),
//!
//! finally emitting the first action of the plan. The agent performs no
//! I/O and holds no references back into the simulation; everything it
//! needs from the outside world arrives through the [`SimulationContext`]
//! and [`EgoState`] views passed into
//! [`Agent::compute_continuous_input`].

mod agent;
mod belief;
mod planner;
mod risk;

pub use agent::CeiAgent;
pub use belief::BeliefPoint;
use cei_track::TrackSide;
use cei_vehicle::PointMass;
use unit_interval::SignedUnitInterval;

/// Errors the agent core can surface. Configuration errors are fatal at
/// construction; the numeric errors abort the tick that produced them.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent was constructed with an inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(#[from] cei_config::ConfigError),
    /// A belief, risk or plan quantity became NaN or infinite.
    #[error("non-finite {quantity}")]
    NonFinite {
        /// Which quantity went non-finite.
        quantity: &'static str,
    },
    /// A belief point does not lie on the control tick grid.
    #[error(
        "belief point {seconds_from_now} s from now does not lie on the {dt_ms} ms control grid"
    )]
    OffTickBeliefPoint {
        /// Offset of the belief point from the current time, seconds.
        seconds_from_now: f64,
        /// Control tick length, milliseconds.
        dt_ms: u64,
    },
    /// A belief point maps to a plan index outside the action plan.
    #[error("belief point maps to plan index {index}, outside the plan of length {plan_length}")]
    BeliefOutsidePlan {
        /// The out-of-range index.
        index: i64,
        /// Length of the action plan.
        plan_length: usize,
    },
}

/// Result type for the agent core.
pub type Result<T> = std::result::Result<T, AgentError>;

/// What can be observed of a vehicle from the outside: traveled distance
/// and velocity.
pub type ObservedState = (f64, f64);

/// The simulation-side view the agent polls once per tick.
pub trait SimulationContext {
    /// Current simulation time in milliseconds.
    fn time_ms(&self) -> u64;

    /// Traveled distance and velocity of the vehicle on `side`, or `None`
    /// when no vehicle drives there.
    fn current_state(&self, side: TrackSide) -> Option<ObservedState>;
}

/// Snapshot of the controlled vehicle, taken at the start of a tick.
#[derive(Debug, Clone, Copy)]
pub struct EgoState {
    /// Arc length traveled along the ego track, metres.
    pub traveled_distance: f64,
    /// Longitudinal velocity, m/s.
    pub velocity: f64,
    /// Largest acceleration the actuator can produce, m/s².
    pub max_acceleration: f64,
    /// Quadratic drag coefficient, 1/m.
    pub resistance_coefficient: f64,
    /// Constant rolling resistance, m/s².
    pub constant_resistance: f64,
    /// Whether cruise control overrides the agent; suppresses re-planning.
    pub cruise_control_active: bool,
}

impl From<&PointMass> for EgoState {
    fn from(vehicle: &PointMass) -> Self {
        Self {
            traveled_distance: vehicle.traveled_distance(),
            velocity: vehicle.velocity(),
            max_acceleration: vehicle.max_acceleration(),
            resistance_coefficient: vehicle.resistance_coefficient(),
            constant_resistance: vehicle.constant_resistance(),
            cruise_control_active: vehicle.cruise_control_active(),
        }
    }
}

/// The contract between an agent and the simulation driver.
pub trait Agent {
    /// Restore the agent to its post-construction state.
    fn reset(&mut self);

    /// Run one control tick and return the next normalized acceleration
    /// command.
    fn compute_continuous_input(
        &mut self,
        dt: f64,
        ego: EgoState,
        context: &dyn SimulationContext,
    ) -> Result<SignedUnitInterval>;

    /// Reserved: the next discrete command in `{-1, 0, +1}`, if the agent
    /// produces one.
    fn compute_discrete_input(
        &mut self,
        _dt: f64,
        _ego: EgoState,
        _context: &dyn SimulationContext,
    ) -> Option<i8> {
        None
    }
}
