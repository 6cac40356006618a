//! Configuration for the communication-enabled interaction (CEI) model.
//!
//! Everything here is immutable once a simulation is assembled: the shared
//! [`SimulationConstants`], the per-vehicle [`VehicleParameters`], the
//! per-agent [`AgentParameters`], and the [`AgentConfig`] the agent core is
//! constructed from. Scenario files are TOML, read through
//! [`read_scenario`].

mod reader;

pub use reader::{read_scenario, ParseError};
use serde::{Deserialize, Serialize};
use unit_interval::UnitInterval;

/// Errors raised when a configuration is internally inconsistent.
///
/// All of these are fatal at construction time; a running agent never sees
/// an invalid configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The control tick length must be a positive number of milliseconds.
    #[error("control tick length must be positive, got {0} ms")]
    ZeroTick(u64),
    /// `(1000 / dt_ms) * time_horizon` must be a positive integer, the
    /// number of actions in a plan.
    #[error(
        "planning horizon of {time_horizon} s is not a whole number of {dt_ms} ms control ticks"
    )]
    HorizonNotTickAligned {
        /// Control tick length in milliseconds.
        dt_ms: u64,
        /// Planning horizon in seconds.
        time_horizon: f64,
    },
    /// `belief_frequency * time_horizon` must be a positive integer, the
    /// number of belief points (minus the seed point).
    #[error(
        "belief frequency of {belief_frequency} Hz does not divide the {time_horizon} s horizon \
         into a whole number of points"
    )]
    HorizonNotBeliefAligned {
        /// Belief sampling frequency in Hz.
        belief_frequency: u64,
        /// Planning horizon in seconds.
        time_horizon: f64,
    },
    /// `(1000 / dt_ms) / belief_frequency` must be a positive integer so
    /// that belief points always land on control ticks.
    #[error(
        "belief frequency of {belief_frequency} Hz is not a whole number of {dt_ms} ms control \
         ticks per belief period"
    )]
    BeliefPeriodNotTickAligned {
        /// Control tick length in milliseconds.
        dt_ms: u64,
        /// Belief sampling frequency in Hz.
        belief_frequency: u64,
    },
    /// A risk bound is outside `[0, 1]`.
    #[error("risk bounds must lie in [0, 1], got {value}")]
    RiskBoundOutsideUnitInterval {
        /// Offered value.
        value: f64,
    },
    /// The lower risk bound must be strictly below the upper one.
    #[error("risk bounds must satisfy lower < upper, got ({lower}, {upper})")]
    InvertedRiskBounds {
        /// Offered lower bound.
        lower: f64,
        /// Offered upper bound.
        upper: f64,
    },
    /// A parameter that must be non-negative was negative, or not finite.
    #[error("{name} must be finite and non-negative, got {value}")]
    NegativeParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Offered value.
        value: f64,
    },
    /// A parameter that must be strictly positive was not.
    #[error("{name} must be finite and positive, got {value}")]
    NonPositiveParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Offered value.
        value: f64,
    },
}

/// Result type for fallible constructors in this crate.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The hysteresis band on perceived risk: a re-plan is triggered when the
/// perceived risk leaves `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRiskBounds", into = "RawRiskBounds")]
pub struct RiskBounds {
    lower: UnitInterval,
    upper: UnitInterval,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawRiskBounds {
    lower: f64,
    upper: f64,
}

impl RiskBounds {
    /// Create risk bounds, requiring `0 <= lower < upper <= 1`.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let check = |value: f64| {
            UnitInterval::new(value)
                .map_err(|_| ConfigError::RiskBoundOutsideUnitInterval { value })
        };
        let (lower, upper) = (check(lower)?, check(upper)?);
        if lower.get() >= upper.get() {
            return Err(ConfigError::InvertedRiskBounds {
                lower: lower.get(),
                upper: upper.get(),
            });
        }
        Ok(Self { lower, upper })
    }

    /// The bound below which a comfort re-plan is considered.
    #[inline(always)]
    #[must_use]
    pub fn lower(&self) -> f64 {
        self.lower.get()
    }

    /// The bound above which a safety re-plan is forced.
    #[inline(always)]
    #[must_use]
    pub fn upper(&self) -> f64 {
        self.upper.get()
    }

    /// The midpoint of the band, used as the risk level a new plan aims
    /// for.
    #[inline(always)]
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        (self.lower.get() + self.upper.get()) / 2.0
    }
}

impl TryFrom<RawRiskBounds> for RiskBounds {
    type Error = ConfigError;

    fn try_from(raw: RawRiskBounds) -> Result<Self> {
        Self::new(raw.lower, raw.upper)
    }
}

impl From<RiskBounds> for RawRiskBounds {
    fn from(bounds: RiskBounds) -> Self {
        Self {
            lower: bounds.lower(),
            upper: bounds.upper(),
        }
    }
}

/// Constants shared by every object in a simulation. These are enough to
/// rebuild the track and replay a recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationConstants {
    /// Control tick length in milliseconds.
    pub dt: u64,
    /// Vehicle width in metres.
    pub vehicle_width: f64,
    /// Vehicle length in metres.
    pub vehicle_length: f64,
    /// Distance between the two start points in metres.
    pub track_start_point_distance: f64,
    /// Length of one track section in metres.
    pub track_section_length: f64,
    /// Wall-clock duration after which a run is aborted, in milliseconds.
    pub max_time: u64,
}

impl Default for SimulationConstants {
    fn default() -> Self {
        Self {
            dt: 50,
            vehicle_width: 1.8,
            vehicle_length: 4.5,
            track_start_point_distance: 25.0,
            track_section_length: 50.0,
            max_time: 40_000,
        }
    }
}

/// Point-mass vehicle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct VehicleParameters {
    /// Traveled distance along the vehicle's own track at t = 0, metres.
    pub initial_traveled_distance: f64,
    /// Velocity at t = 0, m/s.
    pub initial_velocity: f64,
    /// Set-point used while cruise control is active; defaults to the
    /// initial velocity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cruise_control_velocity: Option<f64>,
    /// Whether cruise control overrides the agent's acceleration command.
    pub cruise_control_active: bool,
    /// Quadratic drag coefficient, 1/m.
    pub resistance_coefficient: f64,
    /// Constant rolling resistance, m/s².
    pub constant_resistance: f64,
    /// Largest acceleration the actuator can produce, m/s².
    pub max_acceleration: f64,
}

impl Default for VehicleParameters {
    fn default() -> Self {
        Self {
            initial_traveled_distance: 0.0,
            initial_velocity: 10.0,
            cruise_control_velocity: None,
            cruise_control_active: false,
            resistance_coefficient: 0.0005,
            constant_resistance: 0.1,
            max_acceleration: 2.5,
        }
    }
}

impl VehicleParameters {
    /// The cruise-control set-point, falling back to the initial velocity.
    #[must_use]
    pub fn cruise_velocity(&self) -> f64 {
        self.cruise_control_velocity
            .unwrap_or(self.initial_velocity)
    }
}

/// Per-agent knobs of the decision model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentParameters {
    /// The velocity the cost function tracks, m/s.
    pub preferred_velocity: f64,
    /// Weight of the actuation-effort term in the cost, dimensionless.
    pub theta: f64,
    /// Hysteresis band on perceived risk.
    pub risk_bounds: RiskBounds,
    /// Minimum spacing between comfort re-plans, seconds.
    pub saturation_time: f64,
    /// Planning horizon, seconds.
    pub time_horizon: f64,
    /// Belief samples per second along the horizon, Hz.
    pub belief_frequency: u64,
    /// Evaluation cap handed to the nonlinear solver.
    pub max_solver_evaluations: u32,
}

impl Default for AgentParameters {
    fn default() -> Self {
        Self {
            preferred_velocity: 10.0,
            theta: 1.0,
            risk_bounds: RiskBounds {
                lower: UnitInterval::saturating(0.2),
                upper: UnitInterval::saturating(0.5),
            },
            saturation_time: 2.0,
            time_horizon: 4.0,
            belief_frequency: 4,
            max_solver_evaluations: 500,
        }
    }
}

/// The full immutable configuration of one agent, assembled from the
/// simulation constants and the per-agent parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentConfig {
    /// Control tick length in milliseconds.
    pub dt_ms: u64,
    /// Planning horizon, seconds.
    pub time_horizon: f64,
    /// Belief samples per second along the horizon, Hz.
    pub belief_frequency: u64,
    /// The velocity the cost function tracks, m/s.
    pub preferred_velocity: f64,
    /// Weight of the actuation-effort term in the cost.
    pub theta: f64,
    /// Hysteresis band on perceived risk.
    pub risk_bounds: RiskBounds,
    /// Minimum spacing between comfort re-plans, seconds.
    pub saturation_time: f64,
    /// Vehicle width in metres.
    pub vehicle_width: f64,
    /// Vehicle length in metres.
    pub vehicle_length: f64,
    /// Acceleration bound assumed for the communication likelihood, m/s².
    pub max_comfortable_acceleration: f64,
    /// Evaluation cap handed to the nonlinear solver.
    pub max_solver_evaluations: u32,
}

impl AgentConfig {
    /// Assemble an agent configuration and validate it.
    pub fn new(constants: &SimulationConstants, parameters: &AgentParameters) -> Result<Self> {
        let config = Self {
            dt_ms: constants.dt,
            time_horizon: parameters.time_horizon,
            belief_frequency: parameters.belief_frequency,
            preferred_velocity: parameters.preferred_velocity,
            theta: parameters.theta,
            risk_bounds: parameters.risk_bounds,
            saturation_time: parameters.saturation_time,
            vehicle_width: constants.vehicle_width,
            vehicle_length: constants.vehicle_length,
            // Fixed bound on comfortable acceleration (Hoberock 1977).
            max_comfortable_acceleration: 1.0,
            max_solver_evaluations: parameters.max_solver_evaluations,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the commensurability rules between the control tick, the
    /// belief frequency and the horizon, and the sign constraints on the
    /// scalar parameters.
    pub fn validate(&self) -> Result<()> {
        if self.dt_ms == 0 {
            return Err(ConfigError::ZeroTick(self.dt_ms));
        }

        let positive = |name, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::NonPositiveParameter { name, value })
            }
        };
        let non_negative = |name, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::NegativeParameter { name, value })
            }
        };

        positive("time-horizon", self.time_horizon)?;
        positive("vehicle-width", self.vehicle_width)?;
        positive("vehicle-length", self.vehicle_length)?;
        positive(
            "max-comfortable-acceleration",
            self.max_comfortable_acceleration,
        )?;
        non_negative("theta", self.theta)?;
        non_negative("saturation-time", self.saturation_time)?;
        non_negative("preferred-velocity", self.preferred_velocity)?;
        if self.belief_frequency == 0 {
            return Err(ConfigError::BeliefPeriodNotTickAligned {
                dt_ms: self.dt_ms,
                belief_frequency: self.belief_frequency,
            });
        }

        let ticks_per_second = 1000.0 / self.dt_ms as f64;

        let plan_length = ticks_per_second * self.time_horizon;
        if !is_positive_integer(plan_length) {
            return Err(ConfigError::HorizonNotTickAligned {
                dt_ms: self.dt_ms,
                time_horizon: self.time_horizon,
            });
        }

        let belief_points = self.belief_frequency as f64 * self.time_horizon;
        if !is_positive_integer(belief_points) {
            return Err(ConfigError::HorizonNotBeliefAligned {
                belief_frequency: self.belief_frequency,
                time_horizon: self.time_horizon,
            });
        }

        let ticks_per_belief_period = ticks_per_second / self.belief_frequency as f64;
        if !is_positive_integer(ticks_per_belief_period) {
            return Err(ConfigError::BeliefPeriodNotTickAligned {
                dt_ms: self.dt_ms,
                belief_frequency: self.belief_frequency,
            });
        }

        Ok(())
    }

    /// Control tick length in seconds.
    #[inline(always)]
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt_ms as f64 / 1000.0
    }

    /// Number of actions in a plan: `(1000 / dt_ms) * time_horizon`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn plan_length(&self) -> usize {
        ((1000.0 / self.dt_ms as f64) * self.time_horizon).round() as usize
    }

    /// Number of belief points: `belief_frequency * time_horizon + 1`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn belief_length(&self) -> usize {
        (self.belief_frequency as f64 * self.time_horizon).round() as usize + 1
    }

    /// Spacing of the belief timeline, seconds.
    #[inline(always)]
    #[must_use]
    pub fn belief_period(&self) -> f64 {
        1.0 / self.belief_frequency as f64
    }

    /// Spacing of the belief timeline in whole milliseconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn belief_period_ms(&self) -> u64 {
        let ticks = (1000.0 / self.dt_ms as f64) / self.belief_frequency as f64;
        ticks.round() as u64 * self.dt_ms
    }
}

fn is_positive_integer(value: f64) -> bool {
    value >= 0.5 && (value - value.round()).abs() < 1e-9
}

/// Which track a scenario runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum TrackConfig {
    /// Both vehicles on a single straight line (leader/follower).
    Straight,
    /// Two symmetric approach branches merging into a shared section.
    SymmetricMerging,
}

/// Configuration of one side of a scenario: a vehicle plus its agent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SideConfig {
    /// The vehicle's physical parameters.
    pub vehicle: VehicleParameters,
    /// The agent's decision-model parameters.
    pub agent: AgentParameters,
}

/// A complete scenario: constants, track and up to two sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioConfig {
    /// Display name, used for trace file naming.
    #[serde(default)]
    pub name: String,
    /// Which track geometry to build.
    pub track: TrackConfig,
    /// Shared simulation constants.
    #[serde(default)]
    pub constants: SimulationConstants,
    /// The left-hand vehicle and agent.
    pub left: SideConfig,
    /// The right-hand vehicle and agent, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<SideConfig>,
}
