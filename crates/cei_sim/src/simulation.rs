//! The offline simulation loop.

use std::rc::Rc;

use cei_agent::{Agent, AgentError, CeiAgent, EgoState, SimulationContext};
use cei_config::{AgentConfig, ScenarioConfig, SideConfig, SimulationConstants, TrackConfig};
use cei_track::{StraightTrack, SymmetricMergingTrack, Track, TrackSide};
use cei_vehicle::PointMass;

use crate::trace::{Trace, TraceRow};

/// How a simulation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndState {
    /// Still running.
    NotFinished,
    /// A vehicle crossed the finish line.
    Finished,
    /// The vehicles' footprints overlapped.
    Collided,
    /// A vehicle left the drivable surface.
    BeyondTrackBounds,
    /// The wall-clock limit was reached first.
    TimeRanOut,
}

impl std::fmt::Display for EndState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NotFinished => "Not finished",
            Self::Finished => "Finished",
            Self::Collided => "Collided",
            Self::BeyondTrackBounds => "Beyond track bounds",
            Self::TimeRanOut => "Time ran out",
        };
        write!(f, "{label}")
    }
}

/// Errors raised while building or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The track could not be constructed from the scenario constants.
    #[error("failed to build the track: {0}")]
    Track(#[from] cei_track::TrackError),
    /// An agent configuration failed validation.
    #[error("invalid agent configuration: {0}")]
    Config(#[from] cei_config::ConfigError),
    /// An agent aborted its tick.
    #[error("the {side} agent failed: {source}")]
    Agent {
        /// Which side's agent failed.
        side: TrackSide,
        /// The underlying agent error.
        source: AgentError,
    },
}

/// A pair of values indexed by [`TrackSide`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BySide<T> {
    /// The left-hand value.
    pub left: T,
    /// The right-hand value.
    pub right: T,
}

impl<T> std::ops::Index<TrackSide> for BySide<T> {
    type Output = T;

    fn index(&self, side: TrackSide) -> &T {
        match side {
            TrackSide::Left => &self.left,
            TrackSide::Right => &self.right,
        }
    }
}

impl<T> std::ops::IndexMut<TrackSide> for BySide<T> {
    fn index_mut(&mut self, side: TrackSide) -> &mut T {
        match side {
            TrackSide::Left => &mut self.left,
            TrackSide::Right => &mut self.right,
        }
    }
}

struct SideSlot {
    vehicle: PointMass,
    agent: CeiAgent,
}

/// The world state every agent observes within one tick: frozen before
/// any vehicle integrates.
struct Snapshot {
    t_ms: u64,
    states: BySide<Option<(f64, f64)>>,
}

impl SimulationContext for Snapshot {
    fn time_ms(&self) -> u64 {
        self.t_ms
    }

    fn current_state(&self, side: TrackSide) -> Option<(f64, f64)> {
        self.states[side]
    }
}

/// A headless simulation of up to two vehicles, run tick by tick until a
/// terminal state is reached.
pub struct OfflineSimulation {
    constants: SimulationConstants,
    track: Rc<dyn Track>,
    sides: BySide<Option<SideSlot>>,
    t_ms: u64,
    end_state: EndState,
    trace: Trace,
}

impl OfflineSimulation {
    /// Assemble a simulation from a scenario description.
    pub fn from_scenario(scenario: &ScenarioConfig) -> Result<Self, SimulationError> {
        let constants = scenario.constants;
        let track: Rc<dyn Track> = match scenario.track {
            TrackConfig::Straight => Rc::new(StraightTrack::new(
                constants.track_section_length,
                constants.track_start_point_distance,
                constants.vehicle_length,
            )?),
            TrackConfig::SymmetricMerging => Rc::new(SymmetricMergingTrack::new(
                constants.track_section_length,
                constants.track_start_point_distance,
                constants.vehicle_width,
                constants.vehicle_length,
            )?),
        };

        let build = |side: TrackSide, config: &SideConfig| -> Result<SideSlot, SimulationError> {
            let agent_config = AgentConfig::new(&constants, &config.agent)?;
            let agent = CeiAgent::new(agent_config, side, Rc::clone(&track))
                .map_err(|source| SimulationError::Agent { side, source })?;
            Ok(SideSlot {
                vehicle: PointMass::new(config.vehicle),
                agent,
            })
        };

        let left = Some(build(TrackSide::Left, &scenario.left)?);
        let right = scenario
            .right
            .as_ref()
            .map(|config| build(TrackSide::Right, config))
            .transpose()?;

        Ok(Self {
            constants,
            track,
            sides: BySide { left, right },
            t_ms: 0,
            end_state: EndState::NotFinished,
            trace: Trace::default(),
        })
    }

    fn snapshot(&self) -> Snapshot {
        let state = |slot: &Option<SideSlot>| {
            slot.as_ref()
                .map(|slot| (slot.vehicle.traveled_distance(), slot.vehicle.velocity()))
        };
        Snapshot {
            t_ms: self.t_ms,
            states: BySide {
                left: state(&self.sides.left),
                right: state(&self.sides.right),
            },
        }
    }

    /// Run one tick: agents plan, vehicles integrate, terminal predicates
    /// are evaluated, a trace row is recorded.
    pub fn do_time_step(&mut self) -> Result<(), SimulationError> {
        let dt = self.constants.dt as f64 / 1000.0;
        let track = Rc::clone(&self.track);

        // All agents compute their input before any vehicle moves, so
        // every agent sees the same pre-tick world.
        let snapshot = self.snapshot();
        for side in TrackSide::BOTH {
            if let Some(slot) = &mut self.sides[side] {
                let ego = EgoState::from(&slot.vehicle);
                let command = slot
                    .agent
                    .compute_continuous_input(dt, ego, &snapshot)
                    .map_err(|source| SimulationError::Agent { side, source })?;
                slot.vehicle.set_continuous_acceleration(command);
            }
        }

        for side in TrackSide::BOTH {
            if let Some(slot) = &mut self.sides[side] {
                slot.vehicle.update_model(dt);

                let position =
                    track.traveled_distance_to_coordinates(slot.vehicle.traveled_distance(), side);
                if track.is_beyond_track_bounds(position) {
                    self.end_state = EndState::BeyondTrackBounds;
                } else if track.is_beyond_finish(position) {
                    self.end_state = EndState::Finished;
                }
            }
        }

        if let (Some(left), Some(right)) = (&self.sides.left, &self.sides.right) {
            let (lower, upper) = track.collision_bounds(
                left.vehicle.traveled_distance(),
                self.constants.vehicle_width,
                self.constants.vehicle_length,
            );
            if let (Some(lower), Some(upper)) = (lower, upper) {
                let other = right.vehicle.traveled_distance();
                if lower <= other && other <= upper {
                    self.end_state = EndState::Collided;
                }
            }
        }

        self.t_ms += self.constants.dt;
        self.record();
        Ok(())
    }

    /// Tick until a terminal state or the wall-clock limit.
    pub fn run(&mut self) -> Result<EndState, SimulationError> {
        self.record();
        while self.t_ms <= self.constants.max_time && self.end_state == EndState::NotFinished {
            self.do_time_step()?;
        }
        if self.end_state == EndState::NotFinished {
            self.end_state = EndState::TimeRanOut;
        }
        tracing::info!(end_state = %self.end_state, time_ms = self.t_ms, "simulation ended");
        Ok(self.end_state)
    }

    fn record(&mut self) {
        for side in TrackSide::BOTH {
            if let Some(slot) = &self.sides[side] {
                let row = TraceRow {
                    time_ms: self.t_ms,
                    side,
                    traveled_distance: slot.vehicle.traveled_distance(),
                    velocity: slot.vehicle.velocity(),
                    acceleration: slot.vehicle.acceleration(),
                    net_acceleration: slot.vehicle.net_acceleration(),
                    raw_input: slot.vehicle.acceleration() / slot.vehicle.max_acceleration(),
                    perceived_risk: slot.agent.perceived_risk(),
                    did_plan_update: slot.agent.did_plan_update_on_last_tick(),
                };
                self.trace.push(row);
            }
        }
    }

    /// How the run ended (or [`EndState::NotFinished`] while running).
    #[inline(always)]
    #[must_use]
    pub fn end_state(&self) -> EndState {
        self.end_state
    }

    /// Current simulation time, milliseconds.
    #[inline(always)]
    #[must_use]
    pub fn time_ms(&self) -> u64 {
        self.t_ms
    }

    /// The shared constants the simulation was built with.
    #[inline(always)]
    #[must_use]
    pub fn constants(&self) -> &SimulationConstants {
        &self.constants
    }

    /// The recorded per-tick trace.
    #[inline(always)]
    #[must_use]
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// The vehicle on `side`, if one was configured.
    #[must_use]
    pub fn vehicle(&self, side: TrackSide) -> Option<&PointMass> {
        self.sides[side].as_ref().map(|slot| &slot.vehicle)
    }

    /// The agent on `side`, if one was configured.
    #[must_use]
    pub fn agent(&self, side: TrackSide) -> Option<&CeiAgent> {
        self.sides[side].as_ref().map(|slot| &slot.agent)
    }
}
