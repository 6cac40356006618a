//! Behavioral tests of the agent core: shape invariants of the belief and
//! plan state, Jacobian correctness over reachable states, the re-plan
//! hysteresis, and the degenerate single-vehicle cases.

use std::rc::Rc;

use approx::assert_relative_eq;
use cei_agent::{Agent, CeiAgent, EgoState, SimulationContext};
use cei_config::{AgentConfig, AgentParameters, RiskBounds, SimulationConstants, VehicleParameters};
use cei_track::{SymmetricMergingTrack, Track, TrackSide};
use cei_vehicle::{step_1d, PointMass};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A scripted stand-in for the simulation driver: time plus an optional
/// other vehicle moving at constant velocity.
struct ScriptedContext {
    t_ms: u64,
    other_side: TrackSide,
    other: Option<(f64, f64)>,
}

impl ScriptedContext {
    fn new(other_side: TrackSide, other: Option<(f64, f64)>) -> Self {
        Self {
            t_ms: 0,
            other_side,
            other,
        }
    }

    fn advance(&mut self, dt_ms: u64) {
        self.t_ms += dt_ms;
        if let Some((traveled, velocity)) = &mut self.other {
            *traveled += *velocity * dt_ms as f64 / 1000.0;
        }
    }
}

impl SimulationContext for ScriptedContext {
    fn time_ms(&self) -> u64 {
        self.t_ms
    }

    fn current_state(&self, side: TrackSide) -> Option<(f64, f64)> {
        if side == self.other_side {
            self.other
        } else {
            None
        }
    }
}

#[allow(clippy::unwrap_used)]
fn default_track() -> Rc<dyn Track> {
    Rc::new(SymmetricMergingTrack::new(50.0, 25.0, 1.8, 4.5).unwrap())
}

#[allow(clippy::unwrap_used)]
fn agent_with(
    constants: &SimulationConstants,
    parameters: &AgentParameters,
    track: Rc<dyn Track>,
) -> CeiAgent {
    let config = AgentConfig::new(constants, parameters).unwrap();
    CeiAgent::new(config, TrackSide::Left, track).unwrap()
}

/// One tick: snapshot the ego vehicle, run the agent, actuate and
/// integrate, advance the context.
fn tick(
    agent: &mut CeiAgent,
    vehicle: &mut PointMass,
    context: &mut ScriptedContext,
    dt_ms: u64,
) -> (EgoState, f64) {
    let ego = EgoState::from(&*vehicle);
    #[allow(clippy::unwrap_used)]
    let command = agent
        .compute_continuous_input(dt_ms as f64 / 1000.0, ego, context)
        .unwrap();
    vehicle.set_continuous_acceleration(command);
    vehicle.update_model(dt_ms as f64 / 1000.0);
    context.advance(dt_ms);
    (ego, command.get())
}

#[test]
fn belief_and_plan_invariants_hold_across_configurations() {
    // (dt ms, belief Hz, horizon s), all satisfying the commensurability
    // rules
    let grids = [(50, 4, 4.0), (100, 2, 3.0), (25, 8, 2.0), (50, 5, 2.0)];

    for (dt, belief_frequency, time_horizon) in grids {
        let constants = SimulationConstants {
            dt,
            ..SimulationConstants::default()
        };
        let parameters = AgentParameters {
            belief_frequency,
            time_horizon,
            ..AgentParameters::default()
        };
        let mut agent = agent_with(&constants, &parameters, default_track());
        let mut vehicle = PointMass::new(VehicleParameters::default());
        let mut context = ScriptedContext::new(TrackSide::Right, Some((0.0, 10.0)));

        let plan_length = agent.config().plan_length();
        let belief_length = agent.config().belief_length();
        let period = agent.config().belief_period();
        let dt_s = agent.config().dt();

        for _ in 0..25 {
            let (ego, _) = tick(&mut agent, &mut vehicle, &mut context, dt);

            assert_eq!(agent.belief().len(), belief_length);
            assert!(agent
                .belief()
                .iter()
                .all(|point| point.std_dev >= 1e-3 && point.mean.is_finite()));

            let stamps = agent.belief_time_stamps();
            assert_eq!(stamps.len(), belief_length);
            for pair in stamps.windows(2) {
                assert_relative_eq!(pair[1] - pair[0], period, epsilon = 1e-9);
            }

            // every belief point except the last lies on the control grid
            let now = (context.t_ms - dt) as f64 / 1000.0;
            for stamp in &stamps[..belief_length - 1] {
                let ticks = (stamp - now) / dt_s;
                assert!((ticks - ticks.round()).abs() < 1e-10);
            }

            assert_eq!(agent.action_plan().len(), plan_length);
            assert!(agent
                .action_plan()
                .iter()
                .all(|command| (-1.0..=1.0).contains(command)));

            // the position plan is the forward integration of the vehicle
            // model from the snapshot the agent saw
            let mut position = ego.traveled_distance;
            let mut velocity = ego.velocity;
            for (command, planned) in agent.action_plan().iter().zip(agent.position_plan()) {
                (position, velocity) = step_1d(
                    dt_s,
                    position,
                    velocity,
                    command * ego.max_acceleration,
                    ego.resistance_coefficient,
                    ego.constant_resistance,
                );
                assert_relative_eq!(position, *planned, epsilon = 1e-9);
            }
        }
    }
}

#[test]
#[allow(clippy::unwrap_used)]
fn jacobian_matches_finite_differences_over_reachable_states() {
    let mut rng = StdRng::seed_from_u64(0xc0ffee);

    let section_length = rng.gen_range(10.0..100.0);
    let start_point_distance = rng.gen_range(0.3 * section_length..0.8 * section_length);
    let vehicle_length = rng.gen_range(3.0..8.0);
    let vehicle_width = rng.gen_range(vehicle_length / 2.0..vehicle_length);

    let constants = SimulationConstants {
        dt: 50,
        vehicle_width,
        vehicle_length,
        track_start_point_distance: start_point_distance,
        track_section_length: section_length,
        max_time: 30_000,
    };
    let parameters = AgentParameters {
        risk_bounds: RiskBounds::new(0.15, 0.3).unwrap(),
        saturation_time: 1.0,
        ..AgentParameters::default()
    };
    let track: Rc<dyn Track> = Rc::new(
        SymmetricMergingTrack::new(
            section_length,
            start_point_distance,
            vehicle_width,
            vehicle_length,
        )
        .unwrap(),
    );

    let mut agent = agent_with(&constants, &parameters, track);
    let mut vehicle = PointMass::new(VehicleParameters::default());
    let mut context = ScriptedContext::new(TrackSide::Right, None);

    let step = 1e-6;
    for _ in 0..200 {
        let (ego, _) = tick(&mut agent, &mut vehicle, &mut context, 50);

        let plan = agent.action_plan().to_vec();
        let gradient = agent.plan_cost_gradient(&plan, &ego);
        let mut probe = plan.clone();
        for index in 0..plan.len() {
            probe[index] = plan[index] + step;
            let upper = agent.plan_cost(&probe, &ego);
            probe[index] = plan[index] - step;
            let lower = agent.plan_cost(&probe, &ego);
            probe[index] = plan[index];

            let estimate = (upper - lower) / (2.0 * step);
            assert!(
                (gradient[index] - estimate).abs() < 1e-5,
                "gradient component {index} is {} but the finite-difference estimate is {estimate}",
                gradient[index]
            );
        }
    }
}

#[test]
#[allow(clippy::unwrap_used)]
fn risk_inside_the_band_never_triggers_a_replan() {
    // with the band spanning all of [0, 1], the perceived risk can never
    // leave it: no comfort re-plan at the lower bound, no safety re-plan
    // at the upper bound
    let constants = SimulationConstants::default();
    let parameters = AgentParameters {
        risk_bounds: RiskBounds::new(0.0, 1.0).unwrap(),
        saturation_time: 0.0,
        ..AgentParameters::default()
    };
    let mut agent = agent_with(&constants, &parameters, default_track());
    let mut vehicle = PointMass::new(VehicleParameters::default());
    let mut context = ScriptedContext::new(TrackSide::Right, Some((0.0, 10.0)));

    tick(&mut agent, &mut vehicle, &mut context, 50);
    for _ in 0..30 {
        tick(&mut agent, &mut vehicle, &mut context, 50);
        assert_eq!(agent.did_plan_update_on_last_tick(), 0);
    }
}

#[test]
fn cruise_control_suppresses_all_replanning() {
    // a vanishingly small risk band would re-plan on almost every tick,
    // but cruise control takes the whole branch out
    let constants = SimulationConstants::default();
    #[allow(clippy::unwrap_used)]
    let parameters = AgentParameters {
        risk_bounds: RiskBounds::new(0.001, 0.002).unwrap(),
        saturation_time: 0.0,
        ..AgentParameters::default()
    };
    let vehicle_parameters = VehicleParameters {
        cruise_control_active: true,
        ..VehicleParameters::default()
    };
    let mut agent = agent_with(&constants, &parameters, default_track());
    let mut vehicle = PointMass::new(vehicle_parameters);
    let mut context = ScriptedContext::new(TrackSide::Right, Some((0.0, 10.0)));

    tick(&mut agent, &mut vehicle, &mut context, 50);
    for _ in 0..20 {
        tick(&mut agent, &mut vehicle, &mut context, 50);
        assert_eq!(agent.did_plan_update_on_last_tick(), 0);
    }
}

#[test]
fn first_action_sustains_cruise_when_alone() {
    // without another vehicle there is no collision risk anywhere on the
    // plan, so the optimum is to hold the preferred velocity
    let constants = SimulationConstants::default();
    let parameters = AgentParameters::default();
    let mut agent = agent_with(&constants, &parameters, default_track());
    let vehicle = PointMass::new(VehicleParameters::default());
    let context = ScriptedContext::new(TrackSide::Right, None);

    let ego = EgoState::from(&vehicle);
    #[allow(clippy::unwrap_used)]
    let command = agent.compute_continuous_input(0.05, ego, &context).unwrap();

    let sustaining = (ego.resistance_coefficient * ego.velocity * ego.velocity
        + ego.constant_resistance)
        / ego.max_acceleration;
    assert!(
        (command.get() - sustaining).abs() < 0.01,
        "first action {} should sustain the preferred velocity ({sustaining})",
        command.get()
    );
    assert_relative_eq!(agent.perceived_risk(), 0.0);
}

#[test]
fn reset_restores_the_post_construction_state() {
    let constants = SimulationConstants::default();
    let parameters = AgentParameters::default();
    let mut agent = agent_with(&constants, &parameters, default_track());
    let mut vehicle = PointMass::new(VehicleParameters::default());
    let mut context = ScriptedContext::new(TrackSide::Right, Some((0.0, 10.0)));

    for _ in 0..10 {
        tick(&mut agent, &mut vehicle, &mut context, 50);
    }
    assert!(agent.action_plan().iter().any(|command| *command != 0.0));

    agent.reset();
    assert!(agent.action_plan().iter().all(|command| *command == 0.0));
    assert!(agent.position_plan().iter().all(|position| *position == 0.0));
    assert!(agent.belief_time_stamps().is_empty());
    assert_relative_eq!(agent.perceived_risk(), 0.0);
    assert_eq!(agent.did_plan_update_on_last_tick(), 0);
    assert!(agent.observed_communication().is_none());
}
