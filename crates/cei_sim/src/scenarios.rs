//! The shipped scenario presets.
//!
//! The symmetric-merge scenarios share one set of constants (50 ms ticks,
//! 1.8 × 4.5 m vehicles, 25 m between the start points, 50 m sections,
//! 40 s limit) and one agent parameterization (4 s horizon at 4 Hz belief
//! frequency, preferred velocity 10 m/s, effort weight 1, 2 s saturation
//! time); they differ only in initial velocities and risk bounds.

use cei_config::{
    AgentParameters, RiskBounds, ScenarioConfig, SideConfig, SimulationConstants, TrackConfig,
    VehicleParameters,
};

fn merge_side(initial_velocity: f64, risk_bounds: RiskBounds) -> SideConfig {
    SideConfig {
        vehicle: VehicleParameters {
            initial_velocity,
            ..VehicleParameters::default()
        },
        agent: AgentParameters {
            risk_bounds,
            ..AgentParameters::default()
        },
    }
}

fn symmetric_merge(
    name: &str,
    left_velocity: f64,
    right_velocity: f64,
    left_bounds: RiskBounds,
    right_bounds: RiskBounds,
) -> ScenarioConfig {
    ScenarioConfig {
        name: name.to_string(),
        track: TrackConfig::SymmetricMerging,
        constants: SimulationConstants::default(),
        left: merge_side(left_velocity, left_bounds),
        right: Some(merge_side(right_velocity, right_bounds)),
    }
}

fn default_bounds() -> RiskBounds {
    RiskBounds::new(0.2, 0.5).expect("0.2 < 0.5")
}

/// Symmetric merge, both vehicles at 10 m/s with equal risk bounds.
#[must_use]
pub fn scenario_a() -> ScenarioConfig {
    symmetric_merge("scenario_a", 10.0, 10.0, default_bounds(), default_bounds())
}

/// As A, but the right vehicle starts at 9 m/s and is expected to yield.
#[must_use]
pub fn scenario_b() -> ScenarioConfig {
    symmetric_merge("scenario_b", 10.0, 9.0, default_bounds(), default_bounds())
}

/// As A, but with asymmetric risk bounds: the more risk-averse left agent
/// is expected to yield earlier.
#[must_use]
pub fn scenario_c() -> ScenarioConfig {
    symmetric_merge(
        "scenario_c",
        10.0,
        10.0,
        RiskBounds::new(0.2, 0.4).expect("0.2 < 0.4"),
        RiskBounds::new(0.3, 0.6).expect("0.3 < 0.6"),
    )
}

/// Leader/follower on a straight track: the follower starts at
/// `follower_velocity` behind a leader running 10 % slower, with one
/// follower-velocity-plus-vehicle-length of initial headway.
#[must_use]
pub fn straight_follower(follower_velocity: f64) -> ScenarioConfig {
    let constants = SimulationConstants {
        dt: 50,
        vehicle_width: 1.8,
        vehicle_length: 4.5,
        track_start_point_distance: 10.0,
        track_section_length: 200.0,
        max_time: 40_000,
    };
    let leader_velocity = follower_velocity * 0.9;

    let side = |initial_velocity: f64, initial_traveled_distance: f64| SideConfig {
        vehicle: VehicleParameters {
            initial_velocity,
            initial_traveled_distance,
            ..VehicleParameters::default()
        },
        agent: AgentParameters {
            preferred_velocity: initial_velocity,
            risk_bounds: default_bounds(),
            ..AgentParameters::default()
        },
    };

    ScenarioConfig {
        name: format!("velocity_{follower_velocity:.1}"),
        track: TrackConfig::Straight,
        constants,
        left: side(follower_velocity, 0.0),
        right: Some(side(
            leader_velocity,
            follower_velocity + constants.vehicle_length,
        )),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn presets_differ_only_where_documented() {
        let a = scenario_a();
        let b = scenario_b();
        assert_eq!(a.left, b.left);
        #[allow(clippy::unwrap_used)]
        let (a_right, b_right) = (a.right.unwrap(), b.right.unwrap());
        assert_eq!(a_right.vehicle.initial_velocity, 10.0);
        assert_eq!(b_right.vehicle.initial_velocity, 9.0);
        assert_eq!(a_right.agent, b_right.agent);
    }

    #[test]
    fn follower_starts_one_velocity_plus_length_behind() {
        let scenario = straight_follower(15.0);
        #[allow(clippy::unwrap_used)]
        let leader = scenario.right.unwrap();
        assert_eq!(leader.vehicle.initial_traveled_distance, 19.5);
        assert_eq!(leader.vehicle.initial_velocity, 13.5);
        assert_eq!(scenario.left.agent.preferred_velocity, 15.0);
    }
}
