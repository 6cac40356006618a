//! End-to-end runs of the shipped scenarios.
//!
//! These drive the full stack: track geometry, vehicles, belief updates,
//! risk evaluation and plan optimization, through the offline simulation
//! loop.

use cei_sim::{scenarios, EndState, OfflineSimulation};
use cei_track::TrackSide;

#[allow(clippy::unwrap_used)]
fn run(scenario: cei_config::ScenarioConfig) -> OfflineSimulation {
    let mut simulation = OfflineSimulation::from_scenario(&scenario).unwrap();
    simulation.run().unwrap();
    simulation
}

/// Time at which a side first passes the merge point, if it did.
fn merge_crossing_ms(simulation: &OfflineSimulation, side: TrackSide) -> Option<u64> {
    let merge_distance = simulation.constants().track_section_length;
    simulation.trace().first_time_at(side, merge_distance)
}

#[test]
fn scenario_a_stays_collision_free() {
    // the fully symmetric conflict: the essential guarantee is that the
    // risk constraint keeps the vehicles apart for the whole run
    let simulation = run(scenarios::scenario_a());
    let end_state = simulation.end_state();
    assert!(
        end_state == EndState::Finished || end_state == EndState::TimeRanOut,
        "unexpected end state: {end_state}"
    );
    assert!(simulation.trace().rows().iter().all(|row| row.perceived_risk.is_finite()));
}

#[test]
fn scenario_b_slower_vehicle_yields() {
    let simulation = run(scenarios::scenario_b());
    assert_eq!(simulation.end_state(), EndState::Finished);

    // the right vehicle started slower and must end up as the follower
    let left_crossing = merge_crossing_ms(&simulation, TrackSide::Left);
    let right_crossing =
        merge_crossing_ms(&simulation, TrackSide::Right).unwrap_or(u64::MAX);
    let left_crossing = left_crossing.expect("the faster left vehicle passes the merge point");
    assert!(
        left_crossing < right_crossing,
        "left crossed at {left_crossing} ms, right at {right_crossing} ms"
    );
}

#[test]
fn scenario_c_risk_averse_agent_yields() {
    let simulation = run(scenarios::scenario_c());
    assert_eq!(simulation.end_state(), EndState::Finished);

    // the left agent re-plans at a lower risk level and yields, so the
    // right vehicle passes the merge point first
    let left_crossing = merge_crossing_ms(&simulation, TrackSide::Left).unwrap_or(u64::MAX);
    let right_crossing = merge_crossing_ms(&simulation, TrackSide::Right);
    let right_crossing = right_crossing.expect("the bolder right vehicle passes the merge point");
    assert!(
        right_crossing < left_crossing,
        "right crossed at {right_crossing} ms, left at {left_crossing} ms"
    );
}

#[test]
fn straight_follower_keeps_a_positive_gap() {
    let simulation = run(scenarios::straight_follower(15.0));
    let end_state = simulation.end_state();
    assert!(
        end_state == EndState::Finished || end_state == EndState::TimeRanOut,
        "unexpected end state: {end_state}"
    );

    let gap = simulation
        .trace()
        .steady_state_gap(simulation.constants().vehicle_length)
        .expect("a 40 s run has enough samples");
    assert!(gap > 0.0, "steady-state gap should be positive, got {gap:.3} m");
}

#[test]
fn steady_state_gap_grows_with_velocity() {
    let mut previous_gap = f64::NEG_INFINITY;
    for velocity in [10.0, 20.0, 30.0] {
        let simulation = run(scenarios::straight_follower(velocity));
        let gap = simulation
            .trace()
            .steady_state_gap(simulation.constants().vehicle_length)
            .expect("a 40 s run has enough samples");
        assert!(gap > 0.0, "gap at {velocity} m/s should be positive, got {gap:.3} m");
        assert!(
            gap >= previous_gap,
            "gap at {velocity} m/s ({gap:.3} m) should not shrink below {previous_gap:.3} m"
        );
        previous_gap = gap;
    }
}
