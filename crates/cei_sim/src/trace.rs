//! Per-tick recording of vehicle and agent quantities.

use std::path::Path;

use cei_track::TrackSide;
use serde::Serialize;

/// One recorded sample: one side of the track at one tick.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TraceRow {
    /// Simulation time, milliseconds.
    pub time_ms: u64,
    /// Which vehicle this row describes.
    pub side: TrackSide,
    /// Traveled distance along the vehicle's track, metres.
    pub traveled_distance: f64,
    /// Longitudinal velocity, m/s.
    pub velocity: f64,
    /// Commanded gross acceleration, m/s².
    pub acceleration: f64,
    /// Acceleration net of the resistances, m/s².
    pub net_acceleration: f64,
    /// The normalized input that produced the acceleration.
    pub raw_input: f64,
    /// The agent's perceived risk after this tick.
    pub perceived_risk: f64,
    /// `-1`/`0`/`+1` re-plan flag of this tick.
    pub did_plan_update: i8,
}

/// The full recording of a run.
#[derive(Debug, Default)]
pub struct Trace {
    rows: Vec<TraceRow>,
}

impl Trace {
    pub(crate) fn push(&mut self, row: TraceRow) {
        self.rows.push(row);
    }

    /// All recorded rows, interleaved by side, in time order.
    #[inline(always)]
    #[must_use]
    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }

    /// The rows of one side, in time order.
    pub fn rows_for(&self, side: TrackSide) -> impl Iterator<Item = &TraceRow> {
        self.rows.iter().filter(move |row| row.side == side)
    }

    /// The first time a side's traveled distance reached `distance`, in
    /// milliseconds.
    #[must_use]
    pub fn first_time_at(&self, side: TrackSide, distance: f64) -> Option<u64> {
        self.rows_for(side)
            .find(|row| row.traveled_distance >= distance)
            .map(|row| row.time_ms)
    }

    /// The inter-vehicle gap (right minus left traveled distance, minus
    /// one vehicle length) averaged over the twenty samples before the
    /// last one. `None` until enough samples exist.
    #[must_use]
    pub fn steady_state_gap(&self, vehicle_length: f64) -> Option<f64> {
        let left: Vec<f64> = self
            .rows_for(TrackSide::Left)
            .map(|row| row.traveled_distance)
            .collect();
        let right: Vec<f64> = self
            .rows_for(TrackSide::Right)
            .map(|row| row.traveled_distance)
            .collect();

        let samples = left.len().min(right.len());
        if samples < 21 {
            return None;
        }
        let window = &left[samples - 21..samples - 1];
        let gap_sum: f64 = window
            .iter()
            .zip(&right[samples - 21..samples - 1])
            .map(|(left, right)| right - left - vehicle_length)
            .sum();
        Some(gap_sum / 20.0)
    }

    /// Write all rows as CSV.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn row(time_ms: u64, side: TrackSide, traveled_distance: f64) -> TraceRow {
        TraceRow {
            time_ms,
            side,
            traveled_distance,
            velocity: 0.0,
            acceleration: 0.0,
            net_acceleration: 0.0,
            raw_input: 0.0,
            perceived_risk: 0.0,
            did_plan_update: 0,
        }
    }

    #[test]
    fn steady_state_gap_averages_the_window_before_the_last_sample() {
        let mut trace = Trace::default();
        for tick in 0..30_u64 {
            let distance = tick as f64;
            trace.push(row(tick * 50, TrackSide::Left, distance));
            // constant 7 m lead; 4.5 m of it is vehicle length
            trace.push(row(tick * 50, TrackSide::Right, distance + 7.0));
        }
        let gap = trace.steady_state_gap(4.5);
        assert_relative_eq!(gap.expect("enough samples"), 2.5);
    }

    #[test]
    fn steady_state_gap_needs_enough_samples() {
        let mut trace = Trace::default();
        for tick in 0..10_u64 {
            trace.push(row(tick * 50, TrackSide::Left, 0.0));
            trace.push(row(tick * 50, TrackSide::Right, 0.0));
        }
        assert!(trace.steady_state_gap(4.5).is_none());
    }

    #[test]
    fn first_time_at_finds_the_crossing_tick() {
        let mut trace = Trace::default();
        for tick in 0..10_u64 {
            trace.push(row(tick * 50, TrackSide::Left, tick as f64 * 2.0));
        }
        assert_eq!(trace.first_time_at(TrackSide::Left, 7.0), Some(200));
        assert_eq!(trace.first_time_at(TrackSide::Left, 100.0), None);
        assert_eq!(trace.first_time_at(TrackSide::Right, 0.0), None);
    }
}
