//! Offline simulation of two communication-enabled interaction agents.
//!
//! [`OfflineSimulation`] owns the track, the vehicles and their agents,
//! and ticks them with the ordering the agent core relies on: every agent
//! computes its input against one consistent snapshot of the world before
//! any vehicle's state is integrated. [`scenarios`] holds the shipped
//! scenario presets and [`Trace`] records per-tick quantities for
//! analysis and CSV export.

mod simulation;
mod trace;

pub mod scenarios;

pub use simulation::{BySide, EndState, OfflineSimulation, SimulationError};
pub use trace::{Trace, TraceRow};
