//! Command-line scenario runner.

use std::path::PathBuf;

use anyhow::Context;
use cei_sim::{scenarios, OfflineSimulation};
use cei_track::TrackSide;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(version, about = "Offline runner for communication-enabled interaction scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write the per-tick trace to this CSV file
    #[arg(long, value_name = "FILE", global = true)]
    csv: Option<PathBuf>,

    /// Increase logging verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Symmetric merge, both vehicles at 10 m/s
    ScenarioA,
    /// Symmetric merge, the right vehicle starting at 9 m/s
    ScenarioB,
    /// Symmetric merge with asymmetric risk bounds
    ScenarioC,
    /// Leader/follower on a straight track
    Straight {
        /// Follower velocity; the leader runs 10 % slower
        #[arg(long, default_value_t = 15.0)]
        velocity: f64,
    },
    /// Sweep the follower velocity from 10 to 30 m/s and report the
    /// steady-state gaps
    Sweep,
    /// Run a scenario file
    Run {
        /// Path to a TOML scenario
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::ScenarioA => run_one(scenarios::scenario_a(), cli.csv.as_deref()),
        Command::ScenarioB => run_one(scenarios::scenario_b(), cli.csv.as_deref()),
        Command::ScenarioC => run_one(scenarios::scenario_c(), cli.csv.as_deref()),
        Command::Straight { velocity } => {
            run_one(scenarios::straight_follower(velocity), cli.csv.as_deref())
        }
        Command::Sweep => sweep(),
        Command::Run { path } => {
            let scenario = cei_config::read_scenario(&path)
                .with_context(|| format!("reading scenario {}", path.display()))?;
            run_one(scenario, cli.csv.as_deref())
        }
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run_one(scenario: cei_config::ScenarioConfig, csv: Option<&std::path::Path>) -> anyhow::Result<()> {
    let name = scenario.name.clone();
    let mut simulation = OfflineSimulation::from_scenario(&scenario)
        .with_context(|| format!("building scenario {name}"))?;
    let end_state = simulation
        .run()
        .with_context(|| format!("running scenario {name}"))?;

    println!("simulation ended with exit status: {end_state}");
    for side in TrackSide::BOTH {
        if let Some(vehicle) = simulation.vehicle(side) {
            println!(
                "  {side}: traveled {:.1} m, final velocity {:.2} m/s",
                vehicle.traveled_distance(),
                vehicle.velocity()
            );
        }
    }

    if let Some(path) = csv {
        simulation
            .trace()
            .write_csv(path)
            .with_context(|| format!("writing trace to {}", path.display()))?;
        println!("trace written to {}", path.display());
    }
    Ok(())
}

fn sweep() -> anyhow::Result<()> {
    println!("follower-velocity,steady-state-gap,end-state");
    for velocity in 10..=30_u32 {
        let scenario = scenarios::straight_follower(f64::from(velocity));
        let mut simulation = OfflineSimulation::from_scenario(&scenario)?;
        let end_state = simulation.run()?;
        let gap = simulation
            .trace()
            .steady_state_gap(simulation.constants().vehicle_length);
        match gap {
            Some(gap) => println!("{velocity},{gap:.3},{end_state}"),
            None => println!("{velocity},,{end_state}"),
        }
    }
    Ok(())
}
