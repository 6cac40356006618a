//! Reading scenario files from disk.

use std::path::Path;

use crate::ScenarioConfig;

/// Errors raised while loading a scenario file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML, or fails a construction-time check of
    /// one of the configuration types.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Read a [`ScenarioConfig`] from a TOML file.
pub fn read_scenario<P: AsRef<Path>>(path: P) -> Result<ScenarioConfig, ParseError> {
    let contents = std::fs::read_to_string(path)?;
    let scenario = toml::from_str(&contents)?;
    Ok(scenario)
}
