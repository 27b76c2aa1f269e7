//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for file locations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::data::DataConfig;
use crate::filter::FilterConfig;
use crate::simulator::SimulationConfig;
use crate::types::{ParameterError, StrategyParameters};

/// Parameters a grid may sweep
pub const GRID_PARAMETERS: &[&str] = &[
    "entry_percent",
    "stop_loss_percent",
    "take_profit_percent",
    "break_even_percent",
    "risk_percent",
];

/// Semantic configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(
        "unknown grid parameter {0:?} (expected one of {list})",
        list = GRID_PARAMETERS.join(", ")
    )]
    UnknownGridParameter(String),

    #[error("grid parameter {0:?} has no values")]
    EmptyGrid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub filters: FilterConfig,
    pub strategy: StrategyParameters,
    pub simulation: SimulationConfig,
    pub output: OutputConfig,
    /// Grid search parameters for optimization (optional)
    /// Each key is a parameter name, value is array of values to test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<HashMap<String, Vec<f64>>>,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("GAPPER_DATA_PATH") {
            self.data.path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("GAPPER_RESULTS_DIR") {
            self.output.results_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        self.simulation.validate()?;
        if let Some(grid) = &self.grid {
            for (name, values) in grid {
                if !GRID_PARAMETERS.contains(&name.as_str()) {
                    return Err(ConfigError::UnknownGridParameter(name.clone()));
                }
                if values.is_empty() {
                    return Err(ConfigError::EmptyGrid(name.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Where reports and exports are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub results_dir: PathBuf,
    /// Write outcomes.csv and equity.csv after an evaluation
    pub export_csv: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            results_dir: PathBuf::from("results"),
            export_csv: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timeframe;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{
            "data": { "path": "sheets/gappers.csv", "delimiter": ";" },
            "strategy": { "entry_percent": 20.0, "activation_cutoff": "60m" },
            "grid": { "stop_loss_percent": [20.0, 30.0] }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.data.path, PathBuf::from("sheets/gappers.csv"));
        assert_eq!(config.data.delimiter, ';');
        assert!(config.data.reconstruct_60m);
        assert_eq!(config.strategy.entry_percent, 20.0);
        assert_eq!(config.strategy.stop_loss_percent, 30.0);
        assert_eq!(config.strategy.activation_cutoff, Timeframe::Minutes(60));
        assert_eq!(config.simulation, SimulationConfig::default());
        assert!(config.filters.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_grid_parameter_rejected() {
        let mut config = Config::default();
        config.grid = Some(HashMap::from([("leverage".to_string(), vec![1.0])]));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownGridParameter(name)) if name == "leverage"
        ));

        config.grid = Some(HashMap::from([("risk_percent".to_string(), vec![])]));
        assert!(matches!(config.validate(), Err(ConfigError::EmptyGrid(_))));
    }

    #[test]
    fn test_invalid_simulation_rejected() {
        let config = Config {
            simulation: SimulationConfig::default().with_capital(0.0),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Parameter(ParameterError::NonPositiveCapital(_)))
        ));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("gapper-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let config = Config::default();
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.strategy, config.strategy);
        assert_eq!(loaded.simulation, config.simulation);
        fs::remove_dir_all(&dir).ok();
    }
}
