//! Grid search parameter generation
//!
//! Expands the config `grid` section into every parameter combination
//! for optimization.

use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

use crate::config::{ConfigError, GRID_PARAMETERS};
use crate::simulator::SimulationConfig;
use crate::{Config, StrategyParameters};

/// One combination of swept values applied to the base config
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub parameters: StrategyParameters,
    pub simulation: SimulationConfig,
    /// Swept parameter name -> value, sorted by name
    pub values: BTreeMap<String, f64>,
}

fn set_parameter(point: &mut GridPoint, name: &str, value: f64) -> Result<(), ConfigError> {
    match name {
        "entry_percent" => point.parameters.entry_percent = value,
        "stop_loss_percent" => point.parameters.stop_loss_percent = value,
        "take_profit_percent" => point.parameters.take_profit_percent = value,
        "break_even_percent" => point.parameters.break_even_percent = value,
        "risk_percent" => point.simulation.risk_percent = value,
        other => return Err(ConfigError::UnknownGridParameter(other.to_string())),
    }
    point.values.insert(name.to_string(), value);
    Ok(())
}

/// Generate all combinations from the grid section.
///
/// Without a grid the base parameters form the single combination. Points
/// whose values fail validation are rejected with the validation error.
pub fn generate_grid(config: &Config) -> Result<Vec<GridPoint>, ConfigError> {
    let base = GridPoint {
        parameters: config.strategy,
        simulation: config.simulation,
        values: BTreeMap::new(),
    };

    let grid = match &config.grid {
        Some(g) if !g.is_empty() => g,
        _ => return Ok(vec![base]),
    };

    // Sorted keys for deterministic ordering
    let keys: Vec<&String> = grid.keys().sorted().collect();
    for key in &keys {
        if grid[*key].is_empty() {
            return Err(ConfigError::EmptyGrid((*key).clone()));
        }
    }

    keys.iter()
        .map(|k| grid[*k].iter().copied())
        .multi_cartesian_product()
        .map(|combo| -> Result<GridPoint, ConfigError> {
            let mut point = base.clone();
            for (key, value) in keys.iter().zip(combo) {
                set_parameter(&mut point, key, value)?;
            }
            point.parameters.validate()?;
            point.simulation.validate()?;
            Ok(point)
        })
        .collect()
}

/// Get total number of grid combinations
pub fn total_combinations(config: &Config) -> usize {
    match &config.grid {
        Some(grid) if !grid.is_empty() => grid.values().map(|v| v.len()).product(),
        _ => 1,
    }
}

/// Parse CLI override into grid format
/// Format: "param=val1,val2,val3" or "param=start:end:step"
pub fn parse_grid_override(s: &str) -> Option<(String, Vec<f64>)> {
    let (key, raw) = s.split_once('=')?;
    let key = key.trim().to_string();
    if !GRID_PARAMETERS.contains(&key.as_str()) {
        return None;
    }

    let values: Vec<f64> = if let Some((start, end, step)) = raw
        .split(':')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect::<Option<Vec<f64>>>()
        .and_then(|parts| parts.into_iter().collect_tuple())
    {
        range_values(start, end, step)?
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<f64>().ok().filter(|n| n.is_finite()))
            .collect::<Option<Vec<f64>>>()?
    };

    if values.is_empty() {
        None
    } else {
        Some((key, values))
    }
}

/// Inclusive range with a step whose sign must head towards `end`
fn range_values(start: f64, end: f64, step: f64) -> Option<Vec<f64>> {
    if step == 0.0 || !step.is_finite() || (end - start) * step < 0.0 {
        return None;
    }
    let count = ((end - start) / step + 1e-9).floor() as usize + 1;
    Some((0..count).map(|i| start + step * i as f64).collect())
}

/// Apply CLI overrides to config grid; returns the overrides that failed to parse
pub fn apply_overrides(config: &mut Config, overrides: &[String]) -> Vec<String> {
    let mut rejected = Vec::new();
    for override_str in overrides {
        match parse_grid_override(override_str) {
            Some((key, values)) => {
                config.grid.get_or_insert_with(HashMap::new).insert(key, values);
            }
            None => rejected.push(override_str.clone()),
        }
    }
    rejected
}

/// Format swept values for display
pub fn format_params(values: &BTreeMap<String, f64>) -> String {
    values
        .iter()
        .map(|(k, v)| {
            if v.fract() == 0.0 && v.abs() < 1000.0 {
                format!("{}={}", k, *v as i64)
            } else {
                format!("{}={:.2}", k, v)
            }
        })
        .join(", ")
}
