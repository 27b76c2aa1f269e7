//! CLI command implementations

pub mod evaluate;
pub mod optimize;
pub mod stats;

use anyhow::{Context, Result};
use clap::Args;
use gapper_strategies::data::{self, parse_date};
use gapper_strategies::filter::FilterConfig;
use gapper_strategies::{Config, TradeCandidate};
use std::path::PathBuf;
use tracing::info;

/// Candidate filters shared by every command
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// First session date (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long)]
    pub start: Option<String>,

    /// Last session date (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long)]
    pub end: Option<String>,

    /// Minimum gap percentage
    #[arg(long)]
    pub min_gap: Option<f64>,

    /// Maximum gap percentage
    #[arg(long)]
    pub max_gap: Option<f64>,

    /// Minimum open price
    #[arg(long)]
    pub min_open: Option<f64>,

    /// Maximum float (shares)
    #[arg(long)]
    pub max_float: Option<f64>,

    /// Tickers to keep (comma-separated). E.g., "ABCD,EFGH"
    #[arg(long)]
    pub tickers: Option<String>,
}

impl FilterArgs {
    /// Overlay CLI filters on the config's filter section
    pub fn apply(&self, filters: &mut FilterConfig) -> Result<()> {
        if let Some(start) = &self.start {
            filters.start_date =
                Some(parse_date(start).context(format!("Invalid start date: {}", start))?);
        }
        if let Some(end) = &self.end {
            filters.end_date = Some(parse_date(end).context(format!("Invalid end date: {}", end))?);
        }
        if self.min_gap.is_some() {
            filters.min_gap_percent = self.min_gap;
        }
        if self.max_gap.is_some() {
            filters.max_gap_percent = self.max_gap;
        }
        if self.min_open.is_some() {
            filters.min_open = self.min_open;
        }
        if self.max_float.is_some() {
            filters.max_float = self.max_float;
        }
        if let Some(tickers) = &self.tickers {
            filters.tickers = tickers
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        Ok(())
    }
}

/// Load the config file, or defaults when none is given
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => {
            let config = Config::from_file(path)?;
            info!("Loaded configuration from: {}", path);
            Ok(config)
        }
        None => {
            info!("No configuration file given, using defaults");
            let config = Config::from_env();
            config.validate().context("Invalid configuration")?;
            Ok(config)
        }
    }
}

/// Load and filter candidates according to the config
pub fn load_candidates(
    config: &Config,
    data_override: Option<PathBuf>,
) -> Result<Vec<TradeCandidate>> {
    let mut data_config = config.data.clone();
    if let Some(path) = data_override {
        info!("Overriding data path to: {}", path.display());
        data_config.path = path;
    }

    info!("Loading data from: {}", data_config.path.display());
    let candidates = data::load_csv(&data_config)?;
    let candidates = config.filters.apply(candidates);

    if candidates.is_empty() {
        anyhow::bail!("No candidates left after filtering");
    }
    Ok(candidates)
}
