//! Stats command implementation
//!
//! Descriptive statistics of the filtered candidates, without running the
//! strategy.

use anyhow::Result;
use gapper_strategies::report;
use gapper_strategies::stats::GroupStats;
use gapper_strategies::SessionColor;
use std::path::PathBuf;
use tracing::info;

use super::{load_candidates, load_config, FilterArgs};

pub fn run(
    config_path: Option<String>,
    data_path: Option<PathBuf>,
    filters: FilterArgs,
) -> Result<()> {
    info!("Starting statistics");

    let mut config = load_config(config_path.as_deref())?;
    filters.apply(&mut config.filters)?;

    let candidates = load_candidates(&config, data_path)?;

    let dates: Vec<_> = candidates.iter().filter_map(|c| c.date).collect();
    println!("\n{}", "=".repeat(80));
    println!("CANDIDATE STATISTICS");
    println!("{}", "=".repeat(80));
    match (dates.iter().min(), dates.iter().max()) {
        (Some(first), Some(last)) => println!(
            "Sessions from {} to {}",
            first.format("%d-%m-%Y"),
            last.format("%d-%m-%Y")
        ),
        _ => println!("Sessions: no valid dates"),
    }

    report::print_group("All Candidates", &GroupStats::from_candidates(&candidates));
    report::print_group(
        "Red Sessions (close < open)",
        &GroupStats::from_candidates(
            candidates
                .iter()
                .filter(|c| c.session_color() == Some(SessionColor::Red)),
        ),
    );
    report::print_group(
        "Green Sessions (close >= open)",
        &GroupStats::from_candidates(
            candidates
                .iter()
                .filter(|c| c.session_color() == Some(SessionColor::Green)),
        ),
    );
    println!("{}", "=".repeat(80));

    info!("Statistics completed successfully");

    Ok(())
}
