//! Optimize command implementation with progress tracking and grid overrides

use anyhow::{Context, Result};
use gapper_strategies::grid::{self, format_params};
use gapper_strategies::optimizer::{OptimizationResult, Optimizer, SortMetric};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::info;

use super::{load_candidates, load_config, FilterArgs};

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: Option<String>,
    data_path: Option<PathBuf>,
    grid_overrides: Vec<String>,
    filters: FilterArgs,
    sort_by: SortMetric,
    top: usize,
    min_trades: usize,
    sequential: bool,
) -> Result<()> {
    info!("Starting optimization");

    let mut config = load_config(config_path.as_deref())?;
    filters.apply(&mut config.filters)?;

    let rejected = grid::apply_overrides(&mut config, &grid_overrides);
    if !rejected.is_empty() {
        anyhow::bail!("Invalid grid overrides: {}", rejected.join(" "));
    }
    config.validate().context("Invalid grid")?;

    let points = grid::generate_grid(&config).context("Failed to expand parameter grid")?;
    info!("Parameter combinations: {}", grid::total_combinations(&config));

    let candidates = load_candidates(&config, data_path)?;

    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Candidates:    {}", candidates.len());
    println!("  Parameters:    {} combinations", points.len());
    println!("  Mode:          {}", if sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(70));

    let optimizer = Optimizer::new(&candidates);

    let pb = ProgressBar::new(points.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")
            .context("Invalid progress bar template")?
            .progress_chars("█░ "),
    );

    let results: Vec<OptimizationResult> = if sequential {
        points
            .iter()
            .map(|p| {
                let result = optimizer.run_point(p);
                pb.inc(1);
                result
            })
            .collect()
    } else {
        optimizer.optimize_with_progress(&points, &pb)
    };
    pb.finish();
    println!();

    let mut results: Vec<OptimizationResult> = results
        .into_iter()
        .filter(|r| r.summary.trade_count >= min_trades)
        .collect();

    if results.is_empty() {
        info!("No results with at least {} trades.", min_trades);
        println!("No results with at least {} trades.", min_trades);
        return Ok(());
    }

    Optimizer::sort_results(&mut results, sort_by);
    info!("Total results: {}, sorted by: {}", results.len(), sort_by);

    let display_count = top.min(results.len());
    println!("\n{}", "=".repeat(120));
    println!("TOP {} OPTIMIZATION RESULTS (sorted by {})", display_count, sort_by);
    println!("{}", "=".repeat(120));
    println!(
        "{:<4} {:>10} {:>9} {:>8} {:>8} {:>7} {:>6} {:>6} | Parameters",
        "Rank", "Profit", "Return%", "MaxDD%", "WinR%", "PF", "Trades", "RR"
    );
    println!("{}", "-".repeat(120));

    for (i, result) in results.iter().take(top).enumerate() {
        let s = &result.summary;
        println!(
            "{:<4} {:>10.2} {:>9.2} {:>8.2} {:>8.2} {:>7.2} {:>6} {:>6.2} | {}",
            i + 1,
            s.total_profit,
            s.total_return_percent,
            s.max_drawdown_percent,
            s.win_rate,
            s.profit_factor,
            s.trade_count,
            s.reward_risk,
            format_params(&result.values)
        );
    }
    println!("{}", "=".repeat(120));

    info!("Optimization completed successfully");

    Ok(())
}
