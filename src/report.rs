//! Terminal report and CSV exports

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::evaluation::{Evaluation, EvaluationSummary};
use crate::simulator::{EquitySimulationState, LedgerEntry, SimulationConfig};
use crate::stats::{GroupStats, MeanMedian, Metric, OutcomeReport};
use crate::{StrategyParameters, TradeCandidate, TradeOutcome};

/// Format a ratio or percentage, `-` when undefined
fn num(value: f64) -> String {
    if value.is_nan() {
        "-".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{:.2}", value)
    }
}

pub fn print_parameters(parameters: &StrategyParameters, simulation: &SimulationConfig) {
    println!("\n{}", "=".repeat(60));
    println!("STRATEGY PARAMETERS");
    println!("{}", "=".repeat(60));
    println!("Entry:              +{:.2}% over open", parameters.entry_percent);
    println!("Stop Loss:          {:+.2}% from open", parameters.stop_loss_percent);
    println!("Take Profit:        {:+.2}% from open", parameters.take_profit_percent);
    println!("Break Even:         {:+.2}% from take profit", parameters.break_even_percent);
    println!("Activation Window:  up to {}", parameters.activation_cutoff);
    println!("Initial Capital:    {:.2}", simulation.initial_capital);
    println!(
        "Risk Per Trade:     {:.2}% ({:.2})",
        simulation.risk_percent,
        simulation.risk_amount()
    );
}

pub fn print_summary(summary: &EvaluationSummary) {
    let c = &summary.counts;
    println!("\n{}", "=".repeat(60));
    println!("EVALUATION RESULTS");
    println!("{}", "=".repeat(60));
    println!("Candidates:         {}", c.total);
    println!("Activated:          {} ({:.1}%)", c.activated, summary.activation_rate());
    println!("Stop Loss:          {}", c.stop_loss);
    println!("Take Profit:        {}", c.take_profit);
    println!("Break Even:         {}", c.break_even);
    println!("Hold Green:         {}", c.hold_green);
    println!("Hold Red:           {}", c.hold_red);
    if c.hold_unknown > 0 {
        println!("Hold (no close):    {}", c.hold_unknown);
    }
    println!("{}", "-".repeat(60));
    println!("Trades Booked:      {}", summary.trade_count);
    println!("Skipped (no stop):  {}", summary.skipped);
    println!("Inconclusive:       {}", summary.inconclusive);
    println!("Reward/Risk:        {:.2}", summary.reward_risk);
    println!("Reward/Risk (BE):   {:.2}", summary.reward_risk_break_even);
    println!("Final Capital:      {:.2}", summary.final_capital);
    println!("Total Profit:       {:.2}", summary.total_profit);
    println!("Total Return:       {:.2}%", summary.total_return_percent);
    println!("Max Drawdown:       {}%", num(summary.max_drawdown_percent));
    println!("Win Rate:           {}%", num(summary.win_rate));
    println!("Profit Factor:      {}", num(summary.profit_factor));
    println!("{}", "=".repeat(60));
}

fn print_row(label: &str, values: &MeanMedian) {
    println!(
        "  {:<26} {:>14.2} {:>14.2} {:>6}",
        label, values.mean, values.median, values.count
    );
}

/// Mean/median table for one group
pub fn print_group(title: &str, stats: &GroupStats) {
    println!("\n{} ({} rows)", title, stats.count);
    println!("  {:<26} {:>14} {:>14} {:>6}", "", "Mean", "Median", "N");
    print_row("Gap %", &stats.gap_percent);
    print_row("Float", &stats.float_shares);
    print_row("Shares Outstanding", &stats.shares_outstanding);
    print_row("Market Cap", &stats.market_cap);
    print_row("Push % (open to high)", &stats.push_percent);
    print_row("Open vs PM High %", &stats.open_vs_premarket_high);
    print_row("Open to Low %", &stats.open_to_low_percent);
    println!(
        "  {:<26} {:>14} {:>14} {:>6}",
        "Time of High",
        stats.time_of_high.mean(),
        stats.time_of_high.median(),
        stats.time_of_high.count
    );
    for (window, ratio) in &stats.volume_ratios {
        print_row(&format!("Volume {} / PM %", window), ratio);
    }
    if stats.return_percent.count > 0 {
        print_row("Return %", &stats.return_percent);
    }
    println!("  {:<26} {:>14.1}", "PM High Break %", stats.pm_break_percent);
    println!("  {:<26} {:>14.1}", "Red Close %", stats.red_close_percent);
}

pub fn print_outcome_report(report: &OutcomeReport) {
    println!("\n{}", "=".repeat(80));
    println!("AGGREGATE STATISTICS");
    println!("{}", "=".repeat(80));
    print_group("All Candidates", &report.all);
    print_group("Activated", &report.activated);
    print_group("Stop Loss", &report.stop_loss);
    print_group("Take Profit", &report.take_profit);
    print_group("Break Even", &report.break_even);
    print_group("Hold Green", &report.hold_green);
    print_group("Hold Red", &report.hold_red);
    print_group("Red Sessions (close < open)", &report.red_sessions);
    print_group("Green Sessions (close >= open)", &report.green_sessions);

    let hb = &report.hold_breakdown;
    println!("\n{}", "-".repeat(80));
    println!(
        "Held to close: {} green (avg {:.2}%), {} red (avg {:.2}%)",
        hb.green_count, hb.green_avg_return, hb.red_count, hb.red_avg_return
    );
    println!("{}", "=".repeat(80));
}

/// Capital and drawdown after every booked trade
pub fn print_equity_trace(equity: &EquitySimulationState) {
    println!("\n{}", "=".repeat(60));
    println!("EQUITY TRACE");
    println!("{}", "=".repeat(60));
    println!("{:>5} {:<12} {:<8} {:>12} {:>10}", "#", "Date", "Ticker", "Capital", "DD%");
    let rows = equity
        .trade_log
        .iter()
        .zip(equity.equity_curve())
        .zip(equity.drawdown_curve());
    for (i, ((entry, capital), drawdown)) in rows.enumerate() {
        println!(
            "{:>5} {:<12} {:<8} {:>12.2} {:>10}",
            i + 1,
            entry
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.ticker.as_str(),
            capital,
            num(drawdown)
        );
    }
    println!("{}", "=".repeat(60));
}

/// Full terminal report for one evaluation
pub fn print_evaluation(evaluation: &Evaluation) {
    print_parameters(&evaluation.parameters, &evaluation.simulation);
    print_summary(&evaluation.summary);
    print_outcome_report(&evaluation.report);
}

/// One exported row of the outcome table
#[derive(Debug, Serialize)]
struct OutcomeRow<'a> {
    date: Option<String>,
    ticker: &'a str,
    open: Option<f64>,
    close: Option<f64>,
    activated: bool,
    hit: String,
    hit_timeframe: Option<String>,
    entry: Option<f64>,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    break_even: Option<f64>,
    exit_price: Option<f64>,
    return_percent: Option<f64>,
    reward_risk: Option<f64>,
}

fn defined(value: f64) -> Option<f64> {
    Metric::new(value).value()
}

/// Write the per-candidate outcome table
pub fn export_outcomes_csv(
    path: impl AsRef<Path>,
    candidates: &[TradeCandidate],
    outcomes: &[TradeOutcome],
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .context(format!("Failed to create {}", path.display()))?;

    for (candidate, outcome) in candidates.iter().zip(outcomes) {
        let levels = outcome.levels;
        writer
            .serialize(OutcomeRow {
                date: candidate.date.map(|d| d.format("%Y-%m-%d").to_string()),
                ticker: candidate.ticker.as_str(),
                open: candidate.open_price,
                close: candidate.close_price,
                activated: outcome.activated,
                hit: outcome.hit_kind.to_string(),
                hit_timeframe: outcome.hit_timeframe.map(|tf| tf.label()),
                entry: levels.map(|l| l.entry),
                stop_loss: levels.map(|l| l.stop_loss),
                take_profit: levels.map(|l| l.take_profit),
                break_even: levels.map(|l| l.break_even),
                exit_price: defined(outcome.exit_price),
                return_percent: defined(outcome.return_percent),
                reward_risk: defined(outcome.reward_risk),
            })
            .context("Failed to write outcome row")?;
    }
    writer.flush().context("Failed to flush outcomes CSV")?;
    Ok(())
}

/// Write the simulated trade ledger
pub fn export_equity_csv(path: impl AsRef<Path>, ledger: &[LedgerEntry]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .context(format!("Failed to create {}", path.display()))?;
    for entry in ledger {
        writer.serialize(entry).context("Failed to write ledger row")?;
    }
    writer.flush().context("Failed to flush equity CSV")?;
    Ok(())
}

/// Write `outcomes.csv` and `equity.csv` into `dir`
pub fn export_evaluation(
    dir: impl AsRef<Path>,
    candidates: &[TradeCandidate],
    evaluation: &Evaluation,
) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).context(format!("Failed to create {}", dir.display()))?;

    let outcomes_path = dir.join("outcomes.csv");
    let equity_path = dir.join("equity.csv");
    export_outcomes_csv(&outcomes_path, candidates, &evaluation.outcomes)?;
    export_equity_csv(&equity_path, &evaluation.equity.trade_log)?;

    info!(
        "Exported {} outcomes and {} ledger entries to {}",
        evaluation.outcomes.len(),
        evaluation.equity.trade_log.len(),
        dir.display()
    );
    Ok((outcomes_path, equity_path))
}
