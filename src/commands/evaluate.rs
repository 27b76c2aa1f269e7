//! Evaluate command implementation

use anyhow::{Context, Result};
use gapper_strategies::monthly_pnl::MonthlyPnLMatrix;
use gapper_strategies::{evaluate, report, Timeframe};
use std::path::PathBuf;
use tracing::{debug, info};

use super::{load_candidates, load_config, FilterArgs};

/// Per-run overrides of the strategy and simulation sections
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub entry: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub break_even: Option<f64>,
    pub cutoff: Option<String>,
    pub capital: Option<f64>,
    pub risk: Option<f64>,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: Option<String>,
    data_path: Option<PathBuf>,
    overrides: Overrides,
    filters: FilterArgs,
    export: bool,
    output: Option<PathBuf>,
    monthly: bool,
    trace: bool,
) -> Result<()> {
    info!("Starting evaluation");

    let mut config = load_config(config_path.as_deref())?;

    if let Some(entry) = overrides.entry {
        info!("Overriding entry to: {}%", entry);
        config.strategy.entry_percent = entry;
    }
    if let Some(sl) = overrides.stop_loss {
        info!("Overriding stop loss to: {}%", sl);
        config.strategy.stop_loss_percent = sl;
    }
    if let Some(tp) = overrides.take_profit {
        info!("Overriding take profit to: {}%", tp);
        config.strategy.take_profit_percent = tp;
    }
    if let Some(be) = overrides.break_even {
        info!("Overriding break even to: {}%", be);
        config.strategy.break_even_percent = be;
    }
    if let Some(cutoff) = &overrides.cutoff {
        let tf: Timeframe = cutoff.parse()?;
        info!("Overriding activation cutoff to: {}", tf);
        config.strategy.activation_cutoff = tf;
    }
    if let Some(capital) = overrides.capital {
        info!("Overriding initial capital to: {:.2}", capital);
        config.simulation.initial_capital = capital;
    }
    if let Some(risk) = overrides.risk {
        info!("Overriding risk per trade to: {}%", risk);
        config.simulation.risk_percent = risk;
    }
    filters.apply(&mut config.filters)?;
    config.validate().context("Invalid parameters")?;
    debug!("Strategy parameters: {:?}", config.strategy);

    let candidates = load_candidates(&config, data_path)?;

    info!("Running evaluation...");
    let evaluation = evaluate(&candidates, &config.strategy, &config.simulation);

    report::print_evaluation(&evaluation);

    if trace {
        report::print_equity_trace(&evaluation.equity);
    }

    if monthly {
        let matrix = MonthlyPnLMatrix::from_ledger(&evaluation.equity.trade_log);
        println!("{}", matrix.render(true));
    }

    if export || config.output.export_csv {
        let dir = output.unwrap_or_else(|| config.output.results_dir.clone());
        let (outcomes_path, equity_path) =
            report::export_evaluation(&dir, &candidates, &evaluation)?;
        println!("Outcomes written to: {}", outcomes_path.display());
        println!("Equity written to:   {}", equity_path.display());
    }

    info!("Evaluation completed successfully");

    Ok(())
}
