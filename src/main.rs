//! Gapper strategies - main entry point
//!
//! This binary provides three subcommands:
//! - evaluate: Run the strategy over a gapper table and report results
//! - stats: Descriptive statistics of the candidates only
//! - optimize: Run a parameter grid search

use anyhow::Result;
use clap::{Parser, Subcommand};
use gapper_strategies::optimizer::SortMetric;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::evaluate::Overrides;
use commands::FilterArgs;

#[derive(Parser, Debug)]
#[command(name = "gapper-strategies")]
#[command(
    about = "Small-cap gapper short strategy evaluation, statistics and optimization",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate the strategy over the candidate table
    Evaluate {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Input CSV (overrides config file)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Entry trigger, percent above the open
        #[arg(long, allow_hyphen_values = true)]
        entry: Option<f64>,

        /// Stop loss, percent from the open
        #[arg(long, allow_hyphen_values = true)]
        stop_loss: Option<f64>,

        /// Take profit, percent from the open (negative for a short)
        #[arg(long, allow_hyphen_values = true)]
        take_profit: Option<f64>,

        /// Break even, percent applied to the take profit price
        #[arg(long, allow_hyphen_values = true)]
        break_even: Option<f64>,

        /// Last bucket in which the entry may trigger. E.g., "90m", "day"
        #[arg(long)]
        cutoff: Option<String>,

        /// Initial capital
        #[arg(long)]
        capital: Option<f64>,

        /// Risk per trade, percent of initial capital
        #[arg(long)]
        risk: Option<f64>,

        #[command(flatten)]
        filters: FilterArgs,

        /// Write outcomes.csv and equity.csv
        #[arg(long)]
        export: bool,

        /// Export directory (overrides config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the monthly P&L matrix
        #[arg(long)]
        monthly: bool,

        /// Print capital and drawdown after every trade
        #[arg(long)]
        trace: bool,
    },

    /// Descriptive statistics of the candidates
    Stats {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Input CSV (overrides config file)
        #[arg(short, long)]
        data: Option<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Optimize strategy parameters over a grid
    Optimize {
        /// Path to base configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Input CSV (overrides config file)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Grid override, repeatable. E.g., "stop_loss_percent=20,30,40"
        /// or "take_profit_percent=-10:-30:-5"
        #[arg(short, long = "grid", allow_hyphen_values = true)]
        grid: Vec<String>,

        #[command(flatten)]
        filters: FilterArgs,

        /// Sort results by metric
        #[arg(long, value_enum, default_value_t = SortMetric::Profit)]
        sort_by: SortMetric,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Hide results with fewer trades
        #[arg(long, default_value = "1")]
        min_trades: usize,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level; RUST_LOG takes precedence
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // File appender
    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Optimizer: file only, keeps the console clean for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        // File layer - same format but without ANSI colors
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        // Initialize subscriber with both console and file
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Determine command name and whether to use file-only logging
    let (command_name, file_only) = match &cli.command {
        Commands::Evaluate { .. } => ("evaluate", false),
        Commands::Stats { .. } => ("stats", false),
        Commands::Optimize { .. } => ("optimize", true), // File-only for clean progress bar
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Evaluate {
            config,
            data,
            entry,
            stop_loss,
            take_profit,
            break_even,
            cutoff,
            capital,
            risk,
            filters,
            export,
            output,
            monthly,
            trace,
        } => commands::evaluate::run(
            config,
            data,
            Overrides {
                entry,
                stop_loss,
                take_profit,
                break_even,
                cutoff,
                capital,
                risk,
            },
            filters,
            export,
            output,
            monthly,
            trace,
        ),

        Commands::Stats {
            config,
            data,
            filters,
        } => commands::stats::run(config, data, filters),

        Commands::Optimize {
            config,
            data,
            grid,
            filters,
            sort_by,
            top,
            min_trades,
            sequential,
        } => commands::optimize::run(
            config, data, grid, filters, sort_by, top, min_trades, sequential,
        ),
    }
}
