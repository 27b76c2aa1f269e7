//! Gapper Strategies
//!
//! Evaluates an intraday short strategy over small-cap gappers: resolves
//! each ticker-day into a stop-loss, take-profit, break-even or hold
//! outcome, replays the outcomes into an equity and drawdown trace, and
//! reports grouped descriptive statistics.

pub mod config;
pub mod data;
pub mod evaluation;
pub mod filter;
pub mod grid;
pub mod monthly_pnl;
pub mod optimizer;
pub mod report;
pub mod resolver;
pub mod simulator;
pub mod stats;
pub mod types;

pub use config::Config;
pub use evaluation::{evaluate, Evaluation, EvaluationSummary};
pub use types::*;
