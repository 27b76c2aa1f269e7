//! One full strategy evaluation over a candidate set
//!
//! `evaluate` is pure: it reads the candidates and parameters and returns
//! fresh outcomes, equity state and statistics. Nothing is cached between
//! calls.

use serde::Serialize;
use tracing::info;

use crate::resolver::TradeResolver;
use crate::simulator::{EquitySimulationState, EquitySimulator, SimulationConfig};
use crate::stats::{MeanMedian, Metric, OutcomeCounts, OutcomeReport};
use crate::{StrategyParameters, TradeCandidate, TradeOutcome};

/// Headline numbers of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub counts: OutcomeCounts,
    /// Activated trades booked by the simulator
    pub trade_count: usize,
    /// Activated trades dropped for a zero stop distance
    pub skipped: usize,
    /// Booked holds whose close was missing
    pub inconclusive: usize,
    /// Median of the per-candidate reward/risk ratios
    pub reward_risk: Metric,
    pub reward_risk_break_even: Metric,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_profit: f64,
    pub total_return_percent: f64,
    pub max_drawdown_percent: f64,
    /// NaN with no trades
    pub win_rate: f64,
    /// Infinite with no losers, NaN with no decided trades
    pub profit_factor: f64,
}

impl EvaluationSummary {
    /// Activated share of all candidates, in percent
    pub fn activation_rate(&self) -> Metric {
        if self.counts.total == 0 {
            return Metric::MISSING;
        }
        Metric::new(self.counts.activated as f64 / self.counts.total as f64 * 100.0)
    }
}

/// Everything produced by one run
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub parameters: StrategyParameters,
    pub simulation: SimulationConfig,
    /// Index-aligned with the evaluated candidates
    pub outcomes: Vec<TradeOutcome>,
    pub equity: EquitySimulationState,
    pub report: OutcomeReport,
    pub summary: EvaluationSummary,
}

/// Resolve, simulate and summarize one parameter set
pub fn evaluate(
    candidates: &[TradeCandidate],
    parameters: &StrategyParameters,
    simulation: &SimulationConfig,
) -> Evaluation {
    let outcomes = TradeResolver::new(*parameters).resolve_all(candidates);
    let equity = EquitySimulator::new(*simulation).run(candidates, &outcomes);
    let report = OutcomeReport::build(candidates, &outcomes);
    let summary = summarize(&outcomes, &equity, report.counts);

    info!(
        "Evaluated {} candidates: {} activated, {} trades, profit {:.2}",
        summary.counts.total, summary.counts.activated, summary.trade_count, summary.total_profit
    );

    Evaluation {
        parameters: *parameters,
        simulation: *simulation,
        outcomes,
        equity,
        report,
        summary,
    }
}

/// Summary only, for sweeps that discard the per-candidate detail
pub fn evaluate_summary(
    candidates: &[TradeCandidate],
    parameters: &StrategyParameters,
    simulation: &SimulationConfig,
) -> EvaluationSummary {
    let outcomes = TradeResolver::new(*parameters).resolve_all(candidates);
    let equity = EquitySimulator::new(*simulation).run(candidates, &outcomes);
    summarize(&outcomes, &equity, OutcomeCounts::from_outcomes(&outcomes))
}

fn summarize(
    outcomes: &[TradeOutcome],
    equity: &EquitySimulationState,
    counts: OutcomeCounts,
) -> EvaluationSummary {
    let reward_risk = MeanMedian::from_values(outcomes.iter().map(|o| o.reward_risk).collect());
    let reward_risk_be =
        MeanMedian::from_values(outcomes.iter().map(|o| o.reward_risk_break_even).collect());

    EvaluationSummary {
        counts,
        trade_count: equity.trade_count(),
        skipped: equity.skipped,
        inconclusive: equity.inconclusive_trades(),
        reward_risk: reward_risk.median,
        reward_risk_break_even: reward_risk_be.median,
        initial_capital: equity.initial_capital,
        final_capital: equity.final_capital(),
        total_profit: equity.total_profit(),
        total_return_percent: equity.total_return_percent(),
        max_drawdown_percent: equity.max_drawdown_percent(),
        win_rate: equity.win_rate(),
        profit_factor: equity.profit_factor(),
    }
}
