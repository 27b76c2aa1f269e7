//! Parameter optimization over a grid
//!
//! Every grid point is an independent evaluation over the same shared,
//! read-only candidate set, so points run in parallel with rayon.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::evaluation::{evaluate_summary, EvaluationSummary};
use crate::grid::GridPoint;
use crate::TradeCandidate;

/// Optimization result for a single parameter combination
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub values: BTreeMap<String, f64>,
    pub summary: EvaluationSummary,
}

/// Ranking metric for optimization results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortMetric {
    #[default]
    Profit,
    /// Shallowest maximum drawdown first
    Drawdown,
    WinRate,
    ProfitFactor,
    Return,
}

impl SortMetric {
    fn key(&self, result: &OptimizationResult) -> f64 {
        let s = &result.summary;
        match self {
            SortMetric::Profit => s.total_profit,
            SortMetric::Drawdown => s.max_drawdown_percent,
            SortMetric::WinRate => s.win_rate,
            SortMetric::ProfitFactor => s.profit_factor,
            SortMetric::Return => s.total_return_percent,
        }
    }
}

impl fmt::Display for SortMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortMetric::Profit => "profit",
            SortMetric::Drawdown => "drawdown",
            SortMetric::WinRate => "win_rate",
            SortMetric::ProfitFactor => "profit_factor",
            SortMetric::Return => "return",
        };
        write!(f, "{}", s)
    }
}

/// Runs grid points against one candidate set
pub struct Optimizer<'a> {
    candidates: &'a [TradeCandidate],
}

impl<'a> Optimizer<'a> {
    pub fn new(candidates: &'a [TradeCandidate]) -> Self {
        Optimizer { candidates }
    }

    /// Evaluate a single grid point
    pub fn run_point(&self, point: &GridPoint) -> OptimizationResult {
        OptimizationResult {
            values: point.values.clone(),
            summary: evaluate_summary(self.candidates, &point.parameters, &point.simulation),
        }
    }

    /// Run all points in parallel
    pub fn optimize(&self, points: &[GridPoint]) -> Vec<OptimizationResult> {
        tracing::info!("Testing {} parameter combinations", points.len());
        points.par_iter().map(|p| self.run_point(p)).collect()
    }

    /// Run optimization with progress tracking
    pub fn optimize_with_progress(
        &self,
        points: &[GridPoint],
        progress_bar: &ProgressBar,
    ) -> Vec<OptimizationResult> {
        tracing::info!(
            "Testing {} parameter combinations with progress",
            points.len()
        );
        points
            .par_iter()
            .map(|p| {
                let result = self.run_point(p);
                progress_bar.inc(1);
                result
            })
            .collect()
    }

    /// Run optimization sequentially (for debugging)
    pub fn optimize_sequential(&self, points: &[GridPoint]) -> Vec<OptimizationResult> {
        tracing::info!(
            "Testing {} parameter combinations sequentially",
            points.len()
        );
        points.iter().map(|p| self.run_point(p)).collect()
    }

    /// Sort best first; undefined metrics sort last
    pub fn sort_results(results: &mut [OptimizationResult], sort_by: SortMetric) {
        results.sort_by(|a, b| {
            let (va, vb) = (sort_by.key(a), sort_by.key(b));
            match (va.is_nan(), vb.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => vb.partial_cmp(&va).unwrap_or(Ordering::Equal),
            }
        });
    }
}
