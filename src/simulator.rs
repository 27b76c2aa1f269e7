//! Equity and drawdown simulation
//!
//! Replays resolved outcomes as a sequence of short trades against a single
//! account. Position sizing is fixed-fractional of the *starting* capital:
//!
//! ```text
//! risk_amount = initial_capital * risk_percent / 100
//! size        = risk_amount / |stop_loss - entry|
//! ```
//!
//! The risk amount is never re-based on the running capital, so results do
//! not compound. Candidates are processed strictly in input order because the
//! capital and peak are cumulative.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{HitKind, ParameterError, Symbol, TradeCandidate, TradeOutcome};

/// Account settings for one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    /// Percentage of the initial capital risked per trade (2.0 = 2%)
    pub risk_percent: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_capital: 3_000.0,
            risk_percent: 2.0,
        }
    }
}

impl SimulationConfig {
    pub fn with_capital(mut self, capital: f64) -> Self {
        self.initial_capital = capital;
        self
    }

    pub fn with_risk_percent(mut self, risk: f64) -> Self {
        self.risk_percent = risk;
        self
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.initial_capital.is_finite() {
            return Err(ParameterError::NonFinite {
                name: "initial_capital",
                value: self.initial_capital,
            });
        }
        if self.initial_capital <= 0.0 {
            return Err(ParameterError::NonPositiveCapital(self.initial_capital));
        }
        if !self.risk_percent.is_finite() {
            return Err(ParameterError::NonFinite {
                name: "risk_percent",
                value: self.risk_percent,
            });
        }
        if self.risk_percent < 0.0 {
            return Err(ParameterError::NegativeRisk(self.risk_percent));
        }
        Ok(())
    }

    /// Currency amount risked on every trade
    pub fn risk_amount(&self) -> f64 {
        self.initial_capital * (self.risk_percent / 100.0)
    }
}

/// One simulated trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position of the candidate in the evaluated slice
    pub candidate_index: usize,
    pub date: Option<NaiveDate>,
    pub ticker: Symbol,
    pub hit_kind: HitKind,
    pub size: f64,
    pub pnl: f64,
    pub capital_after: f64,
    pub peak_after: f64,
    /// (capital - peak) / |peak| * 100, never positive
    pub drawdown_percent: f64,
    /// Held to a close that was missing; booked at zero P&L
    pub inconclusive: bool,
}

/// Cumulative account state for one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySimulationState {
    pub initial_capital: f64,
    pub capital: f64,
    /// Highest post-trade capital so far; `None` before the first trade
    pub peak_capital: Option<f64>,
    pub trade_log: Vec<LedgerEntry>,
    /// Activated candidates left out because their stop sits on the entry
    pub skipped: usize,
}

impl EquitySimulationState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            capital: initial_capital,
            peak_capital: None,
            trade_log: Vec::new(),
            skipped: 0,
        }
    }

    /// Book a realized P&L and return the resulting drawdown percentage
    fn apply(&mut self, pnl: f64) -> f64 {
        self.capital += pnl;
        let peak = match self.peak_capital {
            Some(peak) if peak >= self.capital => peak,
            _ => self.capital,
        };
        self.peak_capital = Some(peak);
        drawdown_percent(self.capital, peak)
    }

    pub fn final_capital(&self) -> f64 {
        self.capital
    }

    pub fn total_profit(&self) -> f64 {
        self.capital - self.initial_capital
    }

    pub fn total_return_percent(&self) -> f64 {
        self.total_profit() / self.initial_capital * 100.0
    }

    pub fn trade_count(&self) -> usize {
        self.trade_log.len()
    }

    /// Capital after each booked trade, in order
    pub fn equity_curve(&self) -> Vec<f64> {
        self.trade_log.iter().map(|e| e.capital_after).collect()
    }

    /// Drawdown percentage after each booked trade, in order
    pub fn drawdown_curve(&self) -> Vec<f64> {
        self.trade_log.iter().map(|e| e.drawdown_percent).collect()
    }

    /// Deepest drawdown (most negative percentage), 0 with no trades
    pub fn max_drawdown_percent(&self) -> f64 {
        self.trade_log
            .iter()
            .map(|e| e.drawdown_percent)
            .fold(0.0, f64::min)
    }

    pub fn winning_trades(&self) -> usize {
        self.trade_log.iter().filter(|e| e.pnl > 0.0).count()
    }

    pub fn losing_trades(&self) -> usize {
        self.trade_log.iter().filter(|e| e.pnl < 0.0).count()
    }

    pub fn inconclusive_trades(&self) -> usize {
        self.trade_log.iter().filter(|e| e.inconclusive).count()
    }

    /// Winners over all booked trades, in percent; NaN with no trades
    pub fn win_rate(&self) -> f64 {
        if self.trade_log.is_empty() {
            return f64::NAN;
        }
        self.winning_trades() as f64 / self.trade_log.len() as f64 * 100.0
    }

    /// Gross profit over gross loss; infinite with no losers, NaN with neither
    pub fn profit_factor(&self) -> f64 {
        let pnls = || self.trade_log.iter().map(|e| e.pnl);
        let gross_profit: f64 = pnls().filter(|p| *p > 0.0).sum();
        let gross_loss: f64 = pnls().filter(|p| *p < 0.0).map(f64::abs).sum();

        if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    }
}

fn drawdown_percent(capital: f64, peak: f64) -> f64 {
    if peak == 0.0 {
        return if capital == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    (capital - peak) / peak.abs() * 100.0
}

/// Short-side P&L of one resolved outcome at the given size.
///
/// Returns `None` for a hold whose close is unknown.
pub fn short_pnl(outcome: &TradeOutcome, size: f64) -> Option<f64> {
    let levels = outcome.levels?;
    let pnl = match outcome.hit_kind {
        HitKind::StopLoss => (levels.entry - levels.stop_loss) * size,
        HitKind::TakeProfit => (levels.entry - levels.take_profit) * size,
        HitKind::BreakEven => (levels.entry - levels.break_even) * size,
        HitKind::Hold => {
            if outcome.return_percent.is_nan() {
                return None;
            }
            (-outcome.return_percent / 100.0) * levels.entry * size
        }
    };
    Some(pnl)
}

/// Sequential equity simulator
#[derive(Debug, Clone)]
pub struct EquitySimulator {
    config: SimulationConfig,
}

impl EquitySimulator {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Position size for a stop distance; `None` when the distance is degenerate
    pub fn position_size(&self, stop_distance: f64) -> Option<f64> {
        if stop_distance == 0.0 || !stop_distance.is_finite() {
            return None;
        }
        Some(self.config.risk_amount() / stop_distance)
    }

    /// Replay `outcomes` (index-aligned with `candidates`) in order.
    ///
    /// Non-activated outcomes never entered a position and are ignored.
    pub fn run(
        &self,
        candidates: &[TradeCandidate],
        outcomes: &[TradeOutcome],
    ) -> EquitySimulationState {
        let mut state = EquitySimulationState::new(self.config.initial_capital);

        for (idx, (candidate, outcome)) in candidates.iter().zip(outcomes).enumerate() {
            if !outcome.activated {
                continue;
            }
            let Some(levels) = outcome.levels else {
                continue;
            };

            let Some(size) = self.position_size(levels.stop_distance()) else {
                debug!(
                    "{} {:?}: zero stop distance, trade skipped",
                    candidate.ticker, candidate.date
                );
                state.skipped += 1;
                continue;
            };

            let (pnl, inconclusive) = match short_pnl(outcome, size) {
                Some(pnl) => (pnl, false),
                None => {
                    warn!(
                        "{} {:?}: held position has no close price, booked at zero P&L",
                        candidate.ticker, candidate.date
                    );
                    (0.0, true)
                }
            };

            let drawdown = state.apply(pnl);
            let peak = state.peak_capital.unwrap_or(state.capital);

            state.trade_log.push(LedgerEntry {
                candidate_index: idx,
                date: candidate.date,
                ticker: candidate.ticker.clone(),
                hit_kind: outcome.hit_kind,
                size,
                pnl,
                capital_after: state.capital,
                peak_after: peak,
                drawdown_percent: drawdown,
                inconclusive,
            });
        }

        debug!(
            "Simulation finished: {} trades, {} skipped, final capital {:.2}",
            state.trade_log.len(),
            state.skipped,
            state.capital
        );

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TradeResolver;
    use crate::types::{StrategyParameters, Timeframe};
    use approx::assert_relative_eq;

    fn candidate(ticker: &str, high: f64, low: f64, close: f64) -> TradeCandidate {
        TradeCandidate::new(ticker, Some(10.0))
            .with_snapshot(Timeframe::Minutes(30), high, low)
            .with_close(close)
    }

    fn simulate(
        candidates: &[TradeCandidate],
        params: StrategyParameters,
    ) -> EquitySimulationState {
        let outcomes = TradeResolver::new(params).resolve_all(candidates);
        let config = SimulationConfig::default()
            .with_capital(10_000.0)
            .with_risk_percent(1.0);
        EquitySimulator::new(config).run(candidates, &outcomes)
    }

    #[test]
    fn test_position_sizing() {
        let sim = EquitySimulator::new(
            SimulationConfig::default()
                .with_capital(10_000.0)
                .with_risk_percent(2.0),
        );
        // Risk = 10,000 * 2% = 200, stop distance = 1.5
        assert_relative_eq!(sim.position_size(1.5).unwrap(), 133.33333333333334, epsilon = 1e-9);
        assert!(sim.position_size(0.0).is_none());
    }

    #[test]
    fn test_pnl_per_outcome() {
        let candidates = vec![
            candidate("SL", 13.5, 11.0, 12.0),  // stop loss
            candidate("TP", 11.6, 8.0, 9.0),    // take profit
            candidate("HOLD", 12.0, 10.0, 10.35), // hold, -10% return
        ];
        let state = simulate(&candidates, StrategyParameters::default());

        // risk = 100 per trade, size = 100 / 1.5
        let size = 100.0 / 1.5;
        assert_eq!(state.trade_count(), 3);
        assert_relative_eq!(state.trade_log[0].pnl, -100.0, epsilon = 1e-9);
        assert_relative_eq!(state.trade_log[1].pnl, 3.0 * size, epsilon = 1e-9);
        assert_relative_eq!(state.trade_log[2].pnl, 0.10 * 11.5 * size, epsilon = 1e-9);
    }

    #[test]
    fn test_break_even_pnl() {
        let params = StrategyParameters {
            break_even_percent: 10.0,
            ..StrategyParameters::default()
        };
        // Triggers at 11.5, never reaches the 13 stop or the 8.5 target,
        // low of 9.0 crosses the 9.35 break-even
        let candidates = vec![
            candidate("BE", 12.0, 9.0, 10.5),
            candidate("SL", 13.5, 11.0, 12.0),
        ];
        let state = simulate(&candidates, params);

        let size = 100.0 / 1.5;
        assert_eq!(state.trade_count(), 2);
        assert_eq!(state.trade_log[0].hit_kind, HitKind::BreakEven);
        assert_relative_eq!(state.trade_log[0].size, size, epsilon = 1e-9);
        assert_relative_eq!(state.trade_log[0].pnl, 2.15 * size, epsilon = 1e-9);

        let sum: f64 = state.trade_log.iter().map(|e| e.pnl).sum();
        assert_relative_eq!(state.final_capital(), 10_000.0 + sum, epsilon = 1e-9);
        assert!(state.trade_log[1].drawdown_percent < 0.0);
    }

    #[test]
    fn test_non_activated_excluded() {
        let candidates = vec![candidate("NOPE", 11.0, 9.0, 9.0), candidate("SL", 13.5, 11.0, 12.0)];
        let state = simulate(&candidates, StrategyParameters::default());
        assert_eq!(state.trade_count(), 1);
        assert_eq!(state.trade_log[0].candidate_index, 1);
    }

    #[test]
    fn test_zero_stop_distance_is_skipped() {
        let params = StrategyParameters {
            entry_percent: 30.0,
            ..StrategyParameters::default()
        };
        let candidates = vec![candidate("FLAT", 14.0, 9.0, 9.0)];
        let state = simulate(&candidates, params);
        assert!(state.trade_log.is_empty());
        assert_eq!(state.skipped, 1);
        assert_eq!(state.final_capital(), 10_000.0);
    }

    #[test]
    fn test_drawdown_tracking() {
        let candidates = vec![
            candidate("W1", 11.6, 8.0, 9.0),
            candidate("L1", 13.5, 11.0, 12.0),
            candidate("L2", 13.5, 11.0, 12.0),
            candidate("W2", 11.6, 8.0, 9.0),
            candidate("W3", 11.6, 8.0, 9.0),
        ];
        let state = simulate(&candidates, StrategyParameters::default());

        let mut running_peak = f64::NEG_INFINITY;
        for entry in &state.trade_log {
            running_peak = running_peak.max(entry.capital_after);
            assert_relative_eq!(entry.peak_after, running_peak, epsilon = 1e-9);
            assert!(entry.drawdown_percent <= 0.0);
            let expected = (entry.capital_after - running_peak) / running_peak * 100.0;
            assert_relative_eq!(entry.drawdown_percent, expected, epsilon = 1e-9);
        }
        assert_eq!(state.trade_log[0].drawdown_percent, 0.0);
        assert!(state.trade_log[2].drawdown_percent < state.trade_log[1].drawdown_percent);
        assert_eq!(state.trade_log[4].drawdown_percent, 0.0);
        assert_relative_eq!(state.max_drawdown_percent(), state.trade_log[2].drawdown_percent);

        let equity = state.equity_curve();
        let drawdowns = state.drawdown_curve();
        assert_eq!(equity.len(), 5);
        assert_eq!(drawdowns.len(), 5);
        assert_relative_eq!(equity[4], 10_200.0 + 200.0, epsilon = 1e-9);
        assert_eq!(drawdowns[4], 0.0);
    }

    #[test]
    fn test_first_trade_loss_sets_peak() {
        let candidates = vec![candidate("L1", 13.5, 11.0, 12.0)];
        let state = simulate(&candidates, StrategyParameters::default());
        assert_relative_eq!(state.peak_capital.unwrap(), 9_900.0, epsilon = 1e-9);
        assert_eq!(state.trade_log[0].drawdown_percent, 0.0);
    }

    #[test]
    fn test_conservation() {
        let candidates = vec![
            candidate("A", 11.6, 8.0, 9.0),
            candidate("B", 13.5, 11.0, 12.0),
            candidate("C", 12.0, 10.0, 11.0),
            candidate("D", 12.0, 10.0, 10.0),
        ];
        let state = simulate(&candidates, StrategyParameters::default());
        let sum: f64 = state.trade_log.iter().map(|e| e.pnl).sum();
        assert_relative_eq!(state.final_capital(), 10_000.0 + sum, epsilon = 1e-9);
        assert_relative_eq!(state.total_profit(), sum, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_close_is_inconclusive() {
        let candidates = vec![
            TradeCandidate::new("NC", Some(10.0)).with_snapshot(Timeframe::Minutes(30), 12.0, 10.0)
        ];
        let state = simulate(&candidates, StrategyParameters::default());
        assert_eq!(state.trade_count(), 1);
        assert!(state.trade_log[0].inconclusive);
        assert_eq!(state.trade_log[0].pnl, 0.0);
        assert_eq!(state.inconclusive_trades(), 1);
        assert!(state.final_capital().is_finite());
    }

    #[test]
    fn test_win_rate_and_profit_factor() {
        let candidates = vec![
            candidate("W", 11.6, 8.0, 9.0),
            candidate("L", 13.5, 11.0, 12.0),
        ];
        let state = simulate(&candidates, StrategyParameters::default());
        assert_relative_eq!(state.win_rate(), 50.0);
        // win = 200, loss = 100
        assert_relative_eq!(state.profit_factor(), 2.0, epsilon = 1e-9);

        let empty = EquitySimulationState::new(1_000.0);
        assert!(empty.win_rate().is_nan());
        assert!(empty.profit_factor().is_nan());
        assert_eq!(empty.max_drawdown_percent(), 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert_eq!(
            SimulationConfig::default().with_capital(0.0).validate(),
            Err(ParameterError::NonPositiveCapital(0.0))
        );
        assert_eq!(
            SimulationConfig::default().with_risk_percent(-1.0).validate(),
            Err(ParameterError::NegativeRisk(-1.0))
        );
    }
}
