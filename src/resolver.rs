//! Trade outcome resolution
//!
//! Walks a candidate's intraday snapshots in time order and decides how a
//! hypothetical short opened at the entry trigger would have been closed:
//!
//! 1. Activation: some bucket up to the activation cutoff traded at or above
//!    the entry price.
//! 2. Breach: the first bucket whose high reaches the stop-loss or whose low
//!    reaches the take-profit. Within one bucket the stop-loss wins, since the
//!    adverse move is assumed to print first.
//! 3. Break-even: no breach, but some low reached the break-even price.
//! 4. Hold: the position is marked at the close.

use tracing::debug;

use crate::types::{
    finite, HitKind, PriceLevels, Snapshot, StrategyParameters, Timeframe, TradeCandidate,
    TradeOutcome,
};

/// First snapshot that closed the position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breach {
    pub kind: HitKind,
    pub timeframe: Timeframe,
    pub price: f64,
}

/// True when any bucket up to `cutoff` (inclusive) reached the entry price
pub fn is_activated<'a, I>(snapshots: I, entry_price: f64, cutoff: Timeframe) -> bool
where
    I: IntoIterator<Item = &'a Snapshot>,
{
    snapshots
        .into_iter()
        .take_while(|s| s.timeframe <= cutoff)
        .any(|s| matches!(s.high, Some(high) if high >= entry_price))
}

/// Scan snapshots in order and stop at the first stop-loss or take-profit hit.
///
/// Snapshots after the breaching one are never pulled from the iterator.
pub fn find_breach<'a, I>(snapshots: I, levels: &PriceLevels) -> Option<Breach>
where
    I: IntoIterator<Item = &'a Snapshot>,
{
    for snapshot in snapshots {
        if matches!(snapshot.high, Some(high) if high >= levels.stop_loss) {
            return Some(Breach {
                kind: HitKind::StopLoss,
                timeframe: snapshot.timeframe,
                price: levels.stop_loss,
            });
        }
        if matches!(snapshot.low, Some(low) if low <= levels.take_profit) {
            return Some(Breach {
                kind: HitKind::TakeProfit,
                timeframe: snapshot.timeframe,
                price: levels.take_profit,
            });
        }
    }
    None
}

/// First bucket whose low reached the break-even price
pub fn find_break_even<'a, I>(snapshots: I, levels: &PriceLevels) -> Option<Breach>
where
    I: IntoIterator<Item = &'a Snapshot>,
{
    snapshots
        .into_iter()
        .find(|s| matches!(s.low, Some(low) if low <= levels.break_even))
        .map(|s| Breach {
            kind: HitKind::BreakEven,
            timeframe: s.timeframe,
            price: levels.break_even,
        })
}

/// Percentage move from entry to exit; NaN when either side is unusable
pub fn return_percent(entry_price: f64, exit_price: f64) -> f64 {
    if entry_price == 0.0 || !entry_price.is_finite() || !exit_price.is_finite() {
        return f64::NAN;
    }
    (exit_price - entry_price) / entry_price * 100.0
}

/// Resolves candidates against one fixed parameter set
#[derive(Debug, Clone)]
pub struct TradeResolver {
    params: StrategyParameters,
}

impl TradeResolver {
    pub fn new(params: StrategyParameters) -> Self {
        Self { params }
    }

    /// Resolve one candidate
    pub fn resolve(&self, candidate: &TradeCandidate) -> TradeOutcome {
        let close = finite(candidate.close_price).unwrap_or(f64::NAN);

        let levels = match self.params.levels(candidate.open_price) {
            Some(levels) => levels,
            None => {
                debug!(
                    "{} {:?}: open price unusable ({:?}), skipping activation",
                    candidate.ticker, candidate.date, candidate.open_price
                );
                return TradeOutcome {
                    activated: false,
                    hit_kind: HitKind::Hold,
                    exit_price: close,
                    return_percent: f64::NAN,
                    hit_timeframe: None,
                    levels: None,
                    reward_risk: f64::NAN,
                    reward_risk_break_even: f64::NAN,
                };
            }
        };

        let snapshots = candidate.snapshots();
        let activated = is_activated(snapshots, levels.entry, self.params.activation_cutoff);

        let hit = if activated {
            find_breach(snapshots, &levels).or_else(|| find_break_even(snapshots, &levels))
        } else {
            None
        };

        let (hit_kind, exit_price, hit_timeframe) = match hit {
            Some(breach) => (breach.kind, breach.price, Some(breach.timeframe)),
            None => (HitKind::Hold, close, None),
        };

        if let Some(tf) = hit_timeframe {
            debug!("{} {:?}: {} at {}", candidate.ticker, candidate.date, hit_kind, tf);
        }

        TradeOutcome {
            activated,
            hit_kind,
            exit_price,
            return_percent: return_percent(levels.entry, exit_price),
            hit_timeframe,
            levels: Some(levels),
            reward_risk: levels.reward_risk(),
            reward_risk_break_even: levels.reward_risk_break_even(),
        }
    }

    /// Resolve every candidate; the result is index-aligned with the input
    pub fn resolve_all(&self, candidates: &[TradeCandidate]) -> Vec<TradeOutcome> {
        candidates.iter().map(|c| self.resolve(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::Cell;

    fn scenario_candidate() -> TradeCandidate {
        TradeCandidate::new("GAPR", Some(10.0))
            .with_snapshot(Timeframe::Minutes(30), 11.0, 10.5)
            .with_snapshot(Timeframe::Minutes(60), 12.0, 9.0)
            .with_snapshot(Timeframe::Minutes(90), 13.5, 8.0)
            .with_close(9.5)
    }

    #[test]
    fn test_stop_loss_scenario() {
        let resolver = TradeResolver::new(StrategyParameters::default());
        let outcome = resolver.resolve(&scenario_candidate());

        assert!(outcome.activated);
        assert_eq!(outcome.hit_kind, HitKind::StopLoss);
        assert_eq!(outcome.hit_timeframe, Some(Timeframe::Minutes(90)));
        assert_relative_eq!(outcome.exit_price, 13.0, epsilon = 1e-12);
        // (13 - 11.5) / 11.5 * 100
        assert_relative_eq!(outcome.return_percent, 13.043478260869565, epsilon = 1e-9);
    }

    #[test]
    fn test_activation_confirmed_later_bucket() {
        let c = scenario_candidate();
        let entry = 11.5;
        assert!(!is_activated(&c.snapshots()[..1], entry, Timeframe::Minutes(90)));
        assert!(is_activated(c.snapshots(), entry, Timeframe::Minutes(90)));
        // cutoff before the 60m bucket never sees the 12.0 high
        assert!(!is_activated(c.snapshots(), entry, Timeframe::Minutes(30)));
    }

    #[test]
    fn test_stop_loss_wins_within_same_bucket() {
        let c = TradeCandidate::new("BOTH", Some(10.0))
            .with_snapshot(Timeframe::Minutes(5), 13.5, 8.0)
            .with_close(9.0);
        let outcome = TradeResolver::new(StrategyParameters::default()).resolve(&c);
        assert_eq!(outcome.hit_kind, HitKind::StopLoss);
    }

    #[test]
    fn test_take_profit_before_later_stop() {
        let c = TradeCandidate::new("FADE", Some(10.0))
            .with_snapshot(Timeframe::Minutes(30), 11.6, 8.4)
            .with_snapshot(Timeframe::Minutes(90), 14.0, 8.0)
            .with_close(12.0);
        let outcome = TradeResolver::new(StrategyParameters::default()).resolve(&c);
        assert_eq!(outcome.hit_kind, HitKind::TakeProfit);
        assert_eq!(outcome.hit_timeframe, Some(Timeframe::Minutes(30)));
        assert_relative_eq!(outcome.exit_price, 8.5, epsilon = 1e-12);
    }

    #[test]
    fn test_breach_scan_stops_at_first_hit() {
        let c = TradeCandidate::new("SPY", Some(10.0))
            .with_snapshot(Timeframe::Minutes(1), 11.0, 10.0)
            .with_snapshot(Timeframe::Minutes(5), 13.0, 10.0)
            .with_snapshot(Timeframe::Minutes(30), 14.0, 7.0)
            .with_snapshot(Timeframe::Day, 15.0, 6.0);
        let levels = StrategyParameters::default().levels(Some(10.0)).unwrap();

        let visited = Cell::new(0usize);
        let counted = c.snapshots().iter().inspect(|_| visited.set(visited.get() + 1));
        let breach = find_breach(counted, &levels);

        assert_eq!(breach.map(|b| b.kind), Some(HitKind::StopLoss));
        assert_eq!(visited.get(), 2);
    }

    #[test]
    fn test_breach_search_extends_past_activation_window() {
        let c = TradeCandidate::new("LATE", Some(10.0))
            .with_snapshot(Timeframe::Minutes(60), 11.6, 10.0)
            .with_snapshot(Timeframe::Minutes(210), 12.0, 8.2)
            .with_close(9.0);
        let outcome = TradeResolver::new(StrategyParameters::default()).resolve(&c);
        assert_eq!(outcome.hit_kind, HitKind::TakeProfit);
        assert_eq!(outcome.hit_timeframe, Some(Timeframe::Minutes(210)));
    }

    #[test]
    fn test_break_even_when_no_breach() {
        let params = StrategyParameters {
            break_even_percent: 10.0, // be = 9.35
            ..StrategyParameters::default()
        };
        let c = TradeCandidate::new("BE", Some(10.0))
            .with_snapshot(Timeframe::Minutes(30), 12.0, 10.0)
            .with_snapshot(Timeframe::Day, 12.5, 9.0)
            .with_close(10.5);
        let outcome = TradeResolver::new(params).resolve(&c);
        assert_eq!(outcome.hit_kind, HitKind::BreakEven);
        assert_eq!(outcome.hit_timeframe, Some(Timeframe::Day));
        assert_relative_eq!(outcome.exit_price, 9.35, epsilon = 1e-12);
    }

    #[test]
    fn test_hold_falls_back_to_close() {
        let c = TradeCandidate::new("HOLD", Some(10.0))
            .with_snapshot(Timeframe::Minutes(30), 12.0, 10.0)
            .with_close(10.35);
        let outcome = TradeResolver::new(StrategyParameters::default()).resolve(&c);
        assert!(outcome.activated);
        assert_eq!(outcome.hit_kind, HitKind::Hold);
        assert_relative_eq!(outcome.exit_price, 10.35, epsilon = 1e-12);
        assert_relative_eq!(outcome.return_percent, -10.0, epsilon = 1e-9);
        assert_eq!(outcome.hold_color(), Some(crate::SessionColor::Green));
    }

    #[test]
    fn test_not_activated_is_hold_at_close() {
        let c = TradeCandidate::new("FLAT", Some(10.0))
            .with_snapshot(Timeframe::Minutes(90), 11.0, 8.0)
            .with_snapshot(Timeframe::Day, 14.0, 7.0)
            .with_close(9.0);
        let outcome = TradeResolver::new(StrategyParameters::default()).resolve(&c);
        assert!(!outcome.activated);
        assert_eq!(outcome.hit_kind, HitKind::Hold);
        assert_eq!(outcome.hit_timeframe, None);
        assert_eq!(outcome.hold_color(), None);
    }

    #[test]
    fn test_full_day_cutoff_activates_late() {
        let c = TradeCandidate::new("FLAT", Some(10.0))
            .with_snapshot(Timeframe::Minutes(90), 11.0, 9.0)
            .with_snapshot(Timeframe::Day, 12.0, 9.0)
            .with_close(9.0);
        let params = StrategyParameters {
            activation_cutoff: Timeframe::Day,
            ..StrategyParameters::default()
        };
        assert!(TradeResolver::new(params).resolve(&c).activated);
    }

    #[test]
    fn test_zero_open_is_nan_hold() {
        let c = TradeCandidate::new("ZERO", Some(0.0))
            .with_snapshot(Timeframe::Minutes(30), 1.0, 0.0)
            .with_close(1.0);
        let outcome = TradeResolver::new(StrategyParameters::default()).resolve(&c);
        assert!(!outcome.activated);
        assert_eq!(outcome.hit_kind, HitKind::Hold);
        assert!(outcome.return_percent.is_nan());
        assert!(outcome.reward_risk.is_nan());
        assert!(outcome.levels.is_none());
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let mut c = TradeCandidate::new("GAPS", Some(10.0)).with_close(9.0);
        c.push_snapshot(Snapshot::new(Timeframe::Minutes(1), None, None));
        c.push_snapshot(Snapshot::new(Timeframe::Minutes(5), Some(11.6), None));
        c.push_snapshot(Snapshot::new(Timeframe::Minutes(30), None, Some(8.4)));
        let outcome = TradeResolver::new(StrategyParameters::default()).resolve(&c);
        assert!(outcome.activated);
        assert_eq!(outcome.hit_kind, HitKind::TakeProfit);
        assert_eq!(outcome.hit_timeframe, Some(Timeframe::Minutes(30)));
    }

    #[test]
    fn test_missing_close_gives_nan_return() {
        let c = TradeCandidate::new("NOCLOSE", Some(10.0))
            .with_snapshot(Timeframe::Minutes(30), 12.0, 10.0);
        let outcome = TradeResolver::new(StrategyParameters::default()).resolve(&c);
        assert_eq!(outcome.hit_kind, HitKind::Hold);
        assert!(outcome.exit_price.is_nan());
        assert!(outcome.return_percent.is_nan());
    }

    #[test]
    fn test_resolve_all_is_index_aligned() {
        let candidates = vec![
            scenario_candidate(),
            TradeCandidate::new("ZERO", Some(0.0)),
        ];
        let outcomes = TradeResolver::new(StrategyParameters::default()).resolve_all(&candidates);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].hit_kind, HitKind::StopLoss);
        assert!(!outcomes[1].activated);
    }
}
