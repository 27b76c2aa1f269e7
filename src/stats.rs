//! Aggregate statistics over candidate groups
//!
//! Every metric is computed only over rows where the underlying value is
//! present. Empty groups, zero denominators and all-missing columns produce
//! a missing [`Metric`], which renders as `-` and serializes as `null`.

use chrono::{NaiveTime, Timelike};
use serde::{Serialize, Serializer};
use statrs::statistics::{Data, Median, Statistics};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{safe_div, HitKind, SessionColor, TradeCandidate, TradeOutcome};

/// A statistic that may be unavailable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric(f64);

impl Metric {
    pub const MISSING: Metric = Metric(f64::NAN);

    /// Non-finite inputs are treated as missing
    pub fn new(value: f64) -> Self {
        Metric(value)
    }

    pub fn value(&self) -> Option<f64> {
        if self.0.is_finite() {
            Some(self.0)
        } else {
            None
        }
    }

    pub fn is_missing(&self) -> bool {
        self.value().is_none()
    }
}

impl Default for Metric {
    fn default() -> Self {
        Metric::MISSING
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match (self.value(), f.precision()) {
            (Some(v), Some(p)) => format!("{:.*}", p, v),
            (Some(v), None) => format!("{}", v),
            (None, _) => "-".to_string(),
        };
        match f.width() {
            Some(w) => write!(f, "{:>w$}", text, w = w),
            None => write!(f, "{}", text),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value().serialize(serializer)
    }
}

/// Mean and median of the present values
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeanMedian {
    pub count: usize,
    pub mean: Metric,
    pub median: Metric,
}

impl MeanMedian {
    pub fn from_values(values: Vec<f64>) -> Self {
        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return Self::default();
        }
        let mean = values.iter().mean();
        let count = values.len();
        let median = Data::new(values).median();
        Self {
            count,
            mean: Metric::new(mean),
            median: Metric::new(median),
        }
    }
}

/// Parse `H:MM` / `HH:MM` (optionally `:SS`) into minutes since midnight
pub fn parse_clock_minutes(text: &str) -> Option<f64> {
    let mut parts = text.trim().split(':');
    let hours: u32 = parts.next()?.trim().parse().ok()?;
    let minutes: u32 = parts.next()?.trim().parse().ok()?;
    let seconds: u32 = match parts.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    let time = NaiveTime::from_hms_opt(hours, minutes, seconds)?;
    Some(time.num_seconds_from_midnight() as f64 / 60.0)
}

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Format minutes since midnight as `HH:MM`, wrapping past midnight; `-` when missing
pub fn format_clock(minutes: Metric) -> String {
    match minutes.value() {
        Some(m) if m >= 0.0 => {
            let total = (m.round() as i64) % MINUTES_PER_DAY;
            format!("{:02}:{:02}", total / 60, total % 60)
        }
        _ => "-".to_string(),
    }
}

/// Mean and median time of the intraday high
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClockSummary {
    pub count: usize,
    /// Minutes since midnight
    pub mean_minutes: Metric,
    pub median_minutes: Metric,
}

impl ClockSummary {
    pub fn mean(&self) -> String {
        format_clock(self.mean_minutes)
    }

    pub fn median(&self) -> String {
        format_clock(self.median_minutes)
    }
}

/// Descriptive statistics for one group of candidates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStats {
    pub count: usize,
    pub gap_percent: MeanMedian,
    pub float_shares: MeanMedian,
    pub shares_outstanding: MeanMedian,
    pub market_cap: MeanMedian,
    /// (day high - open) / day high * 100
    pub push_percent: MeanMedian,
    /// (open - premarket high) / premarket high * 100
    pub open_vs_premarket_high: MeanMedian,
    /// (open - day low) / open * 100
    pub open_to_low_percent: MeanMedian,
    /// Share of sessions trading above the premarket high, among known rows
    pub pm_break_percent: Metric,
    pub time_of_high: ClockSummary,
    /// window volume / premarket volume * 100, keyed by window label
    pub volume_ratios: BTreeMap<String, MeanMedian>,
    /// Strategy return of the group; empty when no outcomes were supplied
    pub return_percent: MeanMedian,
    /// Share of sessions closing below the open, among known closes
    pub red_close_percent: Metric,
}

#[derive(Default)]
struct Columns {
    count: usize,
    gap: Vec<f64>,
    float_shares: Vec<f64>,
    shares_outstanding: Vec<f64>,
    market_cap: Vec<f64>,
    push: Vec<f64>,
    open_vs_pmh: Vec<f64>,
    open_to_low: Vec<f64>,
    pm_breaks: usize,
    pm_known: usize,
    time_of_high: Vec<f64>,
    volume_ratios: BTreeMap<String, Vec<f64>>,
    returns: Vec<f64>,
    red: usize,
    colored: usize,
}

impl Columns {
    fn push(&mut self, candidate: &TradeCandidate, outcome: Option<&TradeOutcome>) {
        let profile = &candidate.profile;
        self.count += 1;

        self.gap.extend(candidate.gap_percent);
        self.float_shares.extend(profile.float_shares);
        self.shares_outstanding.extend(profile.shares_outstanding);
        self.market_cap.extend(profile.market_cap);

        self.push.extend(candidate.open_high_percent());
        self.open_vs_pmh.extend(candidate.open_vs_premarket_high_percent());
        self.open_to_low.extend(candidate.open_low_percent());
        if let Some(broke) = candidate.premarket_break() {
            self.pm_known += 1;
            if broke {
                self.pm_breaks += 1;
            }
        }
        if let Some(minutes) = profile.time_of_high.as_deref().and_then(parse_clock_minutes) {
            self.time_of_high.push(minutes);
        }

        if let Some(pm_volume) = profile.premarket_volume {
            for (tf, volume) in &profile.window_volumes {
                self.volume_ratios
                    .entry(tf.label())
                    .or_default()
                    .push(safe_div(*volume, pm_volume) * 100.0);
            }
            if let Some(volume) = profile.volume {
                self.volume_ratios
                    .entry("day".to_string())
                    .or_default()
                    .push(safe_div(volume, pm_volume) * 100.0);
            }
        }

        if let Some(outcome) = outcome {
            self.returns.push(outcome.return_percent);
        }

        if let Some(color) = candidate.session_color() {
            self.colored += 1;
            if color == SessionColor::Red {
                self.red += 1;
            }
        }
    }

    fn finish(self) -> GroupStats {
        let time_of_high = MeanMedian::from_values(self.time_of_high);
        GroupStats {
            count: self.count,
            gap_percent: MeanMedian::from_values(self.gap),
            float_shares: MeanMedian::from_values(self.float_shares),
            shares_outstanding: MeanMedian::from_values(self.shares_outstanding),
            market_cap: MeanMedian::from_values(self.market_cap),
            push_percent: MeanMedian::from_values(self.push),
            open_vs_premarket_high: MeanMedian::from_values(self.open_vs_pmh),
            open_to_low_percent: MeanMedian::from_values(self.open_to_low),
            pm_break_percent: Metric::new(
                safe_div(self.pm_breaks as f64, self.pm_known as f64) * 100.0,
            ),
            time_of_high: ClockSummary {
                count: time_of_high.count,
                mean_minutes: time_of_high.mean,
                median_minutes: time_of_high.median,
            },
            volume_ratios: self
                .volume_ratios
                .into_iter()
                .map(|(k, v)| (k, MeanMedian::from_values(v)))
                .collect(),
            return_percent: MeanMedian::from_values(self.returns),
            red_close_percent: Metric::new(safe_div(self.red as f64, self.colored as f64) * 100.0),
        }
    }
}

impl GroupStats {
    /// Statistics over candidates alone (no strategy returns)
    pub fn from_candidates<'a, I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = &'a TradeCandidate>,
    {
        let mut columns = Columns::default();
        for candidate in candidates {
            columns.push(candidate, None);
        }
        columns.finish()
    }

    /// Statistics over resolved candidates
    pub fn from_resolved<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a TradeCandidate, &'a TradeOutcome)>,
    {
        let mut columns = Columns::default();
        for (candidate, outcome) in rows {
            columns.push(candidate, Some(outcome));
        }
        columns.finish()
    }
}

/// KPI counts over one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub total: usize,
    pub activated: usize,
    pub stop_loss: usize,
    pub take_profit: usize,
    pub break_even: usize,
    pub hold_green: usize,
    pub hold_red: usize,
    /// Activated holds whose close is unknown
    pub hold_unknown: usize,
}

impl OutcomeCounts {
    pub fn from_outcomes(outcomes: &[TradeOutcome]) -> Self {
        let mut counts = OutcomeCounts {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes.iter().filter(|o| o.activated) {
            counts.activated += 1;
            match (outcome.hit_kind, outcome.hold_color()) {
                (HitKind::StopLoss, _) => counts.stop_loss += 1,
                (HitKind::TakeProfit, _) => counts.take_profit += 1,
                (HitKind::BreakEven, _) => counts.break_even += 1,
                (HitKind::Hold, Some(SessionColor::Green)) => counts.hold_green += 1,
                (HitKind::Hold, Some(SessionColor::Red)) => counts.hold_red += 1,
                (HitKind::Hold, None) => counts.hold_unknown += 1,
            }
        }
        counts
    }
}

/// Average return of activated positions held to the close, split by colour
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HoldBreakdown {
    pub green_count: usize,
    pub red_count: usize,
    pub green_avg_return: Metric,
    pub red_avg_return: Metric,
}

/// Statistics for every outcome class of one evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeReport {
    pub counts: OutcomeCounts,
    pub all: GroupStats,
    pub activated: GroupStats,
    pub stop_loss: GroupStats,
    pub take_profit: GroupStats,
    pub break_even: GroupStats,
    pub hold_green: GroupStats,
    pub hold_red: GroupStats,
    pub hold_breakdown: HoldBreakdown,
    /// All candidates split by close vs open
    pub red_sessions: GroupStats,
    pub green_sessions: GroupStats,
}

impl OutcomeReport {
    /// Build from index-aligned candidates and outcomes
    pub fn build(candidates: &[TradeCandidate], outcomes: &[TradeOutcome]) -> Self {
        let rows: Vec<(&TradeCandidate, &TradeOutcome)> = candidates.iter().zip(outcomes).collect();
        let of_kind = |kind: HitKind| select(&rows, move |_, o| o.activated && o.hit_kind == kind);

        let hold_green = select(&rows, |_, o| o.hold_color() == Some(SessionColor::Green));
        let hold_red = select(&rows, |_, o| o.hold_color() == Some(SessionColor::Red));
        let hold_breakdown = HoldBreakdown {
            green_count: hold_green.count,
            red_count: hold_red.count,
            green_avg_return: hold_green.return_percent.mean,
            red_avg_return: hold_red.return_percent.mean,
        };

        OutcomeReport {
            counts: OutcomeCounts::from_outcomes(outcomes),
            all: select(&rows, |_, _| true),
            activated: select(&rows, |_, o| o.activated),
            stop_loss: of_kind(HitKind::StopLoss),
            take_profit: of_kind(HitKind::TakeProfit),
            break_even: of_kind(HitKind::BreakEven),
            hold_green,
            hold_red,
            hold_breakdown,
            red_sessions: select(&rows, |c, _| c.session_color() == Some(SessionColor::Red)),
            green_sessions: select(&rows, |c, _| c.session_color() == Some(SessionColor::Green)),
        }
    }
}

fn select<F>(rows: &[(&TradeCandidate, &TradeOutcome)], keep: F) -> GroupStats
where
    F: Fn(&TradeCandidate, &TradeOutcome) -> bool,
{
    GroupStats::from_resolved(rows.iter().copied().filter(|&(c, o)| keep(c, o)))
}
