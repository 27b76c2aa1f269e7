//! Core data types used across the evaluator

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for user-supplied parameters
#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("{name} must be a finite number, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("initial capital ({0}) must be > 0")]
    NonPositiveCapital(f64),

    #[error("risk percent ({0}) must be >= 0")]
    NegativeRisk(f64),

    #[error("invalid timeframe label: {0:?} (expected e.g. \"30m\" or \"day\")")]
    InvalidTimeframe(String),
}

/// Ticker symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every outcome, ledger entry and export row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    /// Tickers are stored trimmed and upper-cased
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref().trim().to_uppercase().as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Intraday bucket, ordered by elapsed time since the open.
///
/// `Day` is the whole session and sorts after every minute bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    Minutes(u32),
    Day,
}

impl Timeframe {
    pub fn label(&self) -> String {
        match self {
            Timeframe::Minutes(m) => format!("{}m", m),
            Timeframe::Day => "day".to_string(),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Timeframe {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "day" || s == "d" || s == "1d" {
            return Ok(Timeframe::Day);
        }
        s.strip_suffix('m')
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .map(Timeframe::Minutes)
            .ok_or(ParameterError::InvalidTimeframe(s))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ParameterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.label()
    }
}

/// Keep only finite values; NaN and infinities count as absent
pub(crate) fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Price extremes observed up to a given bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timeframe: Timeframe,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl Snapshot {
    pub fn new(timeframe: Timeframe, high: Option<f64>, low: Option<f64>) -> Self {
        Self {
            timeframe,
            high: finite(high),
            low: finite(low),
        }
    }

    /// True when neither extreme is known
    pub fn is_empty(&self) -> bool {
        self.high.is_none() && self.low.is_none()
    }
}

/// Descriptive columns used by the statistics reporter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketProfile {
    pub float_shares: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub market_cap: Option<f64>,
    pub premarket_high: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    /// Raw `HH:MM` clock time of the intraday high
    pub time_of_high: Option<String>,
    pub volume: Option<f64>,
    pub premarket_volume: Option<f64>,
    pub window_volumes: BTreeMap<Timeframe, f64>,
    /// Precomputed sheet columns, used when the prices they derive from are absent
    pub sheet: SheetMetrics,
}

/// Derived columns some exports carry ready-made (`%Open_PMH`, `%OH`, `%OL`,
/// `break`, `Chiusura`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetMetrics {
    pub open_vs_premarket_high_percent: Option<f64>,
    pub open_high_percent: Option<f64>,
    pub open_low_percent: Option<f64>,
    pub premarket_break: Option<bool>,
    pub session_color: Option<SessionColor>,
}

/// One ticker-day row of the cleaned dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCandidate {
    pub date: Option<NaiveDate>,
    pub ticker: Symbol,
    pub open_price: Option<f64>,
    pub gap_percent: Option<f64>,
    pub close_price: Option<f64>,
    pub profile: MarketProfile,
    snapshots: Vec<Snapshot>,
}

impl TradeCandidate {
    pub fn new(ticker: impl AsRef<str>, open_price: Option<f64>) -> Self {
        Self {
            date: None,
            ticker: Symbol::new(ticker),
            open_price: finite(open_price),
            gap_percent: None,
            close_price: None,
            profile: MarketProfile::default(),
            snapshots: Vec::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_gap_percent(mut self, gap_percent: f64) -> Self {
        self.gap_percent = finite(Some(gap_percent));
        self
    }

    pub fn with_close(mut self, close_price: f64) -> Self {
        self.close_price = finite(Some(close_price));
        self
    }

    pub fn with_profile(mut self, profile: MarketProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Add a bucket given raw extremes (non-finite values become absent)
    pub fn with_snapshot(mut self, timeframe: Timeframe, high: f64, low: f64) -> Self {
        self.push_snapshot(Snapshot::new(timeframe, Some(high), Some(low)));
        self
    }

    /// Insert keeping time order; a repeated timeframe replaces the earlier one
    pub fn push_snapshot(&mut self, snapshot: Snapshot) {
        match self
            .snapshots
            .binary_search_by_key(&snapshot.timeframe, |s| s.timeframe)
        {
            Ok(idx) => self.snapshots[idx] = snapshot,
            Err(idx) => self.snapshots.insert(idx, snapshot),
        }
    }

    /// Snapshots in increasing elapsed-time order
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn snapshot(&self, timeframe: Timeframe) -> Option<&Snapshot> {
        self.snapshots
            .binary_search_by_key(&timeframe, |s| s.timeframe)
            .ok()
            .map(|idx| &self.snapshots[idx])
    }

    /// Session colour, `Red` when the stock closed below the open.
    ///
    /// A colour stated by the sheet wins over one derived from prices, since
    /// the loader may have filled a missing close from the open.
    pub fn session_color(&self) -> Option<SessionColor> {
        if let Some(color) = self.profile.sheet.session_color {
            return Some(color);
        }
        match (self.open_price, self.close_price) {
            (Some(open), Some(close)) if close < open => Some(SessionColor::Red),
            (Some(_), Some(_)) => Some(SessionColor::Green),
            _ => None,
        }
    }

    /// (open - premarket high) / premarket high * 100
    pub fn open_vs_premarket_high_percent(&self) -> Option<f64> {
        let derived = match (self.open_price, self.profile.premarket_high) {
            (Some(open), Some(pmh)) => finite(Some(safe_div(open - pmh, pmh) * 100.0)),
            _ => None,
        };
        derived.or(self.profile.sheet.open_vs_premarket_high_percent)
    }

    /// Push from the open to the day high: (high - open) / high * 100
    pub fn open_high_percent(&self) -> Option<f64> {
        let derived = match (self.open_price, self.profile.day_high) {
            (Some(open), Some(high)) => finite(Some(safe_div(high - open, high) * 100.0)),
            _ => None,
        };
        derived.or(self.profile.sheet.open_high_percent)
    }

    /// Fade from the open to the day low: (open - low) / open * 100
    pub fn open_low_percent(&self) -> Option<f64> {
        let derived = match (self.open_price, self.profile.day_low) {
            (Some(open), Some(low)) => finite(Some(safe_div(open - low, open) * 100.0)),
            _ => None,
        };
        derived.or(self.profile.sheet.open_low_percent)
    }

    /// Whether the session traded above the premarket high
    pub fn premarket_break(&self) -> Option<bool> {
        match (self.profile.day_high, self.profile.premarket_high) {
            (Some(high), Some(pmh)) => Some(high > pmh),
            _ => self.profile.sheet.premarket_break,
        }
    }
}

/// Strategy thresholds, immutable for one evaluation run.
///
/// All percentages are relative to the candidate's open price, except
/// `break_even_percent` which is applied on top of the take-profit price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParameters {
    pub entry_percent: f64,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub break_even_percent: f64,
    /// Last bucket (inclusive) in which the entry trigger may fire
    pub activation_cutoff: Timeframe,
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            entry_percent: 15.0,
            stop_loss_percent: 30.0,
            take_profit_percent: -15.0,
            break_even_percent: 0.0,
            activation_cutoff: Timeframe::Minutes(90),
        }
    }
}

impl StrategyParameters {
    pub fn validate(&self) -> Result<(), ParameterError> {
        let fields = [
            ("entry_percent", self.entry_percent),
            ("stop_loss_percent", self.stop_loss_percent),
            ("take_profit_percent", self.take_profit_percent),
            ("break_even_percent", self.break_even_percent),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(ParameterError::NonFinite { name, value });
            }
        }
        Ok(())
    }

    /// Derive absolute price levels from an open price.
    ///
    /// Returns `None` when the open is missing, zero or non-finite.
    pub fn levels(&self, open_price: Option<f64>) -> Option<PriceLevels> {
        let open = finite(open_price).filter(|o| *o != 0.0)?;
        let take_profit = open * (1.0 + self.take_profit_percent / 100.0);
        Some(PriceLevels {
            entry: open * (1.0 + self.entry_percent / 100.0),
            stop_loss: open * (1.0 + self.stop_loss_percent / 100.0),
            take_profit,
            break_even: take_profit * (1.0 + self.break_even_percent / 100.0),
        })
    }
}

/// Division that yields NaN instead of infinities
pub(crate) fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// Absolute prices derived for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub break_even: f64,
}

impl PriceLevels {
    /// (entry - tp) / (sl - entry); NaN when the stop sits on the entry
    pub fn reward_risk(&self) -> f64 {
        safe_div(self.entry - self.take_profit, self.stop_loss - self.entry)
    }

    /// (entry - be) / (sl - entry)
    pub fn reward_risk_break_even(&self) -> f64 {
        safe_div(self.entry - self.break_even, self.stop_loss - self.entry)
    }

    pub fn stop_distance(&self) -> f64 {
        (self.stop_loss - self.entry).abs()
    }
}

/// How a candidate's hypothetical position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitKind {
    StopLoss,
    TakeProfit,
    BreakEven,
    Hold,
}

impl fmt::Display for HitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HitKind::StopLoss => "SL",
            HitKind::TakeProfit => "TP",
            HitKind::BreakEven => "BE",
            HitKind::Hold => "HOLD",
        };
        write!(f, "{}", s)
    }
}

/// Red/green classification of a session or a held short
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionColor {
    Red,
    Green,
}

impl fmt::Display for SessionColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionColor::Red => write!(f, "RED"),
            SessionColor::Green => write!(f, "GREEN"),
        }
    }
}

/// Resolved result for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub activated: bool,
    pub hit_kind: HitKind,
    /// NaN when the exit is a missing close
    pub exit_price: f64,
    /// (exit - entry) / entry * 100; negative is a gain for the short
    pub return_percent: f64,
    /// Bucket in which SL, TP or BE was detected
    pub hit_timeframe: Option<Timeframe>,
    pub levels: Option<PriceLevels>,
    pub reward_risk: f64,
    pub reward_risk_break_even: f64,
}

impl TradeOutcome {
    /// Colour of an activated position held to the close.
    ///
    /// Green when the short made money (price closed below entry).
    pub fn hold_color(&self) -> Option<SessionColor> {
        if !self.activated || self.hit_kind != HitKind::Hold || self.return_percent.is_nan() {
            return None;
        }
        if self.return_percent < 0.0 {
            Some(SessionColor::Green)
        } else {
            Some(SessionColor::Red)
        }
    }
}
