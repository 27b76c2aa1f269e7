//! Candidate selection
//!
//! Range predicates over the loaded table. An unset bound always passes;
//! a set bound on a missing value excludes the row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Symbol, TradeCandidate};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub min_gap_percent: Option<f64>,
    pub max_gap_percent: Option<f64>,
    pub min_open: Option<f64>,
    pub max_open: Option<f64>,
    pub min_float: Option<f64>,
    pub max_float: Option<f64>,
    pub min_market_cap: Option<f64>,
    pub max_market_cap: Option<f64>,
    /// Lower bound on (open - premarket high) / premarket high * 100
    pub min_open_vs_premarket_high: Option<f64>,
    /// Empty means every ticker
    pub tickers: Vec<String>,
}

fn within<T: PartialOrd + Copy>(value: Option<T>, min: Option<T>, max: Option<T>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    match value {
        Some(v) => min.map_or(true, |lo| v >= lo) && max.map_or(true, |hi| v <= hi),
        None => false,
    }
}

impl FilterConfig {
    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_gap_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_gap_percent = min;
        self.max_gap_percent = max;
        self
    }

    pub fn with_tickers(mut self, tickers: Vec<String>) -> Self {
        self.tickers = tickers;
        self
    }

    /// True when no predicate is set
    pub fn is_empty(&self) -> bool {
        *self == FilterConfig::default()
    }

    pub fn matches(&self, candidate: &TradeCandidate) -> bool {
        let profile = &candidate.profile;

        if !self.tickers.is_empty()
            && !self.tickers.iter().any(|t| Symbol::new(t) == candidate.ticker)
        {
            return false;
        }

        let open_vs_pmh = candidate.open_vs_premarket_high_percent();

        within(candidate.date, self.start_date, self.end_date)
            && within(candidate.gap_percent, self.min_gap_percent, self.max_gap_percent)
            && within(candidate.open_price, self.min_open, self.max_open)
            && within(profile.float_shares, self.min_float, self.max_float)
            && within(profile.market_cap, self.min_market_cap, self.max_market_cap)
            && within(open_vs_pmh, self.min_open_vs_premarket_high, None)
    }

    /// Keep matching candidates in their original order
    pub fn apply(&self, candidates: Vec<TradeCandidate>) -> Vec<TradeCandidate> {
        if self.is_empty() {
            return candidates;
        }
        let before = candidates.len();
        let kept: Vec<TradeCandidate> =
            candidates.into_iter().filter(|c| self.matches(c)).collect();
        info!("Filters kept {} of {} candidates", kept.len(), before);
        kept
    }
}
