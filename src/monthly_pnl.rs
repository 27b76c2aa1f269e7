//! Monthly P&L breakdown of a simulated ledger
//!
//! Trades are bucketed by the candidate's session date. Ledger entries
//! without a date are tallied separately and only appear in the totals.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::simulator::LedgerEntry;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// P&L data for one calendar month
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyPnL {
    pub net_pnl: f64,
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
}

impl MonthlyPnL {
    fn add_entry(&mut self, entry: &LedgerEntry) {
        self.net_pnl += entry.pnl;
        self.trade_count += 1;
        if entry.pnl > 0.0 {
            self.winning_trades += 1;
        } else if entry.pnl < 0.0 {
            self.losing_trades += 1;
        }
    }

    /// Winning share of decided trades, in percent; 0 when none
    pub fn win_rate(&self) -> f64 {
        let decided = self.winning_trades + self.losing_trades;
        if decided == 0 {
            0.0
        } else {
            self.winning_trades as f64 / decided as f64 * 100.0
        }
    }
}

/// Year-Month key for organizing data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    fn from_date(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month())
    }
}

/// Monthly P&L matrix organized by year and month
#[derive(Debug, Clone, Default)]
pub struct MonthlyPnLMatrix {
    data: BTreeMap<YearMonth, MonthlyPnL>,
    undated: MonthlyPnL,
}

impl MonthlyPnLMatrix {
    pub fn from_ledger(entries: &[LedgerEntry]) -> Self {
        let mut matrix = Self::default();
        for entry in entries {
            match entry.date {
                Some(date) => matrix
                    .data
                    .entry(YearMonth::from_date(date))
                    .or_default()
                    .add_entry(entry),
                None => matrix.undated.add_entry(entry),
            }
        }
        matrix
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.undated.trade_count == 0
    }

    fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.data.keys().map(|ym| ym.year).collect();
        years.dedup();
        years
    }

    pub fn get(&self, year: i32, month: u32) -> Option<&MonthlyPnL> {
        self.data.get(&YearMonth::new(year, month))
    }

    pub fn undated(&self) -> &MonthlyPnL {
        &self.undated
    }

    pub fn yearly_total(&self, year: i32) -> f64 {
        self.data
            .iter()
            .filter(|(ym, _)| ym.year == year)
            .map(|(_, pnl)| pnl.net_pnl)
            .sum()
    }

    /// Sum over every entry, dated or not
    pub fn total_pnl(&self) -> f64 {
        self.data.values().map(|pnl| pnl.net_pnl).sum::<f64>() + self.undated.net_pnl
    }

    /// Render the matrix, optionally with ANSI colours for a terminal
    pub fn render(&self, colored: bool) -> String {
        if self.is_empty() {
            return "No trades to display monthly P&L matrix.".to_string();
        }

        let paint = |value: f64, text: String| {
            if !colored {
                text
            } else if value > 0.0 {
                format!("{}{}{}", GREEN, text, RESET)
            } else {
                format!("{}{}{}", RED, text, RESET)
            }
        };
        let (bold, reset) = if colored { (BOLD, RESET) } else { ("", "") };

        let mut output = String::new();
        output.push_str(&format!("\n{}{}{}\n", bold, "=".repeat(120), reset));
        output.push_str(&format!("{}MONTHLY P&L MATRIX{}\n", bold, reset));
        output.push_str(&format!("{}{}{}\n", bold, "=".repeat(120), reset));

        output.push_str(&format!(
            "{:>6} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>10} │ {:>12}\n",
            "Year", "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "Total"
        ));
        output.push_str(&format!("{}\n", "-".repeat(120)));

        for year in self.years() {
            output.push_str(&format!("{:>6} │", year));
            for month in 1..=12 {
                let cell = match self.get(year, month) {
                    Some(pnl) => paint(pnl.net_pnl, format!("{:>10.2}", pnl.net_pnl)),
                    None => " ".repeat(10),
                };
                output.push_str(&format!(" {} │", cell));
            }
            let year_total = self.yearly_total(year);
            output.push_str(&format!(" {}\n", paint(year_total, format!("{:>12.2}", year_total))));
        }

        output.push_str(&format!("{}\n", "=".repeat(120)));

        if self.undated.trade_count > 0 {
            output.push_str(&format!(
                "Undated trades: {} (P&L {:.2})\n",
                self.undated.trade_count, self.undated.net_pnl
            ));
        }

        let total = self.total_pnl();
        output.push_str(&format!(
            "{}Total P&L: {}{}\n",
            bold,
            paint(total, format!("{:.2}", total)),
            reset
        ));

        let profitable_months = self.data.values().filter(|pnl| pnl.net_pnl > 0.0).count();
        let total_months = self.data.len();
        let monthly_win_rate = if total_months > 0 {
            (profitable_months as f64 / total_months as f64) * 100.0
        } else {
            0.0
        };
        output.push_str(&format!(
            "Monthly Win Rate: {:.1}% ({} profitable months / {} total months)\n",
            monthly_win_rate, profitable_months, total_months
        ));
        output.push_str(&format!("{}\n", "=".repeat(120)));

        output
    }
}
