//! Data loading and cleaning
//!
//! Reads the gapper spreadsheet export (one row per ticker-day) into
//! [`TradeCandidate`] values. Cells are normalized from the locale formats
//! the sheets use: `12,5%`, `900.000`, `3,2M`, day-first dates. The decimal
//! separator is configured per file, so `900.000` is never mistaken for 900.
//! Anything unparseable becomes an absent value, never zero.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{MarketProfile, SessionColor, SheetMetrics, Snapshot, Timeframe, TradeCandidate};

// =============================================================================
// Loader configuration
// =============================================================================

/// How the input table is read and cleaned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: PathBuf,
    /// Field separator (`,` or `;` for European exports)
    pub delimiter: char,
    /// Decimal mark of numeric cells; the other of `,`/`.` is thousands grouping
    pub decimal_separator: char,
    /// A missing close uses the open price
    pub close_fallback_to_open: bool,
    /// Fill a missing 60m high/low from the 30m and 90m buckets
    pub reconstruct_60m: bool,
    /// Append the day High/Low as the final `Day` snapshot
    pub include_day_bucket: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/gappers.csv"),
            delimiter: ',',
            decimal_separator: ',',
            close_fallback_to_open: true,
            reconstruct_60m: true,
            include_day_bucket: true,
        }
    }
}

// =============================================================================
// Cell normalization
// =============================================================================

/// Parse a locale-formatted number.
///
/// `decimal` is the decimal mark (`,` or `.`); the other mark is thousands
/// grouping and is dropped. Accepts `%`/`$` decorations and `K`/`M`/`B`
/// magnitude suffixes. More than one decimal mark makes the cell invalid.
pub fn parse_locale_number(raw: &str, decimal: char) -> Option<f64> {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '%' | '$' | ' ' | '\u{a0}' | '\''))
        .collect();
    if s.is_empty() || s == "-" {
        return None;
    }

    let multiplier = match s.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => 1e3,
        Some('M') => 1e6,
        Some('B') => 1e9,
        _ => 1.0,
    };
    if multiplier != 1.0 {
        s.pop();
    }

    let grouping = if decimal == ',' { '.' } else { ',' };
    if s.matches(decimal).count() > 1 {
        return None;
    }
    let normalized = s.replace(grouping, "").replace(decimal, ".");

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * multiplier)
}

/// Parse a `RED`/`GREEN` session label
fn parse_session_color(raw: &str) -> Option<SessionColor> {
    match raw.trim().to_uppercase().as_str() {
        "RED" | "R" => Some(SessionColor::Red),
        "GREEN" | "G" => Some(SessionColor::Green),
        _ => None,
    }
}

const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%y", "%d-%m-%y",
];

/// Parse a date, day-first unless the year leads
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    // Drop a trailing time component
    let s = s.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

// =============================================================================
// Column mapping
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Date,
    Ticker,
    Open,
    Gap,
    Float,
    SharesOutstanding,
    MarketCap,
    PremarketHigh,
    TimeOfHigh,
    High,
    Low,
    Close,
    Volume,
    PremarketVolume,
    OpenVsPremarketHigh,
    OpenHigh,
    OpenLow,
    PremarketBreak,
    SessionClose,
}

/// Accepted header names per field, lower-cased
const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (Field::Date, &["date", "data"]),
    (Field::Ticker, &["ticker", "symbol"]),
    (Field::Open, &["open"]),
    (Field::Gap, &["gap%", "gap", "gap %"]),
    (Field::Float, &["shs float", "float"]),
    (Field::SharesOutstanding, &["shares outstanding", "shs outstand", "shs outstanding"]),
    (Field::MarketCap, &["market cap", "marketcap", "mkt cap"]),
    (Field::PremarketHigh, &["highpm", "pm high", "pmh"]),
    (Field::TimeOfHigh, &["timehigh", "orario high", "time high"]),
    (Field::High, &["high"]),
    (Field::Low, &["low"]),
    (Field::Close, &["close"]),
    (Field::Volume, &["volume"]),
    (Field::PremarketVolume, &["volumepm", "pm volume"]),
    (Field::OpenVsPremarketHigh, &["%open_pmh", "open_pmh%"]),
    (Field::OpenHigh, &["%oh", "oh%"]),
    (Field::OpenLow, &["%ol", "ol%"]),
    (Field::PremarketBreak, &["break", "pm break"]),
    (Field::SessionClose, &["chiusura", "session"]),
];

/// Header positions resolved once per file
#[derive(Debug)]
struct ColumnMap {
    decimal: char,
    fields: HashMap<Field, usize>,
    highs: BTreeMap<Timeframe, usize>,
    lows: BTreeMap<Timeframe, usize>,
    volumes: BTreeMap<Timeframe, usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord, decimal: char) -> Self {
        let mut map = ColumnMap {
            decimal,
            fields: HashMap::new(),
            highs: BTreeMap::new(),
            lows: BTreeMap::new(),
            volumes: BTreeMap::new(),
        };
        for (idx, header) in headers.iter().enumerate() {
            let name = header.trim().to_lowercase();

            if let Some((field, _)) = FIELD_ALIASES
                .iter()
                .find(|(_, aliases)| aliases.contains(&name.as_str()))
            {
                // First matching column wins
                map.fields.entry(*field).or_insert(idx);
                continue;
            }

            let bucket = |prefix: &str| {
                name.strip_prefix(prefix)
                    .and_then(|label| label.parse::<Timeframe>().ok())
            };
            if let Some(tf) = bucket("high_") {
                map.highs.insert(tf, idx);
            } else if let Some(tf) = bucket("low_") {
                map.lows.insert(tf, idx);
            } else if let Some(tf) = bucket("volume_") {
                map.volumes.insert(tf, idx);
            } else {
                debug!("Ignoring column {:?}", header);
            }
        }
        map
    }

    fn text<'r>(&self, record: &'r StringRecord, field: Field) -> Option<&'r str> {
        self.fields
            .get(&field)
            .and_then(|idx| record.get(*idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn number(&self, record: &StringRecord, field: Field) -> Option<f64> {
        self.text(record, field).and_then(|raw| self.parse_cell(record, raw))
    }

    fn cell_number(&self, record: &StringRecord, idx: usize) -> Option<f64> {
        record
            .get(idx)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|raw| self.parse_cell(record, raw))
    }

    fn parse_cell(&self, record: &StringRecord, raw: &str) -> Option<f64> {
        let parsed = parse_locale_number(raw, self.decimal);
        if parsed.is_none() {
            debug!(
                "Unparseable number {:?} on line {:?}",
                raw,
                record.position().map(|p| p.line())
            );
        }
        parsed
    }
}

// =============================================================================
// Record loading
// =============================================================================

/// Load candidates from the file named in the config
pub fn load_csv(config: &DataConfig) -> Result<Vec<TradeCandidate>> {
    let path: &Path = config.path.as_path();
    let file = std::fs::File::open(path)
        .context(format!("Failed to open data file {}", path.display()))?;
    let candidates = load_from_reader(file, config)
        .context(format!("Failed to load data from {}", path.display()))?;
    info!("Loaded {} candidates from {}", candidates.len(), path.display());
    Ok(candidates)
}

/// Load candidates from any CSV source
pub fn load_from_reader<R: Read>(reader: R, config: &DataConfig) -> Result<Vec<TradeCandidate>> {
    if !config.delimiter.is_ascii() {
        bail!("CSV delimiter must be an ASCII character, got {:?}", config.delimiter);
    }
    if !matches!(config.decimal_separator, ',' | '.') {
        bail!(
            "Decimal separator must be ',' or '.', got {:?}",
            config.decimal_separator
        );
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let columns = ColumnMap::from_headers(&headers, config.decimal_separator);
    if !columns.fields.contains_key(&Field::Ticker) {
        bail!("CSV has no Ticker column");
    }
    if !columns.fields.contains_key(&Field::Open) {
        warn!("CSV has no Open column; no candidate can activate");
    }

    let mut candidates = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;
        match build_candidate(&record, &columns, config) {
            Some(candidate) => candidates.push(candidate),
            None => warn!("Skipping row {} without a ticker", row_idx + 1),
        }
    }

    Ok(candidates)
}

fn build_candidate(
    record: &StringRecord,
    columns: &ColumnMap,
    config: &DataConfig,
) -> Option<TradeCandidate> {
    let ticker = columns.text(record, Field::Ticker)?;
    let open = columns.number(record, Field::Open);

    let mut candidate = TradeCandidate::new(ticker, open);

    if let Some(raw) = columns.text(record, Field::Date) {
        match parse_date(raw) {
            Some(date) => candidate = candidate.with_date(date),
            None => debug!("Unparseable date {:?} for {}", raw, ticker),
        }
    }
    if let Some(gap) = columns.number(record, Field::Gap) {
        candidate = candidate.with_gap_percent(gap);
    }

    let close = columns.number(record, Field::Close).or_else(|| {
        if config.close_fallback_to_open {
            candidate.open_price
        } else {
            None
        }
    });
    if let Some(close) = close {
        candidate = candidate.with_close(close);
    }

    let timeframes: Vec<Timeframe> = columns
        .highs
        .keys()
        .chain(columns.lows.keys())
        .copied()
        .collect();
    for tf in timeframes {
        let high = columns.highs.get(&tf).and_then(|idx| columns.cell_number(record, *idx));
        let low = columns.lows.get(&tf).and_then(|idx| columns.cell_number(record, *idx));
        let snapshot = Snapshot::new(tf, high, low);
        if !snapshot.is_empty() {
            candidate.push_snapshot(snapshot);
        }
    }

    if config.reconstruct_60m {
        reconstruct_60m(&mut candidate);
    }

    let day_high = columns.number(record, Field::High);
    let day_low = columns.number(record, Field::Low);
    if config.include_day_bucket {
        let day = Snapshot::new(Timeframe::Day, day_high, day_low);
        if !day.is_empty() {
            candidate.push_snapshot(day);
        }
    }

    let window_volumes = columns
        .volumes
        .iter()
        .filter_map(|(tf, idx)| columns.cell_number(record, *idx).map(|v| (*tf, v)))
        .collect();

    candidate.profile = MarketProfile {
        float_shares: columns.number(record, Field::Float),
        shares_outstanding: columns.number(record, Field::SharesOutstanding),
        market_cap: columns.number(record, Field::MarketCap),
        premarket_high: columns.number(record, Field::PremarketHigh),
        day_high,
        day_low,
        time_of_high: columns.text(record, Field::TimeOfHigh).map(str::to_string),
        volume: columns.number(record, Field::Volume),
        premarket_volume: columns.number(record, Field::PremarketVolume),
        window_volumes,
        sheet: SheetMetrics {
            open_vs_premarket_high_percent: columns.number(record, Field::OpenVsPremarketHigh),
            open_high_percent: columns.number(record, Field::OpenHigh),
            open_low_percent: columns.number(record, Field::OpenLow),
            premarket_break: columns.number(record, Field::PremarketBreak).map(|v| v != 0.0),
            session_color: columns
                .text(record, Field::SessionClose)
                .and_then(parse_session_color),
        },
    };

    Some(candidate)
}

/// Fill absent 60m extremes from the surrounding 30m and 90m buckets
fn reconstruct_60m(candidate: &mut TradeCandidate) {
    let m30 = candidate.snapshot(Timeframe::Minutes(30)).copied();
    let m90 = candidate.snapshot(Timeframe::Minutes(90)).copied();
    if m30.is_none() && m90.is_none() {
        return;
    }
    let existing = candidate.snapshot(Timeframe::Minutes(60)).copied();

    let highs = [m30.and_then(|s| s.high), m90.and_then(|s| s.high)];
    let lows = [m30.and_then(|s| s.low), m90.and_then(|s| s.low)];
    let max_high = highs.iter().flatten().copied().reduce(f64::max);
    let min_low = lows.iter().flatten().copied().reduce(f64::min);

    let high = existing.and_then(|s| s.high).or(max_high);
    let low = existing.and_then(|s| s.low).or(min_low);

    let rebuilt = Snapshot::new(Timeframe::Minutes(60), high, low);
    if !rebuilt.is_empty() && Some(rebuilt) != existing {
        candidate.push_snapshot(rebuilt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = "\
Date,Ticker,Open,Gap%,Shs Float,HighPM,TimeHigh,High,Low,Close,Volume,VolumePM,High_30m,Low_30m,High_90m,Low_90m,Volume_30m
03/02/2024,abcd,\"10,00\",\"85,5%\",\"2.500.000\",\"9,50\",9:42,\"14,00\",\"8,00\",\"9,00\",\"4.000.000\",\"1.000.000\",\"12,00\",\"10,00\",\"13,50\",\"9,50\",\"2.000.000\"
31/12/2024,EFGH,\"5,00\",n/a,,,,,,,,,,,,,
,,\"1,00\",,,,,,,,,,,,,,
";

    fn load(text: &str, config: &DataConfig) -> Vec<TradeCandidate> {
        load_from_reader(text.as_bytes(), config).unwrap()
    }

    #[test]
    fn test_parse_locale_number() {
        assert_eq!(parse_locale_number("12,5%", ','), Some(12.5));
        assert_eq!(parse_locale_number("1.234.567", ','), Some(1_234_567.0));
        assert_eq!(parse_locale_number("1.234,5", ','), Some(1234.5));
        assert_eq!(parse_locale_number("-7,25%", ','), Some(-7.25));
        assert_relative_eq!(parse_locale_number("3,2M", ',').unwrap(), 3_200_000.0);
        assert_relative_eq!(parse_locale_number("450K", ',').unwrap(), 450_000.0);
        assert_eq!(parse_locale_number("", ','), None);
        assert_eq!(parse_locale_number("-", ','), None);
        assert_eq!(parse_locale_number("n/a", ','), None);
        assert_eq!(parse_locale_number("NaN", ','), None);
        assert_eq!(parse_locale_number("1,2,3", ','), None);
    }

    #[test]
    fn test_single_dot_is_thousands_with_comma_decimal() {
        assert_eq!(parse_locale_number("900.000", ','), Some(900_000.0));
        assert_eq!(parse_locale_number("500.000", ','), Some(500_000.0));
        assert_eq!(parse_locale_number("14", ','), Some(14.0));
    }

    #[test]
    fn test_dot_decimal_locale() {
        assert_eq!(parse_locale_number("1,234.5", '.'), Some(1234.5));
        assert_eq!(parse_locale_number("3.5", '.'), Some(3.5));
        assert_eq!(parse_locale_number("$4.20", '.'), Some(4.2));
        assert_eq!(parse_locale_number("900,000", '.'), Some(900_000.0));
        assert_eq!(parse_locale_number("1.2.3", '.'), None);
    }

    #[test]
    fn test_parse_date_day_first() {
        assert_eq!(parse_date("03/02/2024"), NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(parse_date("03-02-2024"), NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(parse_date("2024-02-03"), NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(parse_date("03/02/2024 09:30"), NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_load_full_row() {
        let candidates = load(SAMPLE, &DataConfig::default());
        assert_eq!(candidates.len(), 2);

        let c = &candidates[0];
        assert_eq!(c.ticker.as_str(), "ABCD");
        assert_eq!(c.date, NaiveDate::from_ymd_opt(2024, 2, 3));
        assert_eq!(c.open_price, Some(10.0));
        assert_eq!(c.gap_percent, Some(85.5));
        assert_eq!(c.close_price, Some(9.0));
        assert_eq!(c.profile.float_shares, Some(2_500_000.0));
        assert_eq!(c.profile.premarket_high, Some(9.5));
        assert_eq!(c.profile.day_high, Some(14.0));
        assert_eq!(c.profile.time_of_high.as_deref(), Some("9:42"));
        assert_eq!(
            c.profile.window_volumes.get(&Timeframe::Minutes(30)),
            Some(&2_000_000.0)
        );

        let order: Vec<Timeframe> = c.snapshots().iter().map(|s| s.timeframe).collect();
        assert_eq!(
            order,
            vec![
                Timeframe::Minutes(30),
                Timeframe::Minutes(60),
                Timeframe::Minutes(90),
                Timeframe::Day
            ]
        );
        let m60 = c.snapshot(Timeframe::Minutes(60)).unwrap();
        assert_eq!(m60.high, Some(13.5));
        assert_eq!(m60.low, Some(9.5));
    }

    #[test]
    fn test_missing_cells_are_absent() {
        let candidates = load(SAMPLE, &DataConfig::default());
        let c = &candidates[1];
        assert_eq!(c.gap_percent, None);
        assert_eq!(c.profile.float_shares, None);
        assert!(c.snapshots().is_empty());
        // Close falls back to the open
        assert_eq!(c.close_price, Some(5.0));
    }

    #[test]
    fn test_options_disable_cleaning() {
        let config = DataConfig {
            close_fallback_to_open: false,
            reconstruct_60m: false,
            include_day_bucket: false,
            ..DataConfig::default()
        };
        let candidates = load(SAMPLE, &config);
        assert_eq!(candidates[1].close_price, None);
        let order: Vec<Timeframe> = candidates[0].snapshots().iter().map(|s| s.timeframe).collect();
        assert_eq!(order, vec![Timeframe::Minutes(30), Timeframe::Minutes(90)]);
    }

    #[test]
    fn test_header_aliases_and_semicolons() {
        let text = "Data;Ticker;OPEN;GAP;Float;Orario High\n05/03/2024;XYZ;2,5;120,0%;1.900.000;10:15\n";
        let config = DataConfig {
            delimiter: ';',
            ..DataConfig::default()
        };
        let candidates = load(text, &config);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].open_price, Some(2.5));
        assert_eq!(candidates[0].gap_percent, Some(120.0));
        assert_eq!(candidates[0].profile.float_shares, Some(1_900_000.0));
        assert_eq!(candidates[0].profile.time_of_high.as_deref(), Some("10:15"));
    }

    #[test]
    fn test_existing_60m_is_kept() {
        let text = "Ticker,Open,High_30m,Low_30m,High_60m,Low_60m,High_90m,Low_90m\nX,10,11,9,12,,13,8\n";
        let candidates = load(text, &DataConfig::default());
        let m60 = candidates[0].snapshot(Timeframe::Minutes(60)).unwrap();
        assert_eq!(m60.high, Some(12.0));
        assert_eq!(m60.low, Some(8.0));
    }

    #[test]
    fn test_precomputed_sheet_columns() {
        let text = "Ticker;OPEN;%Open_PMH;%OH;%OL;break;Chiusura\nXYZ;2,5;-4,5%;38,2%;12,0%;1;red\nQRS;3,0;;;;0;GREEN\n";
        let config = DataConfig {
            delimiter: ';',
            ..DataConfig::default()
        };
        let candidates = load(text, &config);
        let sheet = &candidates[0].profile.sheet;
        assert_eq!(sheet.open_vs_premarket_high_percent, Some(-4.5));
        assert_eq!(sheet.open_high_percent, Some(38.2));
        assert_eq!(sheet.open_low_percent, Some(12.0));
        assert_eq!(sheet.premarket_break, Some(true));
        // Close fell back to the open, but the sheet says the session was red
        assert_eq!(candidates[0].session_color(), Some(SessionColor::Red));
        assert_eq!(candidates[1].profile.sheet.premarket_break, Some(false));
        assert_eq!(candidates[1].session_color(), Some(SessionColor::Green));
    }

    #[test]
    fn test_dot_decimal_config() {
        let text = "Ticker,Open,Shs Float\nXYZ,2.55,\"1,900,000\"\n";
        let config = DataConfig {
            decimal_separator: '.',
            ..DataConfig::default()
        };
        let candidates = load(text, &config);
        assert_eq!(candidates[0].open_price, Some(2.55));
        assert_eq!(candidates[0].profile.float_shares, Some(1_900_000.0));

        let bad = DataConfig {
            decimal_separator: ';',
            ..DataConfig::default()
        };
        assert!(load_from_reader(text.as_bytes(), &bad).is_err());
    }

    #[test]
    fn test_missing_ticker_column_is_error() {
        let result = load_from_reader("Open,Close\n1,2\n".as_bytes(), &DataConfig::default());
        assert!(result.is_err());
    }
}
