//! Data collaborators: price history sources, the series cache and symbol
//! universes.
//!
//! A [`SeriesProvider`] answers `(symbol, interval, date range)` with a
//! [`PriceSeries`]. [`CachedSeriesProvider`] loads each symbol's full history
//! once from a [`HistorySource`] and slices it per request.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::{PatternError, PriceBar, PriceSeries};

// ============================================================
// ERRORS
// ============================================================

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column `{column}` in {path}")]
    MissingColumn { column: &'static str, path: PathBuf },

    #[error("Invalid series: {0}")]
    InvalidSeries(#[from] PatternError),

    #[error("Source error: {0}")]
    Source(String),
}

// ============================================================
// INTERVAL AND DATE RANGE
// ============================================================

/// Bar interval, serialized as the provider code (`"1d"`, `"1wk"`, ...)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[default]
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1wk")]
    Week1,
    #[serde(rename = "1mo")]
    Month1,
}

impl Interval {
    pub const ALL: [Interval; 8] = [
        Interval::Minute1,
        Interval::Minute5,
        Interval::Minute15,
        Interval::Minute30,
        Interval::Hour1,
        Interval::Day1,
        Interval::Week1,
        Interval::Month1,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Day1 => "1d",
            Interval::Week1 => "1wk",
            Interval::Month1 => "1mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Interval {
    type Err = PatternError;

    fn from_str(s: &str) -> crate::Result<Self> {
        Interval::ALL
            .into_iter()
            .find(|i| i.code() == s)
            .ok_or_else(|| PatternError::InvalidConfig(format!("unknown interval: {s}")))
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(serde::Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = PatternError;

    fn try_from(raw: RawDateRange) -> crate::Result<Self> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Rejects `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> crate::Result<Self> {
        if start > end {
            return Err(PatternError::InvalidConfig(format!(
                "date range starts after it ends: {start} > {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Every representable date
    pub fn unbounded() -> Self {
        Self {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// ============================================================
// PROVIDER TRAITS
// ============================================================

/// Series for a symbol within a date range. No data is an empty series, not an error.
pub trait SeriesProvider: Send + Sync {
    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range: &DateRange,
    ) -> Result<PriceSeries, DataError>;
}

impl<P: SeriesProvider + ?Sized> SeriesProvider for Arc<P> {
    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range: &DateRange,
    ) -> Result<PriceSeries, DataError> {
        (**self).fetch(symbol, interval, range)
    }
}

/// Full price history of a symbol
pub trait HistorySource: Send + Sync {
    fn load_history(&self, symbol: &str, interval: Interval) -> Result<PriceSeries, DataError>;
}

// ============================================================
// SERIES CACHE
// ============================================================

type CacheKey = (String, Interval);

/// Process-wide cache of full histories keyed by `(symbol, interval)`.
///
/// Readers never block each other. When two loads of the same key race, the
/// first inserted series wins and both callers get it.
#[derive(Debug, Default)]
pub struct SeriesCache {
    entries: RwLock<HashMap<CacheKey, Arc<PriceSeries>>>,
}

impl SeriesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str, interval: Interval) -> Option<Arc<PriceSeries>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&(symbol.to_string(), interval)).cloned()
    }

    /// Insert unless present; returns the cached entry either way
    pub fn insert(&self, symbol: &str, interval: Interval, series: PriceSeries) -> Arc<PriceSeries> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry((symbol.to_string(), interval))
            .or_insert_with(|| Arc::new(series))
            .clone()
    }

    /// Cached entry, or the result of `load` stored on a miss. Load errors are not cached.
    pub fn get_or_try_load<F>(
        &self,
        symbol: &str,
        interval: Interval,
        load: F,
    ) -> Result<Arc<PriceSeries>, DataError>
    where
        F: FnOnce() -> Result<PriceSeries, DataError>,
    {
        if let Some(hit) = self.get(symbol, interval) {
            return Ok(hit);
        }
        let series = load()?;
        Ok(self.insert(symbol, interval, series))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Loads full history once per key through a shared [`SeriesCache`]
#[derive(Debug)]
pub struct CachedSeriesProvider<S> {
    source: S,
    cache: Arc<SeriesCache>,
}

impl<S: HistorySource> CachedSeriesProvider<S> {
    pub fn new(source: S, cache: Arc<SeriesCache>) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &Arc<SeriesCache> {
        &self.cache
    }
}

impl<S: HistorySource> SeriesProvider for CachedSeriesProvider<S> {
    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range: &DateRange,
    ) -> Result<PriceSeries, DataError> {
        let history = self.cache.get_or_try_load(symbol, interval, || {
            log::debug!("loading {symbol} {interval} history");
            self.source.load_history(symbol, interval)
        })?;
        Ok(history.between(range))
    }
}

// ============================================================
// SOURCES
// ============================================================

/// Histories held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    histories: HashMap<CacheKey, PriceSeries>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, interval: Interval, series: PriceSeries) -> Self {
        self.insert(symbol, interval, series);
        self
    }

    pub fn insert(&mut self, symbol: &str, interval: Interval, series: PriceSeries) {
        self.histories.insert((symbol.to_string(), interval), series);
    }
}

impl HistorySource for InMemorySource {
    fn load_history(&self, symbol: &str, interval: Interval) -> Result<PriceSeries, DataError> {
        Ok(self
            .histories
            .get(&(symbol.to_string(), interval))
            .cloned()
            .unwrap_or_default())
    }
}

impl SeriesProvider for InMemorySource {
    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range: &DateRange,
    ) -> Result<PriceSeries, DataError> {
        Ok(self
            .histories
            .get(&(symbol.to_string(), interval))
            .map(|s| s.between(range))
            .unwrap_or_default())
    }
}

/// One row of a history CSV. Unparseable numbers become `None`.
#[derive(Debug, serde::Deserialize)]
struct HistoryRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open", deserialize_with = "csv::invalid_option")]
    open: Option<f64>,
    #[serde(rename = "High", deserialize_with = "csv::invalid_option")]
    high: Option<f64>,
    #[serde(rename = "Low", deserialize_with = "csv::invalid_option")]
    low: Option<f64>,
    #[serde(rename = "Close", deserialize_with = "csv::invalid_option")]
    close: Option<f64>,
    #[serde(rename = "Volume", deserialize_with = "csv::invalid_option")]
    volume: Option<f64>,
}

impl HistoryRow {
    fn into_bar(self) -> Option<PriceBar> {
        let bar = PriceBar::new(
            parse_timestamp(&self.date)?,
            self.open?,
            self.high?,
            self.low?,
            self.close?,
            self.volume?,
        );
        let prices = [bar.open, bar.high, bar.low, bar.close, bar.volume];
        prices.iter().all(|p| p.is_finite()).then_some(bar)
    }
}

const HISTORY_COLUMNS: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];

/// Parse a bar date: Unix seconds, RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or `YYYY-MM-DD`
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Reads `<root>/<SYMBOL>_<interval>.csv` with Date,Open,High,Low,Close,Volume columns.
///
/// A missing file is an empty history. Rows with unparseable fields are
/// dropped; remaining rows are sorted by time and duplicate timestamps keep
/// the first row.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.root.join(format!("{symbol}_{interval}.csv"))
    }
}

impl HistorySource for CsvDirectorySource {
    fn load_history(&self, symbol: &str, interval: Interval) -> Result<PriceSeries, DataError> {
        let path = self.path_for(symbol, interval);
        if !path.exists() {
            log::debug!("no history file at {}", path.display());
            return Ok(PriceSeries::empty());
        }

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(&path)?;
        let headers = reader.headers()?.clone();
        if let Some(column) = HISTORY_COLUMNS
            .into_iter()
            .find(|c| !headers.iter().any(|h| h == *c))
        {
            return Err(DataError::MissingColumn { column, path });
        }

        let mut bars = Vec::new();
        let mut dropped = 0usize;
        for row in reader.deserialize::<HistoryRow>() {
            match row?.into_bar() {
                Some(bar) => bars.push(bar),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            log::debug!("{symbol}: dropped {dropped} incomplete rows");
        }

        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Ok(PriceSeries::new(bars)?)
    }
}

// ============================================================
// SYMBOL UNIVERSES
// ============================================================

/// The symbols a scan covers, ordered and deduplicated
pub trait SymbolUniverse: Send + Sync {
    fn list_symbols(&self) -> Result<Vec<String>, DataError>;
}

/// Keep the first occurrence of each symbol, drop blanks
pub(crate) fn dedup_symbols<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .map(Into::into)
        .filter(|s| !s.trim().is_empty() && seen.insert(s.clone()))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    symbols: Vec<String>,
}

impl StaticUniverse {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: dedup_symbols(symbols),
        }
    }
}

impl SymbolUniverse for StaticUniverse {
    fn list_symbols(&self) -> Result<Vec<String>, DataError> {
        Ok(self.symbols.clone())
    }
}

/// The `SYMBOL` column of an equity list CSV
#[derive(Debug, Clone)]
pub struct CsvUniverse {
    path: PathBuf,
}

impl CsvUniverse {
    pub const SYMBOL_COLUMN: &'static str = "SYMBOL";

    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SymbolUniverse for CsvUniverse {
    fn list_symbols(&self) -> Result<Vec<String>, DataError> {
        if !self.path.exists() {
            log::warn!("stock list CSV not found: {}", self.path.display());
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)?;
        let Some(column) = reader
            .headers()?
            .iter()
            .position(|h| h == Self::SYMBOL_COLUMN)
        else {
            log::warn!("stock list CSV has no SYMBOL column: {}", self.path.display());
            return Ok(Vec::new());
        };

        let mut symbols = Vec::new();
        for record in reader.records() {
            if let Some(symbol) = record?.get(column) {
                symbols.push(symbol.to_string());
            }
        }
        let symbols = dedup_symbols(symbols);
        if symbols.is_empty() {
            log::warn!("stock list CSV is empty: {}", self.path.display());
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily(days: i64) -> PriceSeries {
        let start = date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let bars = (0..days)
            .map(|i| PriceBar::new(start + i * 86_400, 10.0, 11.0, 9.0, 10.5, 100.0))
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    #[test]
    fn test_interval_codes() {
        for interval in Interval::ALL {
            assert_eq!(interval.code().parse::<Interval>().unwrap(), interval);
            let json = serde_json::to_string(&interval).unwrap();
            assert_eq!(json, format!("\"{}\"", interval.code()));
        }
        assert!("2d".parse::<Interval>().is_err());
    }

    #[test]
    fn test_date_range_rejects_reversed() {
        assert!(DateRange::new(date(2024, 2, 1), date(2024, 1, 1)).is_err());
        let single = DateRange::new(date(2024, 1, 1), date(2024, 1, 1)).unwrap();
        assert!(single.contains(date(2024, 1, 1)));
        assert!(!single.contains(date(2024, 1, 2)));
        assert!(serde_json::from_str::<DateRange>(r#"{"start":"2024-02-01","end":"2024-01-01"}"#).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let midnight = 1_704_067_200; // 2024-01-01T00:00:00Z
        assert_eq!(parse_timestamp("2024-01-01"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01T05:30:00+05:30"), Some(midnight));
        assert_eq!(parse_timestamp("2024-01-01 05:30:00+05:30"), Some(midnight));
        assert_eq!(parse_timestamp("1704067200"), Some(midnight));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_cache_keeps_first_insert() {
        let cache = SeriesCache::new();
        let first = cache.insert("ABC", Interval::Day1, daily(3));
        let second = cache.insert("ABC", Interval::Day1, daily(5));
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("ABC", Interval::Week1).is_none());
    }

    #[test]
    fn test_cache_does_not_store_errors() {
        let cache = SeriesCache::new();
        let failed = cache.get_or_try_load("ABC", Interval::Day1, || {
            Err(DataError::Source("offline".into()))
        });
        assert!(failed.is_err());
        assert!(cache.is_empty());
        let loaded = cache.get_or_try_load("ABC", Interval::Day1, || Ok(daily(4))).unwrap();
        assert_eq!(loaded.len(), 4);
    }

    #[test]
    fn test_cached_provider_slices_range() {
        let cache = Arc::new(SeriesCache::new());
        let source = InMemorySource::new().with_series("ABC", Interval::Day1, daily(10));
        let provider = CachedSeriesProvider::new(source, Arc::clone(&cache));
        let range = DateRange::new(date(2024, 1, 3), date(2024, 1, 5)).unwrap();
        let series = provider.fetch("ABC", Interval::Day1, &range).unwrap();
        assert_eq!(series.len(), 3);
        // full history is what gets cached
        assert_eq!(cache.get("ABC", Interval::Day1).unwrap().len(), 10);
        assert!(provider.fetch("XYZ", Interval::Day1, &range).unwrap().is_empty());
    }

    #[test]
    fn test_static_universe_dedups_in_order() {
        let universe = StaticUniverse::new(["TCS", "INFY", "TCS", "", "WIPRO", "INFY"]);
        assert_eq!(universe.list_symbols().unwrap(), vec!["TCS", "INFY", "WIPRO"]);
    }
}
