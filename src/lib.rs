//! # chartscan - chart pattern detection and symbol scanning
//!
//! Pivot extrema, Dow Theory trend regions, double top / double bottom chart
//! patterns, candlestick pattern matching and common indicators over OHLCV
//! price series, plus a cancellable multi-symbol scanner.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartscan::prelude::*;
//!
//! let closes = [10.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 20.0, 15.0, 12.0, 14.0, 19.0, 13.0, 12.0, 11.0, 10.0];
//! let bars = closes
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &c)| PriceBar::new(i as i64 * 86_400, c, c + 0.5, c - 0.5, c, 1_000.0))
//!     .collect();
//! let series = PriceSeries::new(bars).unwrap();
//!
//! let detector = DoubleTopDetector {
//!     tolerance: Ratio::new(0.05).unwrap(),
//!     min_separation: Period::new(4).unwrap(),
//!     trend_lookback: Period::new(3).unwrap(),
//! };
//! let tops = detector.detect(&series);
//! assert_eq!(tops.len(), 1);
//!
//! let highs = find_pivots(&series, PivotKind::High, Period::new(3).unwrap());
//! let lows = find_pivots(&series, PivotKind::Low, Period::new(3).unwrap());
//! let regions = determine_regions(&series, &highs, &lows, DowRule::default());
//! assert!(!regions.is_empty());
//! ```

pub mod candlestick;
pub mod chart;
pub mod config;
pub mod data;
pub mod detectors;
pub mod indicators;
pub mod params;
pub mod pivots;
pub mod scan;
pub mod trend;

pub mod prelude {
    pub use crate::{
        // Candlesticks
        candlestick::{match_pattern, CandlestickMatcher, CandlestickPattern, Recognizer},
        // Chart patterns
        chart::{
            ChartMatch, ChartPattern, ChartPatternDetector, DoubleBottomDetector,
            DoubleBottomMatch, DoubleTopDetector, DoubleTopMatch,
        },
        // Configuration
        config::ScanConfig,
        // Data collaborators
        data::{
            CachedSeriesProvider, CsvDirectorySource, CsvUniverse, DataError, DateRange,
            HistorySource, InMemorySource, Interval, SeriesCache, SeriesProvider,
            StaticUniverse, SymbolUniverse,
        },
        // Indicators
        indicators::{
            bollinger_bands, ema, is_overbought, is_oversold, is_stoch_overbought,
            is_stoch_oversold, rsi, sma, stochastic, BollingerBands, IndicatorSet, Stochastic,
        },
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Pivots
        pivots::{find_pivots, is_local_extremum, local_extrema, pivots, Pivot, PivotKind},
        // Scanning
        scan::{
            CancellationToken, MatchPayload, NoProgress, ProgressSink, RecordedProgress,
            ScanError, ScanFailure, ScanHandle, ScanOutcome, ScanProgress, ScanRequest,
            ScanResult, ScanService, Scanner, SeriesDetector, ServiceError,
        },
        // Trend
        trend::{determine_regions, DowRule, Trend, TrendRegion},
        // Core traits
        CandleRecognizer,
        Direction,
        OHLCVExt,
        // Errors
        PatternError,
        Period,
        PriceBar,
        PriceSeries,
        Ratio,
        Result,
        OHLCV,
    };
}

use chrono::NaiveDate;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised at the detector and data-model boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Timestamp at index {index} does not increase")]
    UnorderedTimestamps { index: usize },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period or window length (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed candle geometry
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    /// TA-Lib candle colour: white when close >= open
    #[inline]
    fn is_white(&self) -> bool {
        self.close() >= self.open()
    }

    /// TA-Lib candle colour: black when close < open
    #[inline]
    fn is_black(&self) -> bool {
        self.close() < self.open()
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Direction/bias of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    /// Direction implied by a signed recognizer output
    pub fn of_signal(signal: i32) -> Direction {
        match signal {
            s if s > 0 => Direction::Bullish,
            s if s < 0 => Direction::Bearish,
            _ => Direction::Neutral,
        }
    }
}

// ============================================================
// PRICE BARS AND SERIES
// ============================================================

/// One OHLCV bar. `timestamp` is Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceBar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Calendar date (UTC) of the bar, `None` if the timestamp is out of range
    pub fn date(&self) -> Option<NaiveDate> {
        chrono::DateTime::from_timestamp(self.timestamp, 0).map(|dt| dt.date_naive())
    }
}

impl OHLCV for PriceBar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

/// Timestamp-ordered sequence of bars.
///
/// Timestamps strictly increase, so a series never holds duplicates. Gaps
/// (missing sessions) are kept as they are.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<PriceBar>", into = "Vec<PriceBar>")]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, rejecting timestamps that do not strictly increase
    pub fn new(bars: Vec<PriceBar>) -> Result<Self> {
        if let Some(index) = bars
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(PatternError::UnorderedTimestamps { index: index + 1 });
        }
        Ok(Self { bars })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&PriceBar> {
        self.bars.get(index)
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn timestamp_at(&self, index: usize) -> Option<i64> {
        self.bars.get(index).map(|b| b.timestamp)
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Bars whose UTC date falls inside `range` (inclusive on both ends)
    pub fn between(&self, range: &data::DateRange) -> PriceSeries {
        let bars = self
            .bars
            .iter()
            .filter(|b| b.date().is_some_and(|d| range.contains(d)))
            .copied()
            .collect();
        Self { bars }
    }

    /// Check every bar for NaN/infinite prices and `high < low`
    pub fn validate(&self) -> Result<()> {
        for (i, bar) in self.bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<PriceBar>> for PriceSeries {
    type Error = PatternError;

    fn try_from(bars: Vec<PriceBar>) -> Result<Self> {
        PriceSeries::new(bars)
    }
}

impl From<PriceSeries> for Vec<PriceBar> {
    fn from(series: PriceSeries) -> Self {
        series.bars
    }
}

// ============================================================
// RECOGNIZER TRAIT
// ============================================================

/// Candlestick recognizer producing a TA-Lib style signed signal per bar.
///
/// Positive values flag a bullish occurrence, negative values a bearish one
/// and zero means no pattern at that bar.
pub trait CandleRecognizer: Send + Sync {
    /// Stable identifier, e.g. `CDL_HAMMER`
    fn id(&self) -> &'static str;

    /// Bars needed up to and including the signal bar
    fn min_bars(&self) -> usize;

    /// Signal at a single bar
    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32;

    /// Signals for every bar of `bars`
    fn signals<T: OHLCV>(&self, bars: &[T]) -> Vec<i32> {
        (0..bars.len())
            .map(|i| {
                if i + 1 >= self.min_bars() {
                    self.signal_at(bars, i)
                } else {
                    0
                }
            })
            .collect()
    }
}

// ============================================================
// TESTS
// ============================================================
