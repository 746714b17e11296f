//! Double top and double bottom chart patterns on closing prices.
//!
//! Both detectors walk candidate extrema left to right. For every first
//! extremum that follows a trend over `trend_lookback` bars, only the first
//! later extremum at least `min_separation` bars away is evaluated. Matches
//! from different first extrema may overlap and are all returned, ascending.

use std::fmt;

use crate::pivots::{is_local_extremum, PivotKind};
use crate::{Period, PriceSeries, Ratio};

/// Half-window of the local extremum test on closes
pub const EXTREMUM_WINDOW: usize = 3;

// ============================================================
// MATCH TYPES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DoubleTopMatch {
    pub first_top_index: usize,
    pub pivot_low_index: usize,
    pub second_top_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DoubleBottomMatch {
    pub first_bottom_index: usize,
    pub pivot_high_index: usize,
    pub second_bottom_index: usize,
}

/// A chart pattern occurrence of either kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ChartMatch {
    DoubleTop(DoubleTopMatch),
    DoubleBottom(DoubleBottomMatch),
}

impl ChartMatch {
    /// The three bar indices in chronological order
    pub fn indices(&self) -> [usize; 3] {
        match *self {
            ChartMatch::DoubleTop(m) => [m.first_top_index, m.pivot_low_index, m.second_top_index],
            ChartMatch::DoubleBottom(m) => [
                m.first_bottom_index,
                m.pivot_high_index,
                m.second_bottom_index,
            ],
        }
    }
}

// ============================================================
// SHARED SCAN
// ============================================================

/// Core of both detectors. `kind` selects peaks (High) or troughs (Low).
fn scan_double(
    closes: &[f64],
    kind: PivotKind,
    tolerance: Ratio,
    min_separation: Period,
    trend_lookback: Period,
) -> Vec<(usize, usize, usize)> {
    let n = closes.len();
    let lookback = trend_lookback.get();
    let w = EXTREMUM_WINDOW;
    let mut found = Vec::new();

    // a huge lookback or separation leaves no candidates
    for i in w.saturating_add(lookback)..n.saturating_sub(w) {
        let trending = match kind {
            PivotKind::High => closes[i] > closes[i - lookback],
            PivotKind::Low => closes[i] < closes[i - lookback],
        };
        if !trending || !is_local_extremum(closes, i, w, kind) {
            continue;
        }

        let first = closes[i];
        for j in i.saturating_add(min_separation.get())..n.saturating_sub(w) {
            if !is_local_extremum(closes, j, w, kind) {
                continue;
            }
            let second = closes[j];
            if (second - first).abs() <= tolerance.get() * first {
                let between = &closes[i + 1..j];
                if between.is_empty() {
                    continue;
                }
                let (offset, middle) = match kind {
                    PivotKind::High => first_min(between),
                    PivotKind::Low => first_max(between),
                };
                let confirmed = match kind {
                    PivotKind::High => middle < first.min(second),
                    PivotKind::Low => middle > first.max(second),
                };
                if confirmed {
                    found.push((i, i + 1 + offset, j));
                }
            }
            break;
        }
    }
    found
}

/// Position and value of the first minimum
fn first_min(values: &[f64]) -> (usize, f64) {
    let mut best = (0, values[0]);
    for (k, &v) in values.iter().enumerate().skip(1) {
        if v < best.1 {
            best = (k, v);
        }
    }
    best
}

/// Position and value of the first maximum
fn first_max(values: &[f64]) -> (usize, f64) {
    let mut best = (0, values[0]);
    for (k, &v) in values.iter().enumerate().skip(1) {
        if v > best.1 {
            best = (k, v);
        }
    }
    best
}

// ============================================================
// DOUBLE TOP
// ============================================================

/// Two peaks of similar close separated by a lower trough, after an uptrend
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DoubleTopDetector {
    /// Allowed gap between the two tops as a fraction of the first top
    pub tolerance: Ratio,
    /// Minimum bars from the first top to the second
    pub min_separation: Period,
    /// Bars back from the first top that must close lower
    pub trend_lookback: Period,
}

impl Default for DoubleTopDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.005),
            min_separation: Period::new_const(8),
            trend_lookback: Period::new_const(10),
        }
    }
}

impl DoubleTopDetector {
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn detect(&self, series: &PriceSeries) -> Vec<DoubleTopMatch> {
        scan_double(
            &series.closes(),
            PivotKind::High,
            self.tolerance,
            self.min_separation,
            self.trend_lookback,
        )
        .into_iter()
        .map(|(first_top_index, pivot_low_index, second_top_index)| DoubleTopMatch {
            first_top_index,
            pivot_low_index,
            second_top_index,
        })
        .collect()
    }
}

// ============================================================
// DOUBLE BOTTOM
// ============================================================

/// Mirror of [`DoubleTopDetector`]: two troughs around a higher peak, after a downtrend
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DoubleBottomDetector {
    pub tolerance: Ratio,
    pub min_separation: Period,
    pub trend_lookback: Period,
}

impl Default for DoubleBottomDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.005),
            min_separation: Period::new_const(8),
            trend_lookback: Period::new_const(10),
        }
    }
}

impl DoubleBottomDetector {
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn detect(&self, series: &PriceSeries) -> Vec<DoubleBottomMatch> {
        scan_double(
            &series.closes(),
            PivotKind::Low,
            self.tolerance,
            self.min_separation,
            self.trend_lookback,
        )
        .into_iter()
        .map(
            |(first_bottom_index, pivot_high_index, second_bottom_index)| DoubleBottomMatch {
                first_bottom_index,
                pivot_high_index,
                second_bottom_index,
            },
        )
        .collect()
    }
}

// ============================================================
// NAMED CHART PATTERNS
// ============================================================

/// Chart patterns with a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ChartPattern {
    DoubleTop,
    DoubleBottom,
}

impl ChartPattern {
    pub const ALL: [ChartPattern; 2] = [ChartPattern::DoubleTop, ChartPattern::DoubleBottom];

    pub fn name(self) -> &'static str {
        match self {
            ChartPattern::DoubleTop => "Double Top",
            ChartPattern::DoubleBottom => "Double Bottom",
        }
    }

    /// Unknown or unsupported names (e.g. "Head and Shoulders") give `None`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for ChartPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A configured chart detector, or a name nothing can detect
#[derive(Debug, Clone, PartialEq)]
pub enum ChartPatternDetector {
    DoubleTop(DoubleTopDetector),
    DoubleBottom(DoubleBottomDetector),
    Unrecognized(String),
}

impl ChartPatternDetector {
    /// Detector for a display name with default parameters
    pub fn by_name(name: &str) -> Self {
        match ChartPattern::from_name(name) {
            Some(ChartPattern::DoubleTop) => Self::DoubleTop(DoubleTopDetector::default()),
            Some(ChartPattern::DoubleBottom) => {
                Self::DoubleBottom(DoubleBottomDetector::default())
            }
            None => Self::Unrecognized(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::DoubleTop(_) => ChartPattern::DoubleTop.name(),
            Self::DoubleBottom(_) => ChartPattern::DoubleBottom.name(),
            Self::Unrecognized(name) => name,
        }
    }

    /// All matches in the series, ascending by first index
    pub fn detect(&self, series: &PriceSeries) -> Vec<ChartMatch> {
        match self {
            Self::DoubleTop(d) => d.detect(series).into_iter().map(ChartMatch::DoubleTop).collect(),
            Self::DoubleBottom(d) => d
                .detect(series)
                .into_iter()
                .map(ChartMatch::DoubleBottom)
                .collect(),
            Self::Unrecognized(_) => Vec::new(),
        }
    }
}

impl From<DoubleTopDetector> for ChartPatternDetector {
    fn from(d: DoubleTopDetector) -> Self {
        Self::DoubleTop(d)
    }
}

impl From<DoubleBottomDetector> for ChartPatternDetector {
    fn from(d: DoubleBottomDetector) -> Self {
        Self::DoubleBottom(d)
    }
}
