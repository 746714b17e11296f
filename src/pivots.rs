//! Pivot extrema over a fixed symmetric window.
//!
//! Position `i` is a pivot when its value equals the max (High) or min (Low)
//! of `values[i - w..=i + w]`. Only positions with a full window on both
//! sides are considered, and plateaus are not deduplicated.

use crate::{Period, PriceSeries};

/// Default half-window
pub const DEFAULT_WINDOW: Period = Period::new_const(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PivotKind {
    High,
    Low,
}

/// A local extremum. `price` is the bar's High for a High pivot, Low for a Low pivot.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pivot {
    pub index: usize,
    pub timestamp: i64,
    pub kind: PivotKind,
    pub price: f64,
}

/// Whether `values[index]` is the window extremum of the given kind.
///
/// Returns `false` when the window does not fit inside `values`.
#[inline]
pub fn is_local_extremum(values: &[f64], index: usize, window: usize, kind: PivotKind) -> bool {
    if index < window || index.saturating_add(window) >= values.len() {
        return false;
    }
    let value = values[index];
    let neighbourhood = &values[index - window..=index + window];
    match kind {
        PivotKind::High => neighbourhood.iter().all(|&v| v <= value),
        PivotKind::Low => neighbourhood.iter().all(|&v| v >= value),
    }
}

/// Positions of every window extremum of `values`, ascending
pub fn local_extrema(values: &[f64], kind: PivotKind, window: Period) -> Vec<usize> {
    let w = window.get();
    if values.len() <= w.saturating_mul(2) {
        return Vec::new();
    }
    (w..values.len() - w)
        .filter(|&i| is_local_extremum(values, i, w, kind))
        .collect()
}

/// Pivot positions on the series highs (High) or lows (Low)
pub fn find_pivots(series: &PriceSeries, kind: PivotKind, window: Period) -> Vec<usize> {
    let values = match kind {
        PivotKind::High => series.highs(),
        PivotKind::Low => series.lows(),
    };
    local_extrema(&values, kind, window)
}

/// Typed pivot records, ascending by index
pub fn pivots(series: &PriceSeries, kind: PivotKind, window: Period) -> Vec<Pivot> {
    find_pivots(series, kind, window)
        .into_iter()
        .filter_map(|index| {
            let bar = series.get(index)?;
            let price = match kind {
                PivotKind::High => bar.high,
                PivotKind::Low => bar.low,
            };
            Some(Pivot {
                index,
                timestamp: bar.timestamp,
                kind,
                price,
            })
        })
        .collect()
}
