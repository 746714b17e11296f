//! Dow Theory trend regions.
//!
//! Pivot highs and lows are merged by position and each pivot is labelled
//! against the pivots before it. A region runs from one labelled pivot to the
//! next, and the last region runs to the final bar.

use crate::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
}

/// How a pivot is compared with the pivots before it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowRule {
    /// A High is compared with the previous High only, a Low with the
    /// previous Low only. Both kinds must already have been seen.
    #[default]
    SameKind,
    /// Higher high needs a higher low behind it (and lower high a lower low).
    /// Lows are confirmed against the last two highs the same way.
    CrossConfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrendRegion {
    pub start_index: usize,
    pub end_index: usize,
    pub start: i64,
    pub end: i64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    High,
    Low,
}

/// Last two pivot prices of one kind, newest first
#[derive(Debug, Default, Clone, Copy)]
struct Recent {
    last: Option<f64>,
    before: Option<f64>,
}

impl Recent {
    fn push(&mut self, price: f64) {
        self.before = self.last;
        self.last = Some(price);
    }

    /// Direction of the last two prices: `Some(true)` rising, `Some(false)` falling
    fn rising(&self) -> Option<bool> {
        let (last, before) = (self.last?, self.before?);
        if last > before {
            Some(true)
        } else if last < before {
            Some(false)
        } else {
            None
        }
    }
}

fn classify(price: f64, own: &Recent, other: &Recent, rule: DowRule) -> Trend {
    let Some(prev) = own.last else {
        return Trend::Sideways;
    };
    if other.last.is_none() {
        return Trend::Sideways;
    }
    let confirmed = |up: bool| match rule {
        DowRule::SameKind => true,
        DowRule::CrossConfirmed => other.rising() == Some(up),
    };
    if price > prev && confirmed(true) {
        Trend::Uptrend
    } else if price < prev && confirmed(false) {
        Trend::Downtrend
    } else {
        Trend::Sideways
    }
}

/// Label trend regions from pivot high and pivot low positions.
///
/// Positions outside the series are dropped with a warning. An empty series
/// or no pivots gives no regions.
pub fn determine_regions(
    series: &PriceSeries,
    pivot_highs: &[usize],
    pivot_lows: &[usize],
    rule: DowRule,
) -> Vec<TrendRegion> {
    let Some(last_bar) = series.len().checked_sub(1) else {
        return Vec::new();
    };

    let mut merged: Vec<(usize, Side)> = pivot_highs
        .iter()
        .map(|&i| (i, Side::High))
        .chain(pivot_lows.iter().map(|&i| (i, Side::Low)))
        .filter(|&(i, side)| {
            let inside = i <= last_bar;
            if !inside {
                log::warn!("discarding {side:?} pivot at {i}: series has {} bars", series.len());
            }
            inside
        })
        .collect();
    merged.sort_by_key(|&(i, _)| i);

    let mut highs = Recent::default();
    let mut lows = Recent::default();
    let mut labelled = Vec::with_capacity(merged.len());
    for (index, side) in merged {
        let Some(bar) = series.get(index) else {
            continue;
        };
        let trend = match side {
            Side::High => {
                let trend = classify(bar.high, &highs, &lows, rule);
                highs.push(bar.high);
                trend
            }
            Side::Low => {
                let trend = classify(bar.low, &lows, &highs, rule);
                lows.push(bar.low);
                trend
            }
        };
        labelled.push((index, trend));
    }

    labelled
        .iter()
        .enumerate()
        .map(|(k, &(start_index, trend))| {
            let end_index = labelled.get(k + 1).map_or(last_bar, |&(next, _)| next);
            TrendRegion {
                start_index,
                end_index,
                start: series.timestamp_at(start_index).unwrap_or_default(),
                end: series.timestamp_at(end_index).unwrap_or_default(),
                trend,
            }
        })
        .collect()
}
