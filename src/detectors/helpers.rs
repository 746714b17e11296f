//! Shared thresholds and comparisons for the candlestick recognizers.
//!
//! Thresholds follow TA-Lib's candle settings: body and shadow sizes are judged
//! against trailing averages over the bars *before* the one being tested.

use crate::{OHLCVExt, OHLCV};

// ============================================================
// TA-Lib THRESHOLDS
// ============================================================

/// Trailing period for body/range averages (TA_CANDLEAVGPERIOD)
pub const CANDLE_AVG_PERIOD: usize = 10;
/// Trailing period for Near/Far/Equal averages
pub const NEAR_AVG_PERIOD: usize = 5;

/// Body is doji-like: body <= avg_range * DOJI_FACTOR
pub const DOJI_FACTOR: f64 = 0.1;
/// Body is short: body < avg_body * BODY_SHORT_FACTOR
pub const BODY_SHORT_FACTOR: f64 = 1.0;
/// Body is long: body > avg_body * BODY_LONG_FACTOR
pub const BODY_LONG_FACTOR: f64 = 1.0;
/// Shadow very short: shadow < avg_range * SHADOW_VERYSHORT_FACTOR
pub const SHADOW_VERYSHORT_FACTOR: f64 = 0.1;
/// Equal threshold for price equality
pub const EQUAL_FACTOR: f64 = 0.05;
/// Near threshold for price near-equality
pub const NEAR_FACTOR: f64 = 0.2;
/// Far threshold for price far-apart
pub const FAR_FACTOR: f64 = 0.6;

// Fallback ratio thresholds, used while no trailing average exists
pub const DOJI_RATIO: f64 = 0.1;
pub const BODY_SHORT_RATIO: f64 = 0.3;
pub const BODY_LONG_RATIO: f64 = 0.7;
pub const SHADOW_SHORT_RATIO: f64 = 0.1;

/// Full-strength TA-Lib signal
pub const SIGNAL: i32 = 100;
/// Engulfing signal when only one body edge is engulfed
pub const WEAK_SIGNAL: i32 = 80;

// ============================================================
// COMPARISONS
// ============================================================

/// Body is doji-like. A zero body is always a doji.
#[inline]
pub fn is_doji(body: f64, avg_range: f64, range: f64, factor: f64) -> bool {
    if body <= 0.0 {
        return true;
    }
    if avg_range > 0.0 {
        body <= avg_range * factor
    } else {
        range > 0.0 && body / range <= DOJI_RATIO
    }
}

#[inline]
pub fn is_body_short(body: f64, avg_body: f64, range: f64, factor: f64) -> bool {
    if avg_body > 0.0 {
        body < avg_body * factor
    } else {
        range > 0.0 && body / range <= BODY_SHORT_RATIO
    }
}

#[inline]
pub fn is_body_long(body: f64, avg_body: f64, range: f64, factor: f64) -> bool {
    if avg_body > 0.0 {
        body > avg_body * factor
    } else {
        range > 0.0 && body / range >= BODY_LONG_RATIO
    }
}

/// Shadow longer than the bar's own body (TA-Lib ShadowLong, Period=0)
#[inline]
pub fn is_shadow_long(shadow: f64, body: f64) -> bool {
    shadow > body
}

#[inline]
pub fn is_shadow_very_short(shadow: f64, avg_range: f64, range: f64, factor: f64) -> bool {
    if avg_range > 0.0 {
        shadow < avg_range * factor
    } else {
        range > 0.0 && shadow / range <= SHADOW_SHORT_RATIO
    }
}

/// Real body of `curr` sits entirely above the real body of `prev`
#[inline]
pub fn real_body_gap_up<T: OHLCV>(curr: &T, prev: &T) -> bool {
    curr.body_bottom() > prev.body_top()
}

/// Real body of `curr` sits entirely below the real body of `prev`
#[inline]
pub fn real_body_gap_down<T: OHLCV>(curr: &T, prev: &T) -> bool {
    curr.body_top() < prev.body_bottom()
}

// ============================================================
// TRAILING AVERAGES
// ============================================================

fn trailing_mean<T: OHLCV>(bars: &[T], at: usize, period: usize, f: impl Fn(&T) -> f64) -> f64 {
    if at == 0 {
        return bars.first().map(&f).unwrap_or(0.0);
    }
    let start = at.saturating_sub(period);
    let slice = &bars[start..at];
    slice.iter().map(&f).sum::<f64>() / slice.len() as f64
}

/// Average real body over the `period` bars before `at`
#[inline]
pub fn trailing_avg_body<T: OHLCV>(bars: &[T], at: usize, period: usize) -> f64 {
    trailing_mean(bars, at, period, |b| b.body())
}

/// Average high-low range over the `period` bars before `at`
#[inline]
pub fn trailing_avg_range<T: OHLCV>(bars: &[T], at: usize, period: usize) -> f64 {
    trailing_mean(bars, at, period, |b| b.range())
}
