//! Oscillators and moving averages over price series.
//!
//! Every function returns one value per input position. Positions without
//! enough history are `None`.
//!
//! ```rust
//! use chartscan::indicators::{rsi, sma};
//! use chartscan::Period;
//!
//! let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
//! assert_eq!(sma(&closes, Period::new(3).unwrap()), vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
//! assert_eq!(rsi(&closes, Period::new(3).unwrap())[4], Some(100.0));
//! ```

use std::collections::BTreeMap;

use crate::pivots::{self, find_pivots, PivotKind};
use crate::{Period, PriceSeries};

pub const RSI_PERIOD: Period = Period::new_const(14);
pub const STOCH_K_PERIOD: Period = Period::new_const(14);
pub const STOCH_D_PERIOD: Period = Period::new_const(3);
pub const STOCH_SMOOTH_K: Period = Period::new_const(3);
pub const BOLLINGER_PERIOD: Period = Period::new_const(20);
pub const BOLLINGER_STD_DEV: f64 = 2.0;
pub const VOLUME_MA_PERIOD: Period = Period::new_const(20);
pub const DEFAULT_EMA_PERIODS: [Period; 2] = [Period::new_const(20), Period::new_const(50)];

pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const RSI_OVERSOLD: f64 = 30.0;
pub const STOCH_OVERBOUGHT: f64 = 80.0;
pub const STOCH_OVERSOLD: f64 = 20.0;

// ============================================================
// MOVING AVERAGES
// ============================================================

/// Simple moving average over full windows of `period`
pub fn sma(values: &[f64], period: Period) -> Vec<Option<f64>> {
    let p = period.get();
    let mut out = vec![None; values.len()];
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= p {
            sum -= values[i - p];
        }
        if i + 1 >= p {
            out[i] = Some(sum / p as f64);
        }
    }
    out
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first value. Defined from the first position on.
pub fn ema(values: &[f64], span: Period) -> Vec<Option<f64>> {
    let alpha = 2.0 / (span.get() as f64 + 1.0);
    let mut prev: Option<f64> = None;
    values
        .iter()
        .map(|&v| {
            let next = prev.map_or(v, |p| alpha * v + (1.0 - alpha) * p);
            prev = Some(next);
            Some(next)
        })
        .collect()
}

/// Mean of the defined values among the last `period` positions
fn rolling_mean_defined(values: &[Option<f64>], period: Period) -> Vec<Option<f64>> {
    let p = period.get();
    (0..values.len())
        .map(|i| {
            let window = &values[(i + 1).saturating_sub(p)..=i];
            let (sum, count) = window
                .iter()
                .flatten()
                .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

// ============================================================
// OSCILLATORS
// ============================================================

/// Relative strength index from the average gain and loss over `period`
/// moves. The first position counts as a zero move, so the first value
/// lands at `period - 1`. No movement at all in a window gives `None`.
pub fn rsi(values: &[f64], period: Period) -> Vec<Option<f64>> {
    let moves: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| if i == 0 { 0.0 } else { v - values[i - 1] })
        .collect();
    let gains: Vec<f64> = moves.iter().map(|&d| d.max(0.0)).collect();
    let losses: Vec<f64> = moves.iter().map(|&d| (-d).max(0.0)).collect();

    sma(&gains, period)
        .into_iter()
        .zip(sma(&losses, period))
        .map(|(gain, loss)| match (gain?, loss?) {
            (g, l) if l > 0.0 => Some(100.0 - 100.0 / (1.0 + g / l)),
            (g, _) if g > 0.0 => Some(100.0),
            _ => None,
        })
        .collect()
}

/// Stochastic oscillator lines
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Stochastic {
    /// Smoothed %K
    pub k: Vec<Option<f64>>,
    /// Moving average of %K
    pub d: Vec<Option<f64>>,
}

/// %K is where the close sits in the high/low range of the last `k_period`
/// bars (fewer at the start), smoothed over `smooth_k`. %D averages %K over
/// `d_period`. A bar whose range is flat has no raw %K.
pub fn stochastic(
    series: &PriceSeries,
    k_period: Period,
    d_period: Period,
    smooth_k: Period,
) -> Stochastic {
    let bars = series.bars();
    let kp = k_period.get();
    let raw: Vec<Option<f64>> = (0..bars.len())
        .map(|i| {
            let window = &bars[(i + 1).saturating_sub(kp)..=i];
            let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let range = high - low;
            (range > 0.0).then(|| 100.0 * (bars[i].close - low) / range)
        })
        .collect();

    let k = rolling_mean_defined(&raw, smooth_k);
    let d = rolling_mean_defined(&k, d_period);
    Stochastic { k, d }
}

// ============================================================
// BOLLINGER BANDS
// ============================================================

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BollingerBands {
    pub middle: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Moving average of `period` with bands `std_dev` sample standard
/// deviations either side. A period of 1 has no deviation and no bands.
pub fn bollinger_bands(values: &[f64], period: Period, std_dev: f64) -> BollingerBands {
    let p = period.get();
    let middle = sma(values, period);
    let deviation: Vec<Option<f64>> = middle
        .iter()
        .enumerate()
        .map(|(i, mean)| {
            let mean = (*mean)?;
            if p < 2 {
                return None;
            }
            let window = &values[i + 1 - p..=i];
            let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (p - 1) as f64;
            Some(var.sqrt())
        })
        .collect();

    let band = |sign: f64| -> Vec<Option<f64>> {
        middle
            .iter()
            .zip(&deviation)
            .map(|(m, s)| Some((*m)? + sign * std_dev * (*s)?))
            .collect()
    };
    let upper = band(1.0);
    let lower = band(-1.0);
    BollingerBands { middle, upper, lower }
}

// ============================================================
// THRESHOLDS
// ============================================================

pub fn is_overbought(rsi: f64, threshold: f64) -> bool {
    rsi > threshold
}

pub fn is_oversold(rsi: f64, threshold: f64) -> bool {
    rsi < threshold
}

/// Both %K and %D above `threshold`
pub fn is_stoch_overbought(k: f64, d: f64, threshold: f64) -> bool {
    k > threshold && d > threshold
}

/// Both %K and %D below `threshold`
pub fn is_stoch_oversold(k: f64, d: f64, threshold: f64) -> bool {
    k < threshold && d < threshold
}

// ============================================================
// INDICATOR SET
// ============================================================

/// The standard indicators for one series with their default periods
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IndicatorSet {
    pub rsi: Vec<Option<f64>>,
    pub stochastic: Stochastic,
    /// Close EMA keyed by span
    pub emas: BTreeMap<usize, Vec<Option<f64>>>,
    pub bollinger: BollingerBands,
    pub volume_ma: Vec<Option<f64>>,
    pub pivot_highs: Vec<usize>,
    pub pivot_lows: Vec<usize>,
}

impl IndicatorSet {
    /// Compute everything with the default EMA spans (20 and 50)
    pub fn compute(series: &PriceSeries) -> Self {
        Self::with_ema_periods(series, &DEFAULT_EMA_PERIODS)
    }

    pub fn with_ema_periods(series: &PriceSeries, ema_periods: &[Period]) -> Self {
        let closes = series.closes();
        let emas = ema_periods
            .iter()
            .map(|&span| (span.get(), ema(&closes, span)))
            .collect();

        Self {
            rsi: rsi(&closes, RSI_PERIOD),
            stochastic: stochastic(series, STOCH_K_PERIOD, STOCH_D_PERIOD, STOCH_SMOOTH_K),
            emas,
            bollinger: bollinger_bands(&closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEV),
            volume_ma: sma(&series.volumes(), VOLUME_MA_PERIOD),
            pivot_highs: find_pivots(series, PivotKind::High, pivots::DEFAULT_WINDOW),
            pivot_lows: find_pivots(series, PivotKind::Low, pivots::DEFAULT_WINDOW),
        }
    }

    /// RSI at the last bar is above [`RSI_OVERBOUGHT`]
    pub fn last_rsi_overbought(&self) -> bool {
        matches!(self.rsi.last(), Some(Some(v)) if is_overbought(*v, RSI_OVERBOUGHT))
    }

    /// RSI at the last bar is below [`RSI_OVERSOLD`]
    pub fn last_rsi_oversold(&self) -> bool {
        matches!(self.rsi.last(), Some(Some(v)) if is_oversold(*v, RSI_OVERSOLD))
    }
}
