//! Single-candle recognizers: Doji and the hammer family.
//!
//! Hammer-family shapes also look at the previous bar for position
//! (TA-Lib CDLHAMMER, CDLHANGINGMAN, CDLINVERTEDHAMMER, CDLSHOOTINGSTAR).

#![allow(clippy::collapsible_if)]

use super::helpers::{
    self, is_body_short, is_doji, is_shadow_long, is_shadow_very_short, real_body_gap_down,
    real_body_gap_up, trailing_avg_body, trailing_avg_range, CANDLE_AVG_PERIOD, NEAR_AVG_PERIOD,
    SIGNAL,
};
use crate::{CandleRecognizer, OHLCVExt, OHLCV};

impl_with_defaults!(
    DojiRecognizer,
    HammerRecognizer,
    HangingManRecognizer,
    InvertedHammerRecognizer,
    ShootingStarRecognizer,
);

/// Small body with short upper shadow and long lower shadow.
fn is_hammer_shape<T: OHLCV>(bars: &[T], index: usize, body_short: f64, veryshort: f64) -> bool {
    let bar = &bars[index];
    let body = bar.body();
    let range = bar.range();
    is_body_short(body, trailing_avg_body(bars, index, CANDLE_AVG_PERIOD), range, body_short)
        && is_shadow_long(bar.lower_shadow(), body)
        && is_shadow_very_short(
            bar.upper_shadow(),
            trailing_avg_range(bars, index, CANDLE_AVG_PERIOD),
            range,
            veryshort,
        )
}

/// Small body with long upper shadow and short lower shadow.
fn is_star_shape<T: OHLCV>(bars: &[T], index: usize, body_short: f64, veryshort: f64) -> bool {
    let bar = &bars[index];
    let body = bar.body();
    let range = bar.range();
    is_body_short(body, trailing_avg_body(bars, index, CANDLE_AVG_PERIOD), range, body_short)
        && is_shadow_long(bar.upper_shadow(), body)
        && is_shadow_very_short(
            bar.lower_shadow(),
            trailing_avg_range(bars, index, CANDLE_AVG_PERIOD),
            range,
            veryshort,
        )
}

// ============================================================
// DOJI
// ============================================================

/// CDLDOJI - open and close (nearly) equal
#[derive(Debug, Clone, Copy)]
pub struct DojiRecognizer {
    pub doji_factor: f64,
}

impl Default for DojiRecognizer {
    fn default() -> Self {
        Self {
            doji_factor: helpers::DOJI_FACTOR,
        }
    }
}

impl CandleRecognizer for DojiRecognizer {
    fn id(&self) -> &'static str {
        "CDL_DOJI"
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
        let Some(bar) = bars.get(index) else {
            return 0;
        };
        let avg_range = trailing_avg_range(bars, index, CANDLE_AVG_PERIOD);
        if is_doji(bar.body(), avg_range, bar.range(), self.doji_factor) {
            SIGNAL
        } else {
            0
        }
    }
}

// ============================================================
// HAMMER FAMILY
// ============================================================

/// CDLHAMMER - hammer shape with its body at or below the prior low
#[derive(Debug, Clone, Copy)]
pub struct HammerRecognizer {
    pub body_short_factor: f64,
    pub shadow_veryshort_factor: f64,
    pub near_factor: f64,
}

impl Default for HammerRecognizer {
    fn default() -> Self {
        Self {
            body_short_factor: helpers::BODY_SHORT_FACTOR,
            shadow_veryshort_factor: helpers::SHADOW_VERYSHORT_FACTOR,
            near_factor: helpers::NEAR_FACTOR,
        }
    }
}

impl CandleRecognizer for HammerRecognizer {
    fn id(&self) -> &'static str {
        "CDL_HAMMER"
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
        if index < 1 || index >= bars.len() {
            return 0;
        }
        if !is_hammer_shape(bars, index, self.body_short_factor, self.shadow_veryshort_factor) {
            return 0;
        }
        let near = trailing_avg_range(bars, index - 1, NEAR_AVG_PERIOD) * self.near_factor;
        if bars[index].body_bottom() <= bars[index - 1].low() + near {
            SIGNAL
        } else {
            0
        }
    }
}

/// CDLHANGINGMAN - hammer shape with its body at or above the prior high
#[derive(Debug, Clone, Copy)]
pub struct HangingManRecognizer {
    pub body_short_factor: f64,
    pub shadow_veryshort_factor: f64,
    pub near_factor: f64,
}

impl Default for HangingManRecognizer {
    fn default() -> Self {
        Self {
            body_short_factor: helpers::BODY_SHORT_FACTOR,
            shadow_veryshort_factor: helpers::SHADOW_VERYSHORT_FACTOR,
            near_factor: helpers::NEAR_FACTOR,
        }
    }
}

impl CandleRecognizer for HangingManRecognizer {
    fn id(&self) -> &'static str {
        "CDL_HANGINGMAN"
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
        if index < 1 || index >= bars.len() {
            return 0;
        }
        if !is_hammer_shape(bars, index, self.body_short_factor, self.shadow_veryshort_factor) {
            return 0;
        }
        let near = trailing_avg_range(bars, index - 1, NEAR_AVG_PERIOD) * self.near_factor;
        if bars[index].body_bottom() >= bars[index - 1].high() - near {
            -SIGNAL
        } else {
            0
        }
    }
}

/// CDLINVERTEDHAMMER - star shape gapping down from the prior body
#[derive(Debug, Clone, Copy)]
pub struct InvertedHammerRecognizer {
    pub body_short_factor: f64,
    pub shadow_veryshort_factor: f64,
}

impl Default for InvertedHammerRecognizer {
    fn default() -> Self {
        Self {
            body_short_factor: helpers::BODY_SHORT_FACTOR,
            shadow_veryshort_factor: helpers::SHADOW_VERYSHORT_FACTOR,
        }
    }
}

impl CandleRecognizer for InvertedHammerRecognizer {
    fn id(&self) -> &'static str {
        "CDL_INVERTEDHAMMER"
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
        if index < 1 || index >= bars.len() {
            return 0;
        }
        if !real_body_gap_down(&bars[index], &bars[index - 1]) {
            return 0;
        }
        if is_star_shape(bars, index, self.body_short_factor, self.shadow_veryshort_factor) {
            SIGNAL
        } else {
            0
        }
    }
}

/// CDLSHOOTINGSTAR - star shape gapping up from the prior body
#[derive(Debug, Clone, Copy)]
pub struct ShootingStarRecognizer {
    pub body_short_factor: f64,
    pub shadow_veryshort_factor: f64,
}

impl Default for ShootingStarRecognizer {
    fn default() -> Self {
        Self {
            body_short_factor: helpers::BODY_SHORT_FACTOR,
            shadow_veryshort_factor: helpers::SHADOW_VERYSHORT_FACTOR,
        }
    }
}

impl CandleRecognizer for ShootingStarRecognizer {
    fn id(&self) -> &'static str {
        "CDL_SHOOTINGSTAR"
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
        if index < 1 || index >= bars.len() {
            return 0;
        }
        if !real_body_gap_up(&bars[index], &bars[index - 1]) {
            return 0;
        }
        if is_star_shape(bars, index, self.body_short_factor, self.shadow_veryshort_factor) {
            -SIGNAL
        } else {
            0
        }
    }
}
