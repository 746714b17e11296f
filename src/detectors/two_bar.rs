//! Two-candle recognizers: Engulfing, Piercing Line, Dark Cloud Cover.

use super::helpers::{
    self, is_body_long, trailing_avg_body, CANDLE_AVG_PERIOD, SIGNAL, WEAK_SIGNAL,
};
use crate::{CandleRecognizer, OHLCVExt, Ratio, OHLCV};

impl_with_defaults!(EngulfingRecognizer, PiercingRecognizer, DarkCloudCoverRecognizer);

// ============================================================
// ENGULFING
// ============================================================

/// CDLENGULFING - second body engulfs the first, opposite colours.
///
/// Emits ±100 when both body edges are strictly engulfed and ±80 when one
/// edge is shared. The bullish and bearish engulfing patterns both read this
/// recognizer and differ only in the sign they accept.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngulfingRecognizer;

impl CandleRecognizer for EngulfingRecognizer {
    fn id(&self) -> &'static str {
        "CDL_ENGULFING"
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
        if index < 1 || index >= bars.len() {
            return 0;
        }
        let prev = &bars[index - 1];
        let curr = &bars[index];
        let strength = if curr.open() != prev.close() && curr.close() != prev.open() {
            SIGNAL
        } else {
            WEAK_SIGNAL
        };

        // white engulfs black; at most one edge may coincide
        if curr.is_white() && prev.is_black() {
            let case_a = curr.close() >= prev.open() && curr.open() < prev.close();
            let case_b = curr.close() > prev.open() && curr.open() <= prev.close();
            if case_a || case_b {
                return strength;
            }
        }

        if curr.is_black() && prev.is_white() {
            let case_a = curr.open() >= prev.close() && curr.close() < prev.open();
            let case_b = curr.open() > prev.close() && curr.close() <= prev.open();
            if case_a || case_b {
                return -strength;
            }
        }

        0
    }
}

// ============================================================
// PIERCING / DARK CLOUD
// ============================================================

/// CDLPIERCING - long white opens below the prior low and closes past the
/// midpoint of the prior long black body
#[derive(Debug, Clone, Copy)]
pub struct PiercingRecognizer {
    pub penetration: Ratio,
    pub body_long_factor: f64,
}

impl Default for PiercingRecognizer {
    fn default() -> Self {
        Self {
            penetration: Ratio::new_const(0.5),
            body_long_factor: helpers::BODY_LONG_FACTOR,
        }
    }
}

impl CandleRecognizer for PiercingRecognizer {
    fn id(&self) -> &'static str {
        "CDL_PIERCING"
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
        if index < 1 || index >= bars.len() {
            return 0;
        }
        let prev = &bars[index - 1];
        let curr = &bars[index];

        if !prev.is_black() || !curr.is_white() {
            return 0;
        }
        let prev_body = prev.body();
        let prev_avg = trailing_avg_body(bars, index - 1, CANDLE_AVG_PERIOD);
        let curr_avg = trailing_avg_body(bars, index, CANDLE_AVG_PERIOD);
        if !is_body_long(prev_body, prev_avg, prev.range(), self.body_long_factor)
            || !is_body_long(curr.body(), curr_avg, curr.range(), self.body_long_factor)
        {
            return 0;
        }

        let opens_below = curr.open() < prev.low();
        let inside_body = curr.close() < prev.open();
        let past_midpoint = curr.close() > prev.close() + prev_body * self.penetration.get();
        if opens_below && inside_body && past_midpoint {
            SIGNAL
        } else {
            0
        }
    }
}

/// CDLDARKCLOUDCOVER - black opens above the prior high and closes deep into
/// the prior long white body
#[derive(Debug, Clone, Copy)]
pub struct DarkCloudCoverRecognizer {
    pub penetration: Ratio,
    pub body_long_factor: f64,
}

impl Default for DarkCloudCoverRecognizer {
    fn default() -> Self {
        Self {
            penetration: Ratio::new_const(0.5),
            body_long_factor: helpers::BODY_LONG_FACTOR,
        }
    }
}

impl CandleRecognizer for DarkCloudCoverRecognizer {
    fn id(&self) -> &'static str {
        "CDL_DARKCLOUDCOVER"
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
        if index < 1 || index >= bars.len() {
            return 0;
        }
        let prev = &bars[index - 1];
        let curr = &bars[index];

        if !prev.is_white() || !curr.is_black() {
            return 0;
        }
        let prev_body = prev.body();
        let prev_avg = trailing_avg_body(bars, index - 1, CANDLE_AVG_PERIOD);
        if !is_body_long(prev_body, prev_avg, prev.range(), self.body_long_factor) {
            return 0;
        }

        let opens_above = curr.open() > prev.high();
        let inside_body = curr.close() > prev.open();
        let past_midpoint = curr.close() < prev.close() - prev_body * self.penetration.get();
        if opens_above && inside_body && past_midpoint {
            -SIGNAL
        } else {
            0
        }
    }
}
