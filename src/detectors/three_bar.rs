//! Three-candle recognizers (TA-Lib style)
//!
//! CDLMORNINGSTAR, CDLEVENINGSTAR, CDL3WHITESOLDIERS, CDL3BLACKCROWS, CDLSTICKSANDWICH

use super::helpers::{
  self, is_body_long, is_body_short, real_body_gap_down, real_body_gap_up, trailing_avg_body,
  trailing_avg_range, CANDLE_AVG_PERIOD, NEAR_AVG_PERIOD, SIGNAL,
};
use crate::{CandleRecognizer, OHLCVExt, Ratio, OHLCV};

impl_with_defaults!(
  MorningStarRecognizer,
  EveningStarRecognizer,
  ThreeWhiteSoldiersRecognizer,
  ThreeBlackCrowsRecognizer,
  StickSandwichRecognizer,
);

// ============================================================
// MORNING STAR / EVENING STAR
// ============================================================

/// CDLMORNINGSTAR - long black, short star gapping down, white closing into
/// the first body
#[derive(Debug, Clone, Copy)]
pub struct MorningStarRecognizer {
  pub body_long_factor: f64,
  pub body_short_factor: f64,
  pub penetration: Ratio,
}

impl Default for MorningStarRecognizer {
  fn default() -> Self {
    Self {
      body_long_factor: helpers::BODY_LONG_FACTOR,
      body_short_factor: helpers::BODY_SHORT_FACTOR,
      penetration: Ratio::new_const(0.3),
    }
  }
}

impl CandleRecognizer for MorningStarRecognizer {
  fn id(&self) -> &'static str {
    "CDL_MORNINGSTAR"
  }

  fn min_bars(&self) -> usize {
    3
  }

  fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
    if index < 2 || index >= bars.len() {
      return 0;
    }
    let (first, star, third) = (&bars[index - 2], &bars[index - 1], &bars[index]);

    if !first.is_black() || !third.is_white() {
      return 0;
    }
    let first_avg = trailing_avg_body(bars, index - 2, CANDLE_AVG_PERIOD);
    if !is_body_long(first.body(), first_avg, first.range(), self.body_long_factor) {
      return 0;
    }
    let star_avg = trailing_avg_body(bars, index - 1, CANDLE_AVG_PERIOD);
    if !is_body_short(star.body(), star_avg, star.range(), self.body_short_factor) {
      return 0;
    }
    if !real_body_gap_down(star, first) {
      return 0;
    }
    // third body must be larger than the short-body threshold
    if third.body() <= trailing_avg_body(bars, index, CANDLE_AVG_PERIOD) * self.body_short_factor {
      return 0;
    }
    if third.close() > first.close() + first.body() * self.penetration.get() {
      SIGNAL
    } else {
      0
    }
  }
}

/// CDLEVENINGSTAR - long white, short star gapping up, black closing into
/// the first body
#[derive(Debug, Clone, Copy)]
pub struct EveningStarRecognizer {
  pub body_long_factor: f64,
  pub body_short_factor: f64,
  pub penetration: Ratio,
}

impl Default for EveningStarRecognizer {
  fn default() -> Self {
    Self {
      body_long_factor: helpers::BODY_LONG_FACTOR,
      body_short_factor: helpers::BODY_SHORT_FACTOR,
      penetration: Ratio::new_const(0.3),
    }
  }
}

impl CandleRecognizer for EveningStarRecognizer {
  fn id(&self) -> &'static str {
    "CDL_EVENINGSTAR"
  }

  fn min_bars(&self) -> usize {
    3
  }

  fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
    if index < 2 || index >= bars.len() {
      return 0;
    }
    let (first, star, third) = (&bars[index - 2], &bars[index - 1], &bars[index]);

    if !first.is_white() || !third.is_black() {
      return 0;
    }
    let first_avg = trailing_avg_body(bars, index - 2, CANDLE_AVG_PERIOD);
    if !is_body_long(first.body(), first_avg, first.range(), self.body_long_factor) {
      return 0;
    }
    let star_avg = trailing_avg_body(bars, index - 1, CANDLE_AVG_PERIOD);
    if !is_body_short(star.body(), star_avg, star.range(), self.body_short_factor) {
      return 0;
    }
    if !real_body_gap_up(star, first) {
      return 0;
    }
    if third.body() <= trailing_avg_body(bars, index, CANDLE_AVG_PERIOD) * self.body_short_factor {
      return 0;
    }
    if third.close() < first.close() - first.body() * self.penetration.get() {
      -SIGNAL
    } else {
      0
    }
  }
}

// ============================================================
// THREE WHITE SOLDIERS / THREE BLACK CROWS
// ============================================================

/// CDL3WHITESOLDIERS - three rising white candles with short upper shadows,
/// each opening within or near the previous body
#[derive(Debug, Clone, Copy)]
pub struct ThreeWhiteSoldiersRecognizer {
  pub shadow_veryshort_factor: f64,
  pub near_factor: f64,
  pub far_factor: f64,
  pub body_short_factor: f64,
}

impl Default for ThreeWhiteSoldiersRecognizer {
  fn default() -> Self {
    Self {
      shadow_veryshort_factor: helpers::SHADOW_VERYSHORT_FACTOR,
      near_factor: helpers::NEAR_FACTOR,
      far_factor: helpers::FAR_FACTOR,
      body_short_factor: helpers::BODY_SHORT_FACTOR,
    }
  }
}

impl CandleRecognizer for ThreeWhiteSoldiersRecognizer {
  fn id(&self) -> &'static str {
    "CDL_3WHITESOLDIERS"
  }

  fn min_bars(&self) -> usize {
    3
  }

  fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
    if index < 2 || index >= bars.len() {
      return 0;
    }
    let soldiers = [index - 2, index - 1, index];

    for &k in &soldiers {
      let bar = &bars[k];
      if !bar.is_white() {
        return 0;
      }
      let very_short = trailing_avg_range(bars, k, CANDLE_AVG_PERIOD) * self.shadow_veryshort_factor;
      if bar.upper_shadow() >= very_short {
        return 0;
      }
    }

    for pair in soldiers.windows(2) {
      let (prev, curr) = (&bars[pair[0]], &bars[pair[1]]);
      let avg5 = trailing_avg_range(bars, pair[0], NEAR_AVG_PERIOD);
      if curr.close() <= prev.close() {
        return 0;
      }
      // opens inside or near the previous body
      if curr.open() <= prev.open() || curr.open() > prev.close() + avg5 * self.near_factor {
        return 0;
      }
      // bodies not shrinking far
      if curr.body() <= prev.body() - avg5 * self.far_factor {
        return 0;
      }
    }

    let third = &bars[index];
    if third.body() < trailing_avg_body(bars, index, CANDLE_AVG_PERIOD) * self.body_short_factor {
      return 0;
    }
    SIGNAL
  }
}

/// CDL3BLACKCROWS - a white candle followed by three falling black candles
/// with short lower shadows, each opening inside the previous body
#[derive(Debug, Clone, Copy)]
pub struct ThreeBlackCrowsRecognizer {
  pub shadow_veryshort_factor: f64,
}

impl Default for ThreeBlackCrowsRecognizer {
  fn default() -> Self {
    Self { shadow_veryshort_factor: helpers::SHADOW_VERYSHORT_FACTOR }
  }
}

impl CandleRecognizer for ThreeBlackCrowsRecognizer {
  fn id(&self) -> &'static str {
    "CDL_3BLACKCROWS"
  }

  fn min_bars(&self) -> usize {
    4
  }

  fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
    if index < 3 || index >= bars.len() {
      return 0;
    }
    let prior = &bars[index - 3];
    let crows = [index - 2, index - 1, index];

    if !prior.is_white() || prior.high() <= bars[index - 2].close() {
      return 0;
    }

    for &k in &crows {
      let bar = &bars[k];
      if !bar.is_black() {
        return 0;
      }
      let very_short = trailing_avg_range(bars, k, CANDLE_AVG_PERIOD) * self.shadow_veryshort_factor;
      if bar.lower_shadow() >= very_short {
        return 0;
      }
    }

    for pair in crows.windows(2) {
      let (prev, curr) = (&bars[pair[0]], &bars[pair[1]]);
      if curr.close() >= prev.close() {
        return 0;
      }
      if curr.open() >= prev.open() || curr.open() <= prev.close() {
        return 0;
      }
    }
    -SIGNAL
  }
}

// ============================================================
// STICK SANDWICH
// ============================================================

/// CDLSTICKSANDWICH - black, white gapping above the first close, black
/// closing level with the first
#[derive(Debug, Clone, Copy)]
pub struct StickSandwichRecognizer {
  pub equal_factor: f64,
}

impl Default for StickSandwichRecognizer {
  fn default() -> Self {
    Self { equal_factor: helpers::EQUAL_FACTOR }
  }
}

impl CandleRecognizer for StickSandwichRecognizer {
  fn id(&self) -> &'static str {
    "CDL_STICKSANDWICH"
  }

  fn min_bars(&self) -> usize {
    3
  }

  fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
    if index < 2 || index >= bars.len() {
      return 0;
    }
    let (first, second, third) = (&bars[index - 2], &bars[index - 1], &bars[index]);

    if !first.is_black() || !second.is_white() || !third.is_black() {
      return 0;
    }
    if second.low() <= first.close() {
      return 0;
    }
    let equal = trailing_avg_range(bars, index - 2, NEAR_AVG_PERIOD) * self.equal_factor;
    if (third.close() - first.close()).abs() <= equal {
      SIGNAL
    } else {
      0
    }
  }
}
