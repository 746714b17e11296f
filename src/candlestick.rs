//! Candlestick pattern matching over a trailing window.
//!
//! A [`CandlestickPattern`] names a pattern the way users pick it
//! ("Bullish Engulfing", "Hammer", ...), resolves to a [`Recognizer`] and a
//! polarity filter. [`CandlestickMatcher`] runs the recognizer across the
//! series and looks for an accepted signal in the last `lookback` bars.

use std::fmt;
use std::str::FromStr;

use crate::{detectors::*, CandleRecognizer, Direction, Period, PriceSeries, OHLCV};

/// Minimum series length for a candlestick match
pub const MIN_SERIES_BARS: usize = 10;

/// Default trailing window
pub const DEFAULT_LOOKBACK: Period = Period::new_const(10);

// ============================================================
// RECOGNIZER DISPATCH - generated via macro
// ============================================================

macro_rules! define_recognizers {
    (
        $(
            $variant:ident($recognizer:ty)
        ),* $(,)?
    ) => {
        /// All recognizers - enum dispatch over the concrete types
        #[derive(Debug, Clone, Copy)]
        pub enum Recognizer {
            $($variant($recognizer)),*
        }

        impl Recognizer {
            #[inline]
            pub fn id(&self) -> &'static str {
                match self {
                    $(Self::$variant(r) => CandleRecognizer::id(r)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(r) => CandleRecognizer::min_bars(r)),*
                }
            }

            #[inline]
            pub fn signal_at<T: OHLCV>(&self, bars: &[T], index: usize) -> i32 {
                match self {
                    $(Self::$variant(r) => CandleRecognizer::signal_at(r, bars, index)),*
                }
            }

            pub fn signals<T: OHLCV>(&self, bars: &[T]) -> Vec<i32> {
                match self {
                    $(Self::$variant(r) => CandleRecognizer::signals(r, bars)),*
                }
            }
        }
    };
}

define_recognizers! {
    Doji(DojiRecognizer),
    Hammer(HammerRecognizer),
    HangingMan(HangingManRecognizer),
    InvertedHammer(InvertedHammerRecognizer),
    ShootingStar(ShootingStarRecognizer),
    Engulfing(EngulfingRecognizer),
    Piercing(PiercingRecognizer),
    DarkCloudCover(DarkCloudCoverRecognizer),
    MorningStar(MorningStarRecognizer),
    EveningStar(EveningStarRecognizer),
    ThreeWhiteSoldiers(ThreeWhiteSoldiersRecognizer),
    ThreeBlackCrows(ThreeBlackCrowsRecognizer),
    StickSandwich(StickSandwichRecognizer),
}

// ============================================================
// PATTERN NAMES
// ============================================================

/// Candlestick patterns offered by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CandlestickPattern {
    Hammer,
    InvertedHammer,
    BullishEngulfing,
    BearishEngulfing,
    MorningStar,
    EveningStar,
    Doji,
    ShootingStar,
    HangingMan,
    PiercingLine,
    DarkCloudCover,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
    Sandwich,
}

impl CandlestickPattern {
    pub const ALL: [CandlestickPattern; 14] = [
        CandlestickPattern::Hammer,
        CandlestickPattern::InvertedHammer,
        CandlestickPattern::BullishEngulfing,
        CandlestickPattern::BearishEngulfing,
        CandlestickPattern::MorningStar,
        CandlestickPattern::EveningStar,
        CandlestickPattern::Doji,
        CandlestickPattern::ShootingStar,
        CandlestickPattern::HangingMan,
        CandlestickPattern::PiercingLine,
        CandlestickPattern::DarkCloudCover,
        CandlestickPattern::ThreeWhiteSoldiers,
        CandlestickPattern::ThreeBlackCrows,
        CandlestickPattern::Sandwich,
    ];

    /// Display name, e.g. "3 White Soldiers"
    pub fn name(self) -> &'static str {
        match self {
            Self::Hammer => "Hammer",
            Self::InvertedHammer => "Inverted Hammer",
            Self::BullishEngulfing => "Bullish Engulfing",
            Self::BearishEngulfing => "Bearish Engulfing",
            Self::MorningStar => "Morning Star",
            Self::EveningStar => "Evening Star",
            Self::Doji => "Doji",
            Self::ShootingStar => "Shooting Star",
            Self::HangingMan => "Hanging Man",
            Self::PiercingLine => "Piercing Line",
            Self::DarkCloudCover => "Dark Cloud Cover",
            Self::ThreeWhiteSoldiers => "3 White Soldiers",
            Self::ThreeBlackCrows => "3 Black Crows",
            Self::Sandwich => "Sandwich",
        }
    }

    /// Look a pattern up by display name. Unknown names give `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Signal sign this pattern accepts; `None` accepts any nonzero signal
    pub fn polarity(self) -> Option<Direction> {
        match self {
            Self::Hammer
            | Self::InvertedHammer
            | Self::BullishEngulfing
            | Self::MorningStar
            | Self::PiercingLine
            | Self::ThreeWhiteSoldiers
            | Self::Sandwich => Some(Direction::Bullish),
            Self::BearishEngulfing
            | Self::EveningStar
            | Self::ShootingStar
            | Self::HangingMan
            | Self::DarkCloudCover
            | Self::ThreeBlackCrows => Some(Direction::Bearish),
            Self::Doji => None,
        }
    }

    /// Whether `signal` counts as an occurrence of this pattern
    pub fn accepts(self, signal: i32) -> bool {
        match self.polarity() {
            Some(Direction::Bullish) => signal > 0,
            Some(Direction::Bearish) => signal < 0,
            _ => signal != 0,
        }
    }

    /// Recognizer with default thresholds. Both engulfing patterns share one.
    pub fn recognizer(self) -> Recognizer {
        match self {
            Self::Hammer => Recognizer::Hammer(HammerRecognizer::with_defaults()),
            Self::InvertedHammer => {
                Recognizer::InvertedHammer(InvertedHammerRecognizer::with_defaults())
            }
            Self::BullishEngulfing | Self::BearishEngulfing => {
                Recognizer::Engulfing(EngulfingRecognizer)
            }
            Self::MorningStar => Recognizer::MorningStar(MorningStarRecognizer::with_defaults()),
            Self::EveningStar => Recognizer::EveningStar(EveningStarRecognizer::with_defaults()),
            Self::Doji => Recognizer::Doji(DojiRecognizer::with_defaults()),
            Self::ShootingStar => {
                Recognizer::ShootingStar(ShootingStarRecognizer::with_defaults())
            }
            Self::HangingMan => Recognizer::HangingMan(HangingManRecognizer::with_defaults()),
            Self::PiercingLine => Recognizer::Piercing(PiercingRecognizer::with_defaults()),
            Self::DarkCloudCover => {
                Recognizer::DarkCloudCover(DarkCloudCoverRecognizer::with_defaults())
            }
            Self::ThreeWhiteSoldiers => {
                Recognizer::ThreeWhiteSoldiers(ThreeWhiteSoldiersRecognizer::with_defaults())
            }
            Self::ThreeBlackCrows => {
                Recognizer::ThreeBlackCrows(ThreeBlackCrowsRecognizer::with_defaults())
            }
            Self::Sandwich => Recognizer::StickSandwich(StickSandwichRecognizer::with_defaults()),
        }
    }
}

impl fmt::Display for CandlestickPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CandlestickPattern {
    type Err = crate::PatternError;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_name(s)
            .ok_or_else(|| crate::PatternError::InvalidConfig(format!("unknown candlestick pattern: {s}")))
    }
}

// ============================================================
// MATCHER
// ============================================================

/// Flags a candlestick pattern within the trailing `lookback` bars
#[derive(Debug, Clone, Copy)]
pub struct CandlestickMatcher {
    pattern: Option<CandlestickPattern>,
    recognizer: Option<Recognizer>,
    pub lookback: Period,
}

impl CandlestickMatcher {
    pub fn new(pattern: CandlestickPattern, lookback: Period) -> Self {
        Self {
            pattern: Some(pattern),
            recognizer: Some(pattern.recognizer()),
            lookback,
        }
    }

    /// Matcher for a display name. An unknown name builds a matcher that
    /// never matches.
    pub fn by_name(name: &str, lookback: Period) -> Self {
        match CandlestickPattern::from_name(name) {
            Some(pattern) => Self::new(pattern, lookback),
            None => Self {
                pattern: None,
                recognizer: None,
                lookback,
            },
        }
    }

    /// Replace the default recognizer thresholds
    pub fn with_recognizer(mut self, recognizer: Recognizer) -> Self {
        if self.pattern.is_some() {
            self.recognizer = Some(recognizer);
        }
        self
    }

    pub fn pattern(&self) -> Option<CandlestickPattern> {
        self.pattern
    }

    /// Most recent accepted signal in the trailing window as `(bar index, signal)`
    pub fn last_hit(&self, series: &PriceSeries) -> Option<(usize, i32)> {
        let (pattern, recognizer) = (self.pattern?, self.recognizer?);
        if series.len() < MIN_SERIES_BARS {
            return None;
        }
        let signals = recognizer.signals(series.bars());
        let start = signals.len().saturating_sub(self.lookback.get());
        signals[start..]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &s)| pattern.accepts(s))
            .map(|(offset, &s)| (start + offset, s))
    }

    pub fn matches(&self, series: &PriceSeries) -> bool {
        self.last_hit(series).is_some()
    }
}

/// Whether the named pattern fires within the last `lookback_bars` bars.
/// Unknown names and series shorter than ten bars never match.
pub fn match_pattern(series: &PriceSeries, name: &str, lookback_bars: Period) -> bool {
    CandlestickMatcher::by_name(name, lookback_bars).matches(series)
}
