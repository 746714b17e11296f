//! Candlestick recognizers
//!
//! Each recognizer maps a bar slice to a TA-Lib style signed signal per bar
//! (see [`crate::CandleRecognizer`]).
//!
//! - **Single-bar**: Doji, Hammer, Hanging Man, Inverted Hammer, Shooting Star
//! - **Two-bar**: Engulfing, Piercing Line, Dark Cloud Cover
//! - **Three-bar**: Morning/Evening Star, Three White Soldiers, Three Black Crows,
//!   Stick Sandwich

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple recognizer types.
macro_rules! impl_with_defaults {
  ($($recognizer:ty),* $(,)?) => {
    $(impl $recognizer {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

pub use helpers::{SIGNAL, WEAK_SIGNAL};
pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;
