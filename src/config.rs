//! Scan configuration.
//!
//! ```rust
//! use chartscan::config::ScanConfig;
//!
//! let config = ScanConfig::from_json(r#"{"pacing_ms": 0, "double_top": {"tolerance": 0.01}}"#).unwrap();
//! assert_eq!(config.workers, 2);
//! assert_eq!(config.double_top.tolerance.get(), 0.01);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use crate::candlestick::{self, CandlestickMatcher, CandlestickPattern, Recognizer};
use crate::chart::{ChartPattern, ChartPatternDetector, DoubleBottomDetector, DoubleTopDetector};
use crate::detectors::{
    DarkCloudCoverRecognizer, EveningStarRecognizer, MorningStarRecognizer, PiercingRecognizer,
};
use crate::params::ParameterizedDetector;
use crate::pivots::{self, find_pivots, PivotKind};
use crate::trend::{determine_regions, DowRule, TrendRegion};
use crate::{PatternError, Period, PriceSeries, Result};

/// Settings for the scan service and the detectors it builds
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Concurrent scans
    pub workers: usize,
    /// Symbols evaluated at once within one scan; 1 is sequential
    pub symbol_parallelism: usize,
    /// Delay after each symbol
    pub pacing_ms: u64,
    pub candlestick_lookback: Period,
    pub double_top: DoubleTopDetector,
    pub double_bottom: DoubleBottomDetector,
    /// Half-window for trend region pivots
    pub pivot_window: Period,
    pub dow_rule: DowRule,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            symbol_parallelism: 1,
            pacing_ms: 10,
            candlestick_lookback: candlestick::DEFAULT_LOOKBACK,
            double_top: DoubleTopDetector::default(),
            double_bottom: DoubleBottomDetector::default(),
            pivot_window: pivots::DEFAULT_WINDOW,
            dow_rule: DowRule::default(),
        }
    }
}

impl ScanConfig {
    /// Parse and validate a JSON config; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ScanConfig = serde_json::from_str(json)
            .map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PatternError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PatternError::InvalidConfig("workers must be > 0".into()));
        }
        if self.symbol_parallelism == 0 {
            return Err(PatternError::InvalidConfig(
                "symbol_parallelism must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Candlestick matcher for a display name using `candlestick_lookback`
    pub fn candlestick_matcher(&self, name: &str) -> CandlestickMatcher {
        CandlestickMatcher::by_name(name, self.candlestick_lookback)
    }

    /// Chart detector for a display name using the configured parameters
    pub fn chart_detector(&self, name: &str) -> ChartPatternDetector {
        match ChartPattern::from_name(name) {
            Some(ChartPattern::DoubleTop) => self.double_top.into(),
            Some(ChartPattern::DoubleBottom) => self.double_bottom.into(),
            None => ChartPatternDetector::Unrecognized(name.to_string()),
        }
    }

    /// Chart detector with `overrides` applied on top of the configured
    /// parameters. Unknown names give an unrecognized detector as in
    /// [`chart_detector`](Self::chart_detector).
    pub fn chart_detector_with(
        &self,
        name: &str,
        overrides: &HashMap<&str, f64>,
    ) -> Result<ChartPatternDetector> {
        Ok(match ChartPattern::from_name(name) {
            Some(ChartPattern::DoubleTop) => self.double_top.rebuild(overrides)?.into(),
            Some(ChartPattern::DoubleBottom) => self.double_bottom.rebuild(overrides)?.into(),
            None => ChartPatternDetector::Unrecognized(name.to_string()),
        })
    }

    /// One chart detector per grid value of `param`
    pub fn chart_sweep(&self, name: &str, param: &str) -> Result<Vec<ChartPatternDetector>> {
        match ChartPattern::from_name(name) {
            Some(ChartPattern::DoubleTop) => {
                Ok(self.double_top.sweep(param)?.into_iter().map(Into::into).collect())
            }
            Some(ChartPattern::DoubleBottom) => {
                Ok(self.double_bottom.sweep(param)?.into_iter().map(Into::into).collect())
            }
            None => Err(PatternError::InvalidConfig(format!("unknown chart pattern: {name}"))),
        }
    }

    /// Candlestick matcher with recognizer `overrides` (the penetration of
    /// Piercing Line, Dark Cloud Cover, Morning Star and Evening Star).
    /// Overrides for a pattern without parameters are rejected.
    pub fn candlestick_matcher_with(
        &self,
        name: &str,
        overrides: &HashMap<&str, f64>,
    ) -> Result<CandlestickMatcher> {
        let matcher = self.candlestick_matcher(name);
        if overrides.is_empty() {
            return Ok(matcher);
        }
        let recognizer = match CandlestickPattern::from_name(name) {
            Some(CandlestickPattern::PiercingLine) => {
                Recognizer::Piercing(PiercingRecognizer::with_params(overrides)?)
            }
            Some(CandlestickPattern::DarkCloudCover) => {
                Recognizer::DarkCloudCover(DarkCloudCoverRecognizer::with_params(overrides)?)
            }
            Some(CandlestickPattern::MorningStar) => {
                Recognizer::MorningStar(MorningStarRecognizer::with_params(overrides)?)
            }
            Some(CandlestickPattern::EveningStar) => {
                Recognizer::EveningStar(EveningStarRecognizer::with_params(overrides)?)
            }
            _ => {
                return Err(PatternError::InvalidConfig(format!(
                    "{name} takes no parameters"
                )))
            }
        };
        Ok(matcher.with_recognizer(recognizer))
    }

    /// Pivots on highs and lows with `pivot_window`, labelled with `dow_rule`
    pub fn trend_regions(&self, series: &PriceSeries) -> Vec<TrendRegion> {
        let highs = find_pivots(series, PivotKind::High, self.pivot_window);
        let lows = find_pivots(series, PivotKind::Low, self.pivot_window);
        determine_regions(series, &highs, &lows, self.dow_rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.symbol_parallelism, 1);
        assert_eq!(config.pacing(), Duration::from_millis(10));
        assert_eq!(config.candlestick_lookback.get(), 10);
        assert_eq!(config.pivot_window.get(), 3);
        assert_eq!(config.dow_rule, DowRule::SameKind);
        assert_eq!(config.double_top.min_separation.get(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(ScanConfig::from_json("{}").unwrap(), ScanConfig::default());
    }

    #[test]
    fn test_round_trip() {
        let mut config = ScanConfig::default();
        config.symbol_parallelism = 4;
        config.dow_rule = DowRule::CrossConfirmed;
        let json = config.to_json().unwrap();
        assert_eq!(ScanConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_named_detectors_use_config() {
        let config = ScanConfig::from_json(r#"{"double_top": {"min_separation": 5}}"#).unwrap();
        match config.chart_detector("Double Top") {
            ChartPatternDetector::DoubleTop(d) => assert_eq!(d.min_separation.get(), 5),
            other => panic!("unexpected detector {other:?}"),
        }
        assert!(matches!(
            config.chart_detector("Flag and Pole"),
            ChartPatternDetector::Unrecognized(_)
        ));
        assert_eq!(config.candlestick_matcher("Hammer").lookback.get(), 10);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ScanConfig::from_json(r#"{"workers": 0}"#).is_err());
        assert!(ScanConfig::from_json(r#"{"symbol_parallelism": 0}"#).is_err());
        assert!(ScanConfig::from_json(r#"{"pivot_window": 0}"#).is_err());
        assert!(ScanConfig::from_json(r#"{"double_top": {"tolerance": 1.5}}"#).is_err());
        assert!(matches!(
            ScanConfig::from_json("not json"),
            Err(PatternError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_chart_detector_with_overrides() {
        let config = ScanConfig::from_json(r#"{"double_top": {"min_separation": 5}}"#).unwrap();
        let overrides = HashMap::from([("tolerance", 0.02)]);
        match config.chart_detector_with("Double Top", &overrides).unwrap() {
            ChartPatternDetector::DoubleTop(d) => {
                assert_eq!(d.min_separation.get(), 5);
                assert!((d.tolerance.get() - 0.02).abs() < 1e-12);
            }
            other => panic!("unexpected detector {other:?}"),
        }
        let bad = HashMap::from([("window", 3.0)]);
        assert!(config.chart_detector_with("Double Bottom", &bad).is_err());
        assert!(matches!(
            config.chart_detector_with("Flag and Pole", &overrides).unwrap(),
            ChartPatternDetector::Unrecognized(_)
        ));
    }

    #[test]
    fn test_chart_sweep() {
        let config = ScanConfig::default();
        let sweep = config.chart_sweep("Double Top", "min_separation").unwrap();
        assert_eq!(sweep.len(), 29);
        assert!(config.chart_sweep("Head and Shoulders", "tolerance").is_err());
    }

    #[test]
    fn test_candlestick_matcher_with_penetration() {
        let config = ScanConfig::default();
        let overrides = HashMap::from([("penetration", 0.4)]);
        let matcher = config.candlestick_matcher_with("Morning Star", &overrides).unwrap();
        assert_eq!(matcher.pattern(), Some(CandlestickPattern::MorningStar));
        assert!(config.candlestick_matcher_with("Hammer", &overrides).is_err());
        assert!(config.candlestick_matcher_with("Hammer", &HashMap::new()).is_ok());
        let too_deep = HashMap::from([("penetration", 0.95)]);
        assert!(config.candlestick_matcher_with("Piercing Line", &too_deep).is_err());
    }

    #[test]
    fn test_trend_regions_use_pivot_window() {
        let bars = [10.0, 11.0, 12.0, 15.0, 12.0, 11.0, 9.0, 11.0, 12.0, 13.0]
            .iter()
            .enumerate()
            .map(|(i, &c)| crate::PriceBar::new(i as i64, c, c + 0.5, c - 0.5, c, 1.0))
            .collect();
        let series = PriceSeries::new(bars).unwrap();

        let config = ScanConfig::from_json(r#"{"dow_rule": "cross_confirmed"}"#).unwrap();
        assert_eq!(config.dow_rule, DowRule::CrossConfirmed);
        let regions = config.trend_regions(&series);
        let starts: Vec<usize> = regions.iter().map(|r| r.start_index).collect();
        assert_eq!(starts, vec![3, 6]);
        assert_eq!(regions[1].end_index, 9);

        // neither pivot has four bars on both sides
        let wide = ScanConfig::from_json(r#"{"pivot_window": 4}"#).unwrap();
        assert!(wide.trend_regions(&series).is_empty());
    }
}
