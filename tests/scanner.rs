//! Integration tests for the scanner and the scan service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chartscan::prelude::*;

const DAY: i64 = 86_400;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn series(closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PriceBar::new(i as i64 * DAY, c, c + 0.5, c - 0.5, c, 1_000.0))
        .collect();
    PriceSeries::new(bars).unwrap()
}

const DOUBLE_TOP: [f64; 16] = [
    10.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 20.0, 15.0, 12.0, 14.0, 19.0, 13.0, 12.0, 11.0, 10.0,
];

fn flat() -> PriceSeries {
    series(&[10.0; 16])
}

fn detector() -> ChartPatternDetector {
    DoubleTopDetector {
        tolerance: Ratio::new(0.05).unwrap(),
        min_separation: Period::new(4).unwrap(),
        trend_lookback: Period::new(3).unwrap(),
    }
    .into()
}

/// Symbols S0..S{n}; every even symbol carries a double top
fn universe(n: usize) -> (InMemorySource, Vec<String>) {
    let mut source = InMemorySource::new();
    let names: Vec<String> = (0..n).map(|i| format!("S{i}")).collect();
    for (i, name) in names.iter().enumerate() {
        let s = if i % 2 == 0 { series(&DOUBLE_TOP) } else { flat() };
        source.insert(name, Interval::Day1, s);
    }
    (source, names)
}

fn request(symbols: Vec<String>) -> ScanRequest {
    ScanRequest::new(symbols, Interval::Day1, DateRange::unbounded())
}

fn symbols_of(outcome: &ScanOutcome) -> Vec<String> {
    outcome.matches.iter().map(|m| m.symbol.clone()).collect()
}

/// Cancels the scan once it has announced `after` symbols
struct CancelAfter {
    token: CancellationToken,
    after: usize,
    seen: AtomicUsize,
}

impl ProgressSink for CancelAfter {
    fn report(&self, event: ScanProgress) {
        if let ScanProgress::Scanning(_) = event {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.token.cancel();
            }
        }
    }
}

/// Fails for one symbol, serves the rest from memory
struct FlakyProvider {
    inner: InMemorySource,
    broken: &'static str,
}

impl SeriesProvider for FlakyProvider {
    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range: &DateRange,
    ) -> std::result::Result<PriceSeries, DataError> {
        if symbol == self.broken {
            return Err(DataError::Source(format!("{symbol} unavailable")));
        }
        self.inner.fetch(symbol, interval, range)
    }
}

/// Panics while fetching one symbol
struct PanickingProvider {
    inner: InMemorySource,
    broken: &'static str,
}

impl SeriesProvider for PanickingProvider {
    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range: &DateRange,
    ) -> std::result::Result<PriceSeries, DataError> {
        if symbol == self.broken {
            panic!("feed for {symbol} is corrupt");
        }
        self.inner.fetch(symbol, interval, range)
    }
}

/// Sleeps before every fetch
struct SlowProvider {
    inner: InMemorySource,
    delay: Duration,
}

impl SeriesProvider for SlowProvider {
    fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range: &DateRange,
    ) -> std::result::Result<PriceSeries, DataError> {
        thread::sleep(self.delay);
        self.inner.fetch(symbol, interval, range)
    }
}

// ============================================================
// SCANNER
// ============================================================

#[test]
fn test_full_scan_reports_first_match_with_dates() {
    init_logger();
    let (source, names) = universe(4);
    let scanner = Scanner::new(&source).with_pacing(Duration::ZERO);
    let outcome = scanner.run(&request(names), &detector(), &CancellationToken::new(), &NoProgress);

    assert_eq!(symbols_of(&outcome), vec!["S0", "S2"]);
    assert!(!outcome.was_cancelled);
    assert_eq!(outcome.symbols_scanned, 4);
    assert_eq!(outcome.pattern, "Double Top");
    assert_eq!(
        outcome.matches[0].payload,
        MatchPayload::Chart {
            found: ChartMatch::DoubleTop(DoubleTopMatch {
                first_top_index: 7,
                pivot_low_index: 9,
                second_top_index: 11,
            }),
            timestamps: [7 * DAY, 9 * DAY, 11 * DAY],
        }
    );
}

#[test]
fn test_cancel_before_first_symbol() {
    init_logger();
    let (source, names) = universe(4);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = Scanner::new(&source).run(&request(names), &detector(), &cancel, &NoProgress);
    assert!(outcome.matches.is_empty());
    assert!(outcome.was_cancelled);
    assert_eq!(outcome.symbols_scanned, 0);
}

#[test]
fn test_cancel_mid_scan_yields_prefix() {
    init_logger();
    let (source, names) = universe(8);
    let scanner = Scanner::new(&source).with_pacing(Duration::ZERO);
    let full = scanner.run(
        &request(names.clone()),
        &detector(),
        &CancellationToken::new(),
        &NoProgress,
    );

    for after in 1..=7 {
        let token = CancellationToken::new();
        let sink = CancelAfter {
            token: token.clone(),
            after,
            seen: AtomicUsize::new(0),
        };
        let partial = scanner.run(&request(names.clone()), &detector(), &token, &sink);
        assert!(partial.was_cancelled);
        assert_eq!(partial.symbols_scanned, after);
        let got = symbols_of(&partial);
        let expected = symbols_of(&full);
        assert_eq!(got.len(), (after + 1) / 2);
        assert_eq!(got[..], expected[..got.len()]);
    }
}

#[test]
fn test_chunked_cancel_yields_prefix() {
    init_logger();
    let (source, names) = universe(10);
    let scanner = Scanner::new(&source)
        .with_pacing(Duration::ZERO)
        .with_symbol_parallelism(3);
    let token = CancellationToken::new();
    let sink = CancelAfter {
        token: token.clone(),
        after: 4,
        seen: AtomicUsize::new(0),
    };
    let outcome = scanner.run(&request(names), &detector(), &token, &sink);
    assert!(outcome.was_cancelled);
    assert_eq!(outcome.symbols_scanned, 4);
    assert_eq!(symbols_of(&outcome), vec!["S0", "S2"]);
}

#[test]
fn test_errors_are_absorbed() {
    init_logger();
    let (mut inner, mut names) = universe(4);
    let nan = PriceSeries::new(vec![PriceBar::new(0, 1.0, f64::NAN, 0.5, 1.0, 1.0)]).unwrap();
    inner.insert("NAN", Interval::Day1, nan);
    names.push("NAN".to_string());
    names.push("GONE".to_string());
    let provider = FlakyProvider {
        inner,
        broken: "GONE",
    };

    let outcome = Scanner::new(&provider)
        .with_pacing(Duration::ZERO)
        .run(&request(names), &detector(), &CancellationToken::new(), &NoProgress);

    assert_eq!(symbols_of(&outcome), vec!["S0", "S2"]);
    assert_eq!(outcome.errors.len(), 2);
    assert_eq!(outcome.errors[0].symbol, "NAN");
    assert!(matches!(outcome.errors[0].error, ScanFailure::Detector(_)));
    assert_eq!(outcome.errors[1].symbol, "GONE");
    assert!(matches!(outcome.errors[1].error, ScanFailure::Data(_)));
    assert_eq!(outcome.symbols_scanned, 6);
}

#[test]
fn test_panicking_symbol_is_contained() {
    init_logger();
    let (inner, names) = universe(5);
    let provider = PanickingProvider { inner, broken: "S1" };

    for parallelism in [1, 2] {
        let outcome = Scanner::new(&provider)
            .with_pacing(Duration::ZERO)
            .with_symbol_parallelism(parallelism)
            .run(&request(names.clone()), &detector(), &CancellationToken::new(), &NoProgress);

        assert_eq!(symbols_of(&outcome), vec!["S0", "S2", "S4"]);
        assert_eq!(outcome.symbols_scanned, 5);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].symbol, "S1");
        match &outcome.errors[0].error {
            ScanFailure::Panicked(msg) => assert!(msg.contains("S1 is corrupt")),
            other => panic!("unexpected failure {other:?}"),
        }
    }
}

#[test]
fn test_huge_separation_from_config_scans_cleanly() {
    init_logger();
    let (source, names) = universe(4);
    let config = ScanConfig::from_json(
        r#"{"pacing_ms": 0, "double_top": {"min_separation": 18446744073709551615}}"#,
    )
    .unwrap();
    let outcome = Scanner::from_config(&source, &config).run(
        &request(names),
        &config.chart_detector("Double Top"),
        &CancellationToken::new(),
        &NoProgress,
    );
    assert!(outcome.matches.is_empty());
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.symbols_scanned, 4);
}

#[test]
fn test_progress_order() {
    init_logger();
    let (source, names) = universe(2);
    let progress = RecordedProgress::new();
    Scanner::new(&source).with_pacing(Duration::ZERO).run(
        &request(names),
        &detector(),
        &CancellationToken::new(),
        &progress,
    );
    assert_eq!(
        progress.events(),
        vec![
            ScanProgress::Started { total: 2 },
            ScanProgress::Scanning("S0".into()),
            ScanProgress::Scanning("S1".into()),
            ScanProgress::Finished,
        ]
    );
}

#[test]
fn test_disconnected_progress_receiver_is_ignored() {
    init_logger();
    let (source, names) = universe(2);
    let (tx, rx) = mpsc::channel();
    drop(rx);
    let outcome = Scanner::new(&source).with_pacing(Duration::ZERO).run(
        &request(names),
        &detector(),
        &CancellationToken::new(),
        &tx,
    );
    assert_eq!(outcome.matches.len(), 1);
}

#[test]
fn test_candlestick_scan_by_name() {
    init_logger();
    let mut bars: Vec<PriceBar> = (0..8)
        .map(|i| {
            let base = 70.0 - i as f64;
            PriceBar::new(i * DAY, base, base + 1.0, base - 1.0, base - 0.5, 1.0)
        })
        .collect();
    bars.push(PriceBar::new(8 * DAY, 60.0, 61.0, 59.0, 59.5, 1.0));
    bars.push(PriceBar::new(9 * DAY, 59.0, 62.0, 58.0, 61.5, 1.0));
    let source = InMemorySource::new()
        .with_series("ENG", Interval::Day1, PriceSeries::new(bars).unwrap())
        .with_series("FLAT", Interval::Day1, flat());
    let config = ScanConfig {
        pacing_ms: 0,
        ..ScanConfig::default()
    };
    let scanner = Scanner::from_config(&source, &config);
    let req = request(vec!["FLAT".into(), "ENG".into()]);

    let bullish = scanner.run(
        &req,
        &config.candlestick_matcher("Bullish Engulfing"),
        &CancellationToken::new(),
        &NoProgress,
    );
    assert_eq!(symbols_of(&bullish), vec!["ENG"]);
    assert_eq!(
        bullish.matches[0].payload,
        MatchPayload::Candlestick {
            signal: 100,
            bar_index: 9,
            timestamp: 9 * DAY,
        }
    );

    let bearish = scanner.run(
        &req,
        &config.candlestick_matcher("Bearish Engulfing"),
        &CancellationToken::new(),
        &NoProgress,
    );
    assert!(bearish.matches.is_empty());
}

#[test]
fn test_unknown_pattern_scans_nothing() {
    init_logger();
    let (source, names) = universe(3);
    let outcome = Scanner::new(&source).run(
        &request(names),
        &ChartPatternDetector::by_name("Head and Shoulders"),
        &CancellationToken::new(),
        &NoProgress,
    );
    assert!(outcome.matches.is_empty());
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.symbols_scanned, 0);
}

#[test]
fn test_request_from_universe() {
    let universe = StaticUniverse::new(["B", "A", "B"]);
    let req = ScanRequest::from_universe(&universe, Interval::Week1, DateRange::unbounded()).unwrap();
    assert_eq!(req.symbols(), &["B".to_string(), "A".to_string()]);
    assert_eq!(req.interval, Interval::Week1);
}

// ============================================================
// SERVICE
// ============================================================

fn service(source: InMemorySource) -> ScanService<InMemorySource> {
    let config = ScanConfig {
        pacing_ms: 0,
        double_top: DoubleTopDetector {
            tolerance: Ratio::new(0.05).unwrap(),
            min_separation: Period::new(4).unwrap(),
            trend_lookback: Period::new(3).unwrap(),
        },
        ..ScanConfig::default()
    };
    ScanService::new(Arc::new(source), config).unwrap()
}

#[test]
fn test_service_delivers_outcome_and_progress() {
    init_logger();
    let (source, names) = universe(6);
    let svc = service(source);
    let handle = svc.submit_chart(request(names), "Double Top");
    // the worker drops its sender when the scan ends
    let progress: Vec<ScanProgress> = handle.progress().iter().collect();
    let outcome = handle.wait().unwrap();
    assert_eq!(symbols_of(&outcome), vec!["S0", "S2", "S4"]);
    assert_eq!(progress.first(), Some(&ScanProgress::Started { total: 6 }));
    assert_eq!(progress.last(), Some(&ScanProgress::Finished));
}

#[test]
fn test_concurrent_scans_have_independent_tokens() {
    init_logger();
    let (source, names) = universe(6);
    let svc = service(source);
    let first = svc.submit_chart(request(names.clone()), "Double Top");
    let second = svc.submit_chart(request(names), "Double Top");
    first.cancel();

    assert!(!second.token().is_cancelled());
    let outcome = second.wait().unwrap();
    assert!(!outcome.was_cancelled);
    assert_eq!(outcome.matches.len(), 3);

    let cancelled = first.wait().unwrap();
    let expected = ["S0", "S2", "S4"];
    let got = symbols_of(&cancelled);
    assert_eq!(got[..], expected[..got.len()]);
}

#[test]
fn test_service_rejects_invalid_config() {
    let config = ScanConfig {
        workers: 0,
        ..ScanConfig::default()
    };
    let result = ScanService::new(Arc::new(InMemorySource::new()), config);
    assert!(matches!(result, Err(ServiceError::Config(_))));
}

#[test]
fn test_service_unknown_candlestick_name() {
    init_logger();
    let (source, names) = universe(2);
    let svc = service(source);
    let outcome = svc
        .submit_candlestick(request(names), "Rising Three Methods")
        .wait()
        .unwrap();
    assert!(outcome.matches.is_empty());
    assert_eq!(outcome.symbols_scanned, 0);
}

#[test]
fn test_short_scan_is_not_held_behind_long_scan() {
    init_logger();
    let (inner, names) = universe(100);
    let provider = SlowProvider {
        inner,
        delay: Duration::from_millis(20),
    };
    let config = ScanConfig {
        workers: 2,
        symbol_parallelism: 2,
        pacing_ms: 0,
        ..ScanConfig::default()
    };
    let svc = ScanService::new(Arc::new(provider), config).unwrap();

    // about 100ms alone, against about 1s for the long scan
    let started = Instant::now();
    let short = svc.submit_chart(request(names[..10].to_vec()), "Double Top");
    thread::sleep(Duration::from_millis(5));
    let long = svc.submit_chart(request(names), "Double Top");

    let outcome = short.wait().unwrap();
    let short_took = started.elapsed();
    assert_eq!(outcome.symbols_scanned, 10);
    assert!(!outcome.was_cancelled);
    assert!(long.try_result().is_none());
    assert!(short_took < Duration::from_millis(700), "short scan took {short_took:?}");

    long.cancel();
    assert!(long.wait().unwrap().was_cancelled);
}

#[test]
fn test_service_applies_parameter_overrides() {
    init_logger();
    let (source, names) = universe(4);
    let svc = service(source);

    let overrides = HashMap::from([("min_separation", 30.0)]);
    let outcome = svc
        .submit_chart_with(request(names.clone()), "Double Top", &overrides)
        .unwrap()
        .wait()
        .unwrap();
    assert!(outcome.matches.is_empty());

    let unknown = HashMap::from([("neckline", 1.0)]);
    assert!(matches!(
        svc.submit_chart_with(request(names), "Double Top", &unknown),
        Err(ServiceError::Config(_))
    ));
}
