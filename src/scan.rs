//! Multi-symbol scanning.
//!
//! [`Scanner::run`] walks a symbol list, fetches each series through a
//! [`SeriesProvider`] and runs one [`SeriesDetector`] on it. Per-symbol
//! failures are absorbed into [`ScanOutcome::errors`]. Cancellation is
//! polled once per symbol (or chunk) and never interrupts a detector.
//!
//! [`ScanService`] runs each scan on one of a fixed set of dedicated worker
//! threads and hands back a [`ScanHandle`] with the scan's own cancellation
//! token, progress stream and result channel.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rayon::prelude::*;

use crate::candlestick::CandlestickMatcher;
use crate::chart::{ChartMatch, ChartPatternDetector};
use crate::config::ScanConfig;
use crate::data::{dedup_symbols, DataError, DateRange, Interval, SeriesProvider, SymbolUniverse};
use crate::{PatternError, PriceSeries};

// ============================================================
// RESULTS AND ERRORS
// ============================================================

/// What a detector found in one series
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MatchPayload {
    /// Most recent accepted signal in the trailing window
    Candlestick {
        signal: i32,
        bar_index: usize,
        timestamp: i64,
    },
    /// First chart match in the series with the timestamps of its three bars
    Chart {
        found: ChartMatch,
        timestamps: [i64; 3],
    },
}

/// A positive match for one symbol
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanResult {
    pub symbol: String,
    pub pattern: String,
    pub payload: MatchPayload,
}

/// Why one symbol produced no result
#[derive(Debug, thiserror::Error)]
pub enum ScanFailure {
    #[error("data: {0}")]
    Data(#[from] DataError),

    #[error("detector: {0}")]
    Detector(#[from] PatternError),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Per-symbol failure absorbed by a scan
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: ScanFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to start scan worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid scan config: {0}")]
    Config(#[from] PatternError),

    #[error("scan worker disconnected before delivering a result")]
    Disconnected,
}

/// Final state of a scan. A cancelled scan carries its partial results.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub pattern: String,
    pub matches: Vec<ScanResult>,
    pub errors: Vec<ScanError>,
    pub was_cancelled: bool,
    pub symbols_scanned: usize,
}

// ============================================================
// DETECTORS
// ============================================================

/// Anything the scanner can run against one series
pub trait SeriesDetector: Send + Sync {
    /// Pattern name reported in results
    fn name(&self) -> &str;

    /// `false` for names nothing can detect; such scans finish without fetching
    fn is_recognized(&self) -> bool {
        true
    }

    fn evaluate(&self, series: &PriceSeries) -> crate::Result<Option<MatchPayload>>;
}

impl SeriesDetector for CandlestickMatcher {
    fn name(&self) -> &str {
        self.pattern().map_or("unrecognized", |p| p.name())
    }

    fn is_recognized(&self) -> bool {
        self.pattern().is_some()
    }

    fn evaluate(&self, series: &PriceSeries) -> crate::Result<Option<MatchPayload>> {
        Ok(self.last_hit(series).map(|(bar_index, signal)| MatchPayload::Candlestick {
            signal,
            bar_index,
            timestamp: series.timestamp_at(bar_index).unwrap_or_default(),
        }))
    }
}

impl SeriesDetector for ChartPatternDetector {
    fn name(&self) -> &str {
        ChartPatternDetector::name(self)
    }

    fn is_recognized(&self) -> bool {
        !matches!(self, ChartPatternDetector::Unrecognized(_))
    }

    fn evaluate(&self, series: &PriceSeries) -> crate::Result<Option<MatchPayload>> {
        let Some(found) = self.detect(series).into_iter().next() else {
            return Ok(None);
        };
        let mut timestamps = [0i64; 3];
        for (slot, index) in timestamps.iter_mut().zip(found.indices()) {
            *slot = series.timestamp_at(index).ok_or(PatternError::InsufficientData {
                need: index + 1,
                got: series.len(),
            })?;
        }
        Ok(Some(MatchPayload::Chart { found, timestamps }))
    }
}

// ============================================================
// CANCELLATION AND PROGRESS
// ============================================================

/// Cooperative cancellation flag shared between a scan and its requester
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanProgress {
    Started { total: usize },
    Scanning(String),
    Finished,
}

/// Receives progress events. Delivery is best effort and never fails a scan.
pub trait ProgressSink: Send {
    fn report(&self, event: ScanProgress);
}

impl ProgressSink for Sender<ScanProgress> {
    fn report(&self, event: ScanProgress) {
        // receiver gone: nobody is watching
        let _ = self.send(event);
    }
}

/// Discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ScanProgress) {}
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordedProgress(Mutex<Vec<ScanProgress>>);

impl RecordedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanProgress> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ProgressSink for RecordedProgress {
    fn report(&self, event: ScanProgress) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

// ============================================================
// REQUEST
// ============================================================

/// Symbols (ordered, first occurrence wins), interval and date range of a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    symbols: Vec<String>,
    pub interval: Interval,
    pub range: DateRange,
}

impl ScanRequest {
    pub fn new<I, S>(symbols: I, interval: Interval, range: DateRange) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: dedup_symbols(symbols),
            interval,
            range,
        }
    }

    pub fn from_universe(
        universe: &dyn SymbolUniverse,
        interval: Interval,
        range: DateRange,
    ) -> Result<Self, DataError> {
        Ok(Self::new(universe.list_symbols()?, interval, range))
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

// ============================================================
// SCANNER
// ============================================================

pub const DEFAULT_PACING: Duration = Duration::from_millis(10);

/// Runs one detector across the symbols of a request
#[derive(Debug)]
pub struct Scanner<'a, P: ?Sized> {
    provider: &'a P,
    pacing: Duration,
    symbol_parallelism: usize,
}

impl<'a, P: SeriesProvider + ?Sized> Scanner<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            pacing: DEFAULT_PACING,
            symbol_parallelism: 1,
        }
    }

    pub fn from_config(provider: &'a P, config: &ScanConfig) -> Self {
        Self::new(provider)
            .with_pacing(config.pacing())
            .with_symbol_parallelism(config.symbol_parallelism)
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Symbols evaluated together; values below 1 are treated as 1
    pub fn with_symbol_parallelism(mut self, n: usize) -> Self {
        self.symbol_parallelism = n.max(1);
        self
    }

    pub fn run<D>(
        &self,
        request: &ScanRequest,
        detector: &D,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> ScanOutcome
    where
        D: SeriesDetector + ?Sized,
    {
        let mut outcome = ScanOutcome {
            pattern: detector.name().to_string(),
            ..ScanOutcome::default()
        };

        if !detector.is_recognized() {
            log::warn!("unrecognized pattern {:?}: nothing to scan", detector.name());
            progress.report(ScanProgress::Started { total: 0 });
            progress.report(ScanProgress::Finished);
            return outcome;
        }

        let symbols = request.symbols();
        log::info!(
            "scan started: {} over {} symbols ({}, {} to {})",
            outcome.pattern,
            symbols.len(),
            request.interval,
            request.range.start(),
            request.range.end()
        );
        progress.report(ScanProgress::Started {
            total: symbols.len(),
        });

        if self.symbol_parallelism == 1 {
            self.run_sequential(request, detector, cancel, progress, &mut outcome);
        } else {
            self.run_chunked(request, detector, cancel, progress, &mut outcome);
        }

        progress.report(ScanProgress::Finished);
        log::info!(
            "scan finished: {} matches, {} errors, {}/{} symbols{}",
            outcome.matches.len(),
            outcome.errors.len(),
            outcome.symbols_scanned,
            symbols.len(),
            if outcome.was_cancelled { " (cancelled)" } else { "" }
        );
        outcome
    }

    fn run_sequential<D>(
        &self,
        request: &ScanRequest,
        detector: &D,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
        outcome: &mut ScanOutcome,
    ) where
        D: SeriesDetector + ?Sized,
    {
        for symbol in request.symbols() {
            if cancel.is_cancelled() {
                outcome.was_cancelled = true;
                return;
            }
            progress.report(ScanProgress::Scanning(symbol.clone()));
            let result = self.scan_symbol(symbol, request, detector);
            record(outcome, symbol, result);
            self.pace();
        }
    }

    /// Symbols in chunks of `symbol_parallelism`, evaluated with rayon.
    /// Results are appended in input order.
    fn run_chunked<D>(
        &self,
        request: &ScanRequest,
        detector: &D,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
        outcome: &mut ScanOutcome,
    ) where
        D: SeriesDetector + ?Sized,
    {
        for chunk in request.symbols().chunks(self.symbol_parallelism) {
            let mut active = Vec::with_capacity(chunk.len());
            for symbol in chunk {
                if cancel.is_cancelled() {
                    outcome.was_cancelled = true;
                    break;
                }
                progress.report(ScanProgress::Scanning(symbol.clone()));
                active.push(symbol);
            }

            let results: Vec<_> = active
                .par_iter()
                .map(|symbol| self.scan_symbol(symbol, request, detector))
                .collect();
            for (symbol, result) in active.into_iter().zip(results) {
                record(outcome, symbol, result);
            }

            if outcome.was_cancelled {
                return;
            }
            self.pace();
        }
    }

    /// One symbol's fetch and evaluation. A panic in either is contained
    /// here and reported as that symbol's failure.
    fn scan_symbol<D>(
        &self,
        symbol: &str,
        request: &ScanRequest,
        detector: &D,
    ) -> Result<Option<ScanResult>, ScanFailure>
    where
        D: SeriesDetector + ?Sized,
    {
        panic::catch_unwind(AssertUnwindSafe(|| self.evaluate_symbol(symbol, request, detector)))
            .unwrap_or_else(|payload| Err(ScanFailure::Panicked(panic_message(payload.as_ref()))))
    }

    fn evaluate_symbol<D>(
        &self,
        symbol: &str,
        request: &ScanRequest,
        detector: &D,
    ) -> Result<Option<ScanResult>, ScanFailure>
    where
        D: SeriesDetector + ?Sized,
    {
        let series = self.provider.fetch(symbol, request.interval, &request.range)?;
        if series.is_empty() {
            log::debug!("{symbol}: no data");
            return Ok(None);
        }
        series.validate()?;
        Ok(detector.evaluate(&series)?.map(|payload| ScanResult {
            symbol: symbol.to_string(),
            pattern: detector.name().to_string(),
            payload,
        }))
    }

    fn pace(&self) {
        if !self.pacing.is_zero() {
            std::thread::sleep(self.pacing);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn record(outcome: &mut ScanOutcome, symbol: &str, result: Result<Option<ScanResult>, ScanFailure>) {
    outcome.symbols_scanned += 1;
    match result {
        Ok(Some(found)) => {
            log::debug!("{symbol}: {} matched", found.pattern);
            outcome.matches.push(found);
        }
        Ok(None) => {}
        Err(error) => {
            log::warn!("error scanning {symbol}: {error}");
            outcome.errors.push(ScanError {
                symbol: symbol.to_string(),
                error,
            });
        }
    }
}

// ============================================================
// SERVICE
// ============================================================

/// A submitted scan. Owns its cancellation token and channels.
#[derive(Debug)]
pub struct ScanHandle {
    cancel: CancellationToken,
    progress: Receiver<ScanProgress>,
    result: Receiver<ScanOutcome>,
}

impl ScanHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn progress(&self) -> &Receiver<ScanProgress> {
        &self.progress
    }

    /// The outcome if the scan has finished
    pub fn try_result(&self) -> Option<ScanOutcome> {
        self.result.try_recv().ok()
    }

    /// Block until the scan delivers its outcome
    pub fn wait(self) -> Result<ScanOutcome, ServiceError> {
        self.result.recv().map_err(|_| ServiceError::Disconnected)
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs scans on `config.workers` dedicated threads. Each scan occupies one
/// worker from start to finish; queued scans wait for a free worker.
pub struct ScanService<P> {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    provider: Arc<P>,
    config: ScanConfig,
}

impl<P: SeriesProvider + 'static> ScanService<P> {
    pub fn new(provider: Arc<P>, config: ScanConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let (jobs, queue) = mpsc::channel::<Job>();
        let queue = Arc::new(Mutex::new(queue));

        let mut workers = Vec::with_capacity(config.workers);
        for i in 0..config.workers {
            let queue = Arc::clone(&queue);
            let worker = thread::Builder::new()
                .name(format!("chartscan-scan-{i}"))
                .spawn(move || worker_loop(&queue))?;
            workers.push(worker);
        }

        Ok(Self {
            jobs: Some(jobs),
            workers,
            provider,
            config,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Queue a scan. At most `workers` scans run at once; the rest wait.
    pub fn submit<D>(&self, request: ScanRequest, detector: D) -> ScanHandle
    where
        D: SeriesDetector + 'static,
    {
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();

        let token = cancel.clone();
        let provider = Arc::clone(&self.provider);
        let config = self.config.clone();
        let job: Job = Box::new(move || {
            let scanner = Scanner::from_config(provider.as_ref(), &config);
            let outcome = scanner.run(&request, &detector, &token, &progress_tx);
            if result_tx.send(outcome).is_err() {
                log::debug!("scan result dropped: handle released");
            }
        });

        if let Some(jobs) = &self.jobs {
            if jobs.send(job).is_err() {
                log::error!("scan workers are gone; scan not queued");
            }
        }

        ScanHandle {
            cancel,
            progress: progress_rx,
            result: result_rx,
        }
    }

    /// Chart pattern scan with `overrides` applied on top of the configured parameters
    pub fn submit_chart_with(
        &self,
        request: ScanRequest,
        name: &str,
        overrides: &HashMap<&str, f64>,
    ) -> Result<ScanHandle, ServiceError> {
        let detector = self.config.chart_detector_with(name, overrides)?;
        Ok(self.submit(request, detector))
    }

    /// Candlestick scan by display name with the configured lookback
    pub fn submit_candlestick(&self, request: ScanRequest, name: &str) -> ScanHandle {
        self.submit(request, self.config.candlestick_matcher(name))
    }

    /// Chart pattern scan by display name with the configured detector parameters
    pub fn submit_chart(&self, request: ScanRequest, name: &str) -> ScanHandle {
        self.submit(request, self.config.chart_detector(name))
    }
}

impl<P> Drop for ScanService<P> {
    fn drop(&mut self) {
        // closing the queue lets idle workers exit; running scans finish first
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("scan worker exited with a panic");
            }
        }
    }
}

fn worker_loop(queue: &Mutex<Receiver<Job>>) {
    loop {
        let job = {
            let queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.recv()
        };
        let Ok(job) = job else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("scan panicked outside symbol evaluation; its result is lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candlestick::DEFAULT_LOOKBACK;
    use crate::data::InMemorySource;
    use crate::PriceBar;

    fn rising(n: usize) -> PriceSeries {
        let bars = (0..n)
            .map(|i| {
                let c = 10.0 + i as f64;
                PriceBar::new(i as i64 * 86_400, c, c + 0.5, c - 0.5, c, 100.0)
            })
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    /// Matches every series longer than `min_len`
    struct LongerThan(usize);

    impl SeriesDetector for LongerThan {
        fn name(&self) -> &str {
            "longer-than"
        }

        fn evaluate(&self, series: &PriceSeries) -> crate::Result<Option<MatchPayload>> {
            Ok((series.len() > self.0).then(|| MatchPayload::Candlestick {
                signal: 100,
                bar_index: series.len() - 1,
                timestamp: 0,
            }))
        }
    }

    fn request(symbols: &[&str]) -> ScanRequest {
        ScanRequest::new(symbols.iter().copied(), Interval::Day1, DateRange::unbounded())
    }

    #[test]
    fn test_request_dedups_symbols() {
        let r = request(&["A", "B", "A", "C"]);
        assert_eq!(r.symbols(), &["A", "B", "C"]);
    }

    #[test]
    fn test_missing_series_is_not_an_error() {
        let source = InMemorySource::new().with_series("A", Interval::Day1, rising(5));
        let scanner = Scanner::new(&source).with_pacing(Duration::ZERO);
        let outcome = scanner.run(&request(&["A", "B"]), &LongerThan(2), &CancellationToken::new(), &NoProgress);
        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.symbols_scanned, 2);
        assert_eq!(outcome.pattern, "longer-than");
    }

    #[test]
    fn test_chunked_results_keep_input_order() {
        let mut source = InMemorySource::new();
        let names: Vec<String> = (0..9).map(|i| format!("S{i}")).collect();
        for name in &names {
            source.insert(name, Interval::Day1, rising(6));
        }
        let req = ScanRequest::new(names.clone(), Interval::Day1, DateRange::unbounded());
        let scanner = Scanner::new(&source)
            .with_pacing(Duration::ZERO)
            .with_symbol_parallelism(4);
        let outcome = scanner.run(&req, &LongerThan(2), &CancellationToken::new(), &NoProgress);
        let found: Vec<&str> = outcome.matches.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(found, names.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancelled_token_stops_before_first_symbol() {
        let source = InMemorySource::new().with_series("A", Interval::Day1, rising(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let progress = RecordedProgress::new();
        let outcome = Scanner::new(&source).run(&request(&["A"]), &LongerThan(0), &cancel, &progress);
        assert!(outcome.was_cancelled);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.symbols_scanned, 0);
        assert_eq!(
            progress.events(),
            vec![ScanProgress::Started { total: 1 }, ScanProgress::Finished]
        );
    }

    #[test]
    fn test_unrecognized_detector_fetches_nothing() {
        let source = InMemorySource::new().with_series("A", Interval::Day1, rising(30));
        let matcher = CandlestickMatcher::by_name("Abandoned Baby", DEFAULT_LOOKBACK);
        let outcome = Scanner::new(&source).run(&request(&["A"]), &matcher, &CancellationToken::new(), &NoProgress);
        assert!(outcome.matches.is_empty());
        assert!(!outcome.was_cancelled);
        assert_eq!(outcome.symbols_scanned, 0);
    }
}
