//! Event-loop lag measurement.
//!
//! [`LagMonitor`] runs a background task that sleeps for a fixed interval and
//! measures how late it wakes up. The overshoot, exponentially smoothed, is
//! the published lag. Anything that can answer "how far behind is the
//! runtime" implements [`LagSource`]; the overload gate only sees that trait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::OverloadConfig;
use crate::observability::metrics;

/// Sentinel stored while no sample is available.
const NO_SAMPLE: u64 = u64::MAX;

/// A continuously updated lag signal.
pub trait LagSource: Send + Sync + 'static {
    /// Latest lag, or `None` when the source has no measurement.
    fn current_lag(&self) -> Option<Duration>;
}

/// Callback invoked with the smoothed lag when it crosses the warn threshold.
pub type LagObserver = Arc<dyn Fn(Duration) + Send + Sync>;

fn load(slot: &AtomicU64) -> Option<Duration> {
    match slot.load(Ordering::Acquire) {
        NO_SAMPLE => None,
        micros => Some(Duration::from_micros(micros)),
    }
}

fn store(slot: &AtomicU64, lag: Option<Duration>) {
    let raw = lag.map_or(NO_SAMPLE, |d| {
        u64::try_from(d.as_micros()).unwrap_or(NO_SAMPLE - 1)
    });
    slot.store(raw, Ordering::Release);
}

/// A lag source whose value is set by hand.
#[derive(Debug)]
pub struct ManualLag {
    micros: AtomicU64,
}

impl ManualLag {
    /// A source that starts out unavailable.
    pub fn new() -> Self {
        Self {
            micros: AtomicU64::new(NO_SAMPLE),
        }
    }

    pub fn with_lag(lag: Duration) -> Self {
        let source = Self::new();
        source.set(lag);
        source
    }

    pub fn set(&self, lag: Duration) {
        store(&self.micros, Some(lag));
    }

    /// Mark the source unavailable.
    pub fn clear(&self) {
        store(&self.micros, None);
    }
}

impl Default for ManualLag {
    fn default() -> Self {
        Self::new()
    }
}

impl LagSource for ManualLag {
    fn current_lag(&self) -> Option<Duration> {
        load(&self.micros)
    }
}

/// Exponential smoothing with separate factors for rising and falling lag.
#[derive(Debug, Clone)]
pub struct LagSmoother {
    rise: f64,
    fall: f64,
    current_ms: f64,
}

impl LagSmoother {
    pub fn new(rise: f64, fall: f64) -> Self {
        Self {
            rise,
            fall,
            current_ms: 0.0,
        }
    }

    /// Fold a raw sample in and return the new smoothed value in milliseconds.
    pub fn observe(&mut self, raw_ms: f64) -> f64 {
        let raw_ms = raw_ms.max(0.0);
        let factor = if raw_ms > self.current_ms {
            self.rise
        } else {
            self.fall
        };
        self.current_ms = factor * raw_ms + (1.0 - factor) * self.current_ms;
        self.current_ms
    }

    pub fn current_ms(&self) -> f64 {
        self.current_ms
    }
}

struct Shared {
    lag_micros: AtomicU64,
    observers: RwLock<Vec<LagObserver>>,
}

/// Background lag sampler.
pub struct LagMonitor {
    shared: Arc<Shared>,
    interval: Duration,
    warn_lag: Duration,
    smoothing_rise: f64,
    smoothing_fall: f64,
}

impl LagMonitor {
    pub fn new(config: &OverloadConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                lag_micros: AtomicU64::new(NO_SAMPLE),
                observers: RwLock::new(Vec::new()),
            }),
            interval: config.check_interval(),
            warn_lag: config.warn_lag(),
            smoothing_rise: config.smoothing_rise,
            smoothing_fall: config.smoothing_fall,
        }
    }

    /// Register an observer for samples above the warn threshold.
    pub fn on_lag<F>(&self, observer: F)
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.shared
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    /// A cheap handle that reads the published lag.
    pub fn source(&self) -> Arc<dyn LagSource> {
        Arc::new(MonitorHandle {
            shared: self.shared.clone(),
        })
    }

    fn sampler(&self) -> Sampler {
        Sampler {
            shared: self.shared.clone(),
            smoother: LagSmoother::new(self.smoothing_rise, self.smoothing_fall),
            warn_lag: self.warn_lag,
        }
    }

    /// Spawn the sampling loop. It stops when `shutdown` fires or its sender
    /// is dropped, after which the source reports no sample.
    pub fn start(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let interval = self.interval;
        let mut sampler = self.sampler();

        tracing::debug!(
            interval_ms = interval.as_millis() as u64,
            warn_lag_ms = self.warn_lag.as_millis() as u64,
            "Lag monitor started"
        );

        tokio::spawn(async move {
            loop {
                let started = Instant::now();
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                sampler.record(started.elapsed().saturating_sub(interval));
            }

            store(&sampler.shared.lag_micros, None);
            tracing::debug!("Lag monitor stopped");
        })
    }
}

/// Per-task sampling state: folds raw overshoots into the published lag.
struct Sampler {
    shared: Arc<Shared>,
    smoother: LagSmoother,
    warn_lag: Duration,
}

impl Sampler {
    fn record(&mut self, raw: Duration) -> Duration {
        let lag_ms = self.smoother.observe(raw.as_secs_f64() * 1000.0);
        let lag = Duration::from_micros((lag_ms * 1000.0).round() as u64);

        store(&self.shared.lag_micros, Some(lag));
        metrics::record_lag(lag_ms);

        if lag > self.warn_lag {
            let observers = self
                .shared
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for observer in observers {
                observer(lag);
            }
        }
        lag
    }
}

impl LagSource for LagMonitor {
    fn current_lag(&self) -> Option<Duration> {
        load(&self.shared.lag_micros)
    }
}

struct MonitorHandle {
    shared: Arc<Shared>,
}

impl LagSource for MonitorHandle {
    fn current_lag(&self) -> Option<Duration> {
        load(&self.shared.lag_micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast_config(warn_lag_ms: u64) -> OverloadConfig {
        OverloadConfig {
            check_interval_ms: 10,
            warn_lag_ms,
            ..Default::default()
        }
    }

    #[test]
    fn manual_lag_starts_unavailable() {
        let source = ManualLag::new();
        assert_eq!(source.current_lag(), None);

        source.set(Duration::from_millis(600));
        assert_eq!(source.current_lag(), Some(Duration::from_millis(600)));

        source.clear();
        assert_eq!(source.current_lag(), None);
    }

    #[test]
    fn smoother_moves_a_third_of_the_way() {
        let mut smoother = LagSmoother::new(1.0 / 3.0, 1.0 / 3.0);
        let first = smoother.observe(90.0);
        assert!((first - 30.0).abs() < 1e-9);

        let second = smoother.observe(90.0);
        assert!((second - 50.0).abs() < 1e-9);

        let falling = smoother.observe(0.0);
        assert!(falling < second);
    }

    #[test]
    fn smoother_uses_separate_fall_factor() {
        let mut smoother = LagSmoother::new(1.0, 0.5);
        assert_eq!(smoother.observe(100.0), 100.0);
        assert_eq!(smoother.observe(0.0), 50.0);
        assert_eq!(smoother.observe(-5.0), 25.0);
    }

    /// Monitor without smoothing, so each raw sample is published as is.
    fn unsmoothed(warn_lag_ms: u64, max_lag_ms: u64) -> OverloadConfig {
        OverloadConfig {
            warn_lag_ms,
            max_lag_ms,
            smoothing_rise: 1.0,
            smoothing_fall: 1.0,
            ..Default::default()
        }
    }

    fn recording(monitor: &LagMonitor) -> Arc<Mutex<Vec<Duration>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        monitor.on_lag(move |lag| sink.lock().unwrap().push(lag));
        seen
    }

    #[test]
    fn observers_stay_silent_up_to_warn_threshold() {
        let monitor = LagMonitor::new(&unsmoothed(70, 70));
        let seen = recording(&monitor);
        let mut sampler = monitor.sampler();

        for raw_ms in [0, 35, 69, 70] {
            sampler.record(Duration::from_millis(raw_ms));
        }
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(monitor.current_lag(), Some(Duration::from_millis(70)));

        sampler.record(Duration::from_millis(71));
        assert_eq!(*seen.lock().unwrap(), [Duration::from_millis(71)]);
    }

    #[test]
    fn observers_see_smoothed_not_raw_lag() {
        let monitor = LagMonitor::new(&OverloadConfig {
            warn_lag_ms: 50,
            smoothing_rise: 1.0 / 3.0,
            smoothing_fall: 1.0 / 3.0,
            ..Default::default()
        });
        let seen = recording(&monitor);
        let mut sampler = monitor.sampler();

        // One 120ms spike smooths to 40ms, below the threshold.
        let lag = sampler.record(Duration::from_millis(120));
        assert!(lag <= Duration::from_millis(50));
        assert!(seen.lock().unwrap().is_empty());

        // A second one lifts the average to ~66ms.
        sampler.record(Duration::from_millis(120));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn warn_and_shed_thresholds_are_independent() {
        use crate::resilience::OverloadGate;

        // Warn early, shed late.
        let config = unsmoothed(40, 100);
        let monitor = LagMonitor::new(&config);
        let seen = recording(&monitor);
        let gate = OverloadGate::from_config(monitor.source(), &config);
        let mut sampler = monitor.sampler();

        sampler.record(Duration::from_millis(60));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(!gate.should_shed());

        sampler.record(Duration::from_millis(150));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(gate.should_shed());

        // Shed early, warn late.
        let config = unsmoothed(200, 50);
        let monitor = LagMonitor::new(&config);
        let seen = recording(&monitor);
        let gate = OverloadGate::from_config(monitor.source(), &config);
        let mut sampler = monitor.sampler();

        sampler.record(Duration::from_millis(100));
        assert!(gate.should_shed());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn monitor_reports_blocked_runtime() {
        let monitor = LagMonitor::new(&fast_config(20));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        monitor.on_lag(move |lag| sink.lock().unwrap().push(lag));

        let (tx, _) = broadcast::channel(1);
        let handle = monitor.start(tx.subscribe());
        let source = monitor.source();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(source.current_lag().is_some());

        // Starve the single-threaded runtime so the sampler wakes late.
        std::thread::sleep(Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(40)).await;

        let max_seen = seen.lock().unwrap().iter().copied().max();
        assert!(max_seen.is_some_and(|lag| lag > Duration::from_millis(20)));

        tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(source.current_lag(), None);
        assert_eq!(monitor.current_lag(), None);
    }
}
