use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::error::CallError;
use super::metrics::{CircuitSnapshot, Outcome, RollingWindow};
use crate::config::Settings;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_ERROR_PERCENT_THRESHOLD: u32 = 50;
pub const DEFAULT_REQUEST_VOLUME_THRESHOLD: u64 = 20;
pub const DEFAULT_SLEEP_WINDOW: Duration = Duration::from_millis(5000);
pub const DEFAULT_ROLLING_WINDOW: Duration = Duration::from_secs(10);
const ROLLING_BUCKETS: usize = 10;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls are admitted and their failures counted
    Closed,
    /// Calls are rejected immediately
    Open,
    /// A single probe call is admitted to test recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(label)
    }
}

/// Per-dependency circuit configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Hard deadline for one admitted call, retries included
    pub timeout: Duration,
    /// Size of the circuit's pool; calls beyond it are rejected, never queued
    pub max_concurrent_requests: usize,
    /// Error rate (0-100) at or above which the circuit opens
    pub error_percent_threshold: u32,
    /// Minimum requests in the rolling window before the error rate is evaluated
    pub request_volume_threshold: u64,
    /// How long the circuit stays open before a probe is allowed
    pub sleep_window: Duration,
    /// Retention of the statistics window
    pub rolling_window: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            error_percent_threshold: DEFAULT_ERROR_PERCENT_THRESHOLD,
            request_volume_threshold: DEFAULT_REQUEST_VOLUME_THRESHOLD,
            sleep_window: DEFAULT_SLEEP_WINDOW,
            rolling_window: DEFAULT_ROLLING_WINDOW,
        }
    }
}

impl CircuitConfig {
    /// Resolve the configuration of circuit `name` from `circuit.<name>.<prop>` keys,
    /// falling back to the defaults for anything unset.
    pub fn from_settings(name: &str, settings: &Settings) -> Self {
        let defaults = Self::default();
        let key = |prop: &str| format!("circuit.{}.{}", name, prop);

        Self {
            timeout: settings
                .get_u64(&key("timeout_ms"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            max_concurrent_requests: settings
                .get_u64(&key("max_concurrent_requests"))
                .map(|n| (n as usize).max(1))
                .unwrap_or(defaults.max_concurrent_requests),
            error_percent_threshold: settings
                .get_u64(&key("error_percent_threshold"))
                .map(|p| p.min(100) as u32)
                .unwrap_or(defaults.error_percent_threshold),
            request_volume_threshold: settings
                .get_u64(&key("request_volume_threshold"))
                .unwrap_or(defaults.request_volume_threshold),
            sleep_window: settings
                .get_u64(&key("sleep_window_ms"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.sleep_window),
            rolling_window: settings
                .get_u64(&key("rolling_window_ms"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.rolling_window),
        }
    }
}

/// Everything guarded by the circuit's single lock
struct Inner {
    config: CircuitConfig,
    state: CircuitState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    window: RollingWindow,
    pool: Arc<Semaphore>,
    /// Permits still to be retired after a shrink; they were held when the pool was resized
    pool_debt: usize,
}

impl Inner {
    fn new(mut config: CircuitConfig) -> Self {
        config.max_concurrent_requests = config.max_concurrent_requests.max(1);
        Self {
            window: RollingWindow::new(config.rolling_window, ROLLING_BUCKETS),
            pool: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            pool_debt: 0,
            config,
            state: CircuitState::Closed,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    /// Apply pending time-driven transitions: Open -> HalfOpen and Closed -> Open
    fn sync(&mut self, name: &str, now: Instant) {
        self.refresh(name, now);
        self.evaluate(name, now);
    }

    /// Grow or shrink the pool in place so permits held across a resize keep counting
    fn resize_pool(&mut self, size: usize) {
        let current = self.config.max_concurrent_requests;
        if size > current {
            let grow = size - current;
            let repaid = grow.min(self.pool_debt);
            self.pool_debt -= repaid;
            self.pool.add_permits(grow - repaid);
        } else if size < current {
            self.pool_debt += current - size;
            self.settle_pool();
        }
    }

    fn settle_pool(&mut self) {
        if self.pool_debt > 0 {
            let forgotten = self.pool.forget_permits(self.pool_debt);
            self.pool_debt -= forgotten;
        }
    }

    /// Open -> HalfOpen once the sleep window has elapsed
    fn refresh(&mut self, name: &str, now: Instant) {
        if self.state != CircuitState::Open {
            return;
        }
        let elapsed = self
            .opened_at
            .map(|opened| now.saturating_duration_since(opened))
            .unwrap_or(Duration::MAX);
        if elapsed >= self.config.sleep_window {
            debug!(circuit = %name, "Circuit breaker transitioning from Open to HalfOpen");
            self.state = CircuitState::HalfOpen;
            self.probe_in_flight = false;
        }
    }

    /// Closed -> Open when both the volume and the error thresholds are reached
    fn evaluate(&mut self, name: &str, now: Instant) {
        if self.state != CircuitState::Closed {
            return;
        }
        let totals = self.window.totals(now);
        let requests = totals.request_count();
        if requests == 0 || requests < self.config.request_volume_threshold {
            return;
        }
        if totals.error_count() * 100 >= u64::from(self.config.error_percent_threshold) * requests {
            warn!(
                circuit = %name,
                errors = totals.error_count(),
                requests,
                "Circuit breaker transitioning from Closed to Open"
            );
            self.trip(now);
        }
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.probe_in_flight = false;
        self.window.clear();
    }
}

/// One named circuit: state machine, rolling statistics and concurrency pool
pub struct CircuitBreaker {
    name: String,
    inner: Mutex<Inner>,
}

/// Admission ticket for one call. Holds a slot of the circuit's pool until finished or dropped.
pub struct CallPermit<'a> {
    circuit: &'a CircuitBreaker,
    probe: bool,
    timeout: Duration,
    finished: bool,
    _slot: OwnedSemaphorePermit,
}

impl CallPermit<'_> {
    /// True when this call is the HalfOpen recovery probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record the call's outcome in the circuit
    pub fn finish(mut self, outcome: Outcome) {
        self.finished = true;
        self.circuit.on_outcome(self.probe, outcome, Instant::now());
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        // Caller gave up before an outcome: let the next call probe instead
        if !self.finished && self.probe {
            self.circuit.inner.lock().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::new(config)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitConfig {
        self.inner.lock().config.clone()
    }

    /// Replace the configuration. Statistics and state survive; the pool is resized in place,
    /// so calls admitted before the change still occupy their slots.
    pub fn reconfigure(&self, mut config: CircuitConfig) {
        config.max_concurrent_requests = config.max_concurrent_requests.max(1);
        let mut inner = self.inner.lock();
        inner.resize_pool(config.max_concurrent_requests);
        if config.rolling_window != inner.config.rolling_window {
            inner.window = RollingWindow::new(config.rolling_window, ROLLING_BUCKETS);
        }
        inner.config = config;
        inner.evaluate(&self.name, Instant::now());
    }

    /// Current state, after applying pending transitions
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        inner.sync(&self.name, Instant::now());
        inner.state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.sync(&self.name, now);
        let totals = inner.window.totals(now);
        CircuitSnapshot::new(&self.name, inner.state, totals)
    }

    /// Decide whether a call may proceed. Rejections are recorded before returning.
    pub fn admit(&self) -> Result<CallPermit<'_>, CallError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.sync(&self.name, now);

        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen if !inner.probe_in_flight => true,
            CircuitState::Open | CircuitState::HalfOpen => {
                inner.window.record(Outcome::ShortCircuited, now);
                return Err(CallError::CircuitOpen {
                    name: self.name.clone(),
                });
            }
        };

        inner.settle_pool();
        let slot = match Arc::clone(&inner.pool).try_acquire_owned() {
            Ok(slot) => slot,
            Err(_) => {
                inner.window.record(Outcome::Rejected, now);
                inner.evaluate(&self.name, now);
                return Err(CallError::MaxConcurrency {
                    name: self.name.clone(),
                    limit: inner.config.max_concurrent_requests,
                });
            }
        };

        if probe {
            debug!(circuit = %self.name, "Admitting probe call");
            inner.probe_in_flight = true;
        }

        Ok(CallPermit {
            circuit: self,
            probe,
            timeout: inner.config.timeout,
            finished: false,
            _slot: slot,
        })
    }

    fn on_outcome(&self, probe: bool, outcome: Outcome, now: Instant) {
        let mut inner = self.inner.lock();
        inner.window.record(outcome, now);

        if probe {
            if outcome == Outcome::Success {
                info!(circuit = %self.name, "Circuit breaker transitioning from HalfOpen to Closed");
                inner.close();
            } else {
                warn!(circuit = %self.name, "Circuit breaker transitioning from HalfOpen to Open (probe failed)");
                inner.trip(now);
            }
        } else {
            inner.evaluate(&self.name, now);
        }
    }

    /// Run `work` under admission control and the circuit's timeout.
    ///
    /// On timeout the work future is dropped, which cancels whatever I/O it had in flight.
    pub async fn execute<T, W, Fut>(&self, work: W) -> Result<T, CallError>
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let permit = self.admit()?;
        let timeout = permit.timeout();

        match tokio::time::timeout(timeout, work()).await {
            Ok(Ok(value)) => {
                permit.finish(Outcome::Success);
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.finish(Outcome::Failure);
                Err(err)
            }
            Err(_) => {
                permit.finish(Outcome::Timeout);
                warn!(circuit = %self.name, ?timeout, "Call timed out");
                Err(CallError::Timeout {
                    name: self.name.clone(),
                    timeout,
                })
            }
        }
    }

    /// Force the circuit back to Closed with an empty window
    pub fn reset(&self) {
        self.inner.lock().close();
    }
}
