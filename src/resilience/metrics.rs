use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::circuit_breaker::CircuitState;

/// Result of one protected call as seen by the circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
    /// Concurrency pool saturated
    Rejected,
    /// Refused because the circuit was open
    ShortCircuited,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    started: Instant,
    successes: u64,
    failures: u64,
    timeouts: u64,
    rejections: u64,
    short_circuits: u64,
}

impl Bucket {
    fn new(started: Instant) -> Self {
        Self {
            started,
            successes: 0,
            failures: 0,
            timeouts: 0,
            rejections: 0,
            short_circuits: 0,
        }
    }
}

/// Counters summed over the live buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowTotals {
    pub success_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub rejected_count: u64,
    pub short_circuited: u64,
}

impl WindowTotals {
    /// Failures, timeouts and concurrency rejections
    pub fn error_count(&self) -> u64 {
        self.failure_count + self.timeout_count + self.rejected_count
    }

    /// Calls that count toward the error rate: successes plus errors
    pub fn request_count(&self) -> u64 {
        self.success_count + self.error_count()
    }

    /// Error rate in percent, 0 when no request was recorded
    pub fn error_percentage(&self) -> u32 {
        let requests = self.request_count();
        if requests == 0 {
            return 0;
        }
        ((self.error_count() * 100) / requests) as u32
    }
}

/// Sliding statistics window made of fixed-width time buckets.
///
/// Buckets older than `bucket_width * bucket_count` are dropped on every access.
#[derive(Debug)]
pub struct RollingWindow {
    buckets: VecDeque<Bucket>,
    bucket_width: Duration,
    bucket_count: usize,
}

impl RollingWindow {
    pub fn new(window: Duration, bucket_count: usize) -> Self {
        let bucket_count = bucket_count.max(1);
        let bucket_width = (window / bucket_count as u32).max(Duration::from_millis(1));
        Self {
            buckets: VecDeque::with_capacity(bucket_count),
            bucket_width,
            bucket_count,
        }
    }

    pub fn retention(&self) -> Duration {
        self.bucket_width * self.bucket_count as u32
    }

    pub fn record(&mut self, outcome: Outcome, now: Instant) {
        self.prune(now);
        let bucket = self.current_bucket(now);
        match outcome {
            Outcome::Success => bucket.successes += 1,
            Outcome::Failure => bucket.failures += 1,
            Outcome::Timeout => bucket.timeouts += 1,
            Outcome::Rejected => bucket.rejections += 1,
            Outcome::ShortCircuited => bucket.short_circuits += 1,
        }
    }

    pub fn totals(&mut self, now: Instant) -> WindowTotals {
        self.prune(now);
        self.buckets
            .iter()
            .fold(WindowTotals::default(), |mut totals, bucket| {
                totals.success_count += bucket.successes;
                totals.failure_count += bucket.failures;
                totals.timeout_count += bucket.timeouts;
                totals.rejected_count += bucket.rejections;
                totals.short_circuited += bucket.short_circuits;
                totals
            })
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    fn current_bucket(&mut self, now: Instant) -> &mut Bucket {
        let needs_new = match self.buckets.back() {
            Some(last) => now.saturating_duration_since(last.started) >= self.bucket_width,
            None => true,
        };
        if needs_new {
            if self.buckets.len() == self.bucket_count {
                self.buckets.pop_front();
            }
            self.buckets.push_back(Bucket::new(now));
        }
        // a bucket was pushed above when the deque was empty
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    fn prune(&mut self, now: Instant) {
        let retention = self.retention();
        while let Some(front) = self.buckets.front() {
            if now.saturating_duration_since(front.started) >= retention {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Read-only view of one circuit for health and metrics surfaces
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub success_count: u64,
    pub error_count: u64,
    pub request_count: u64,
    pub short_circuited: u64,
    pub error_percentage: u32,
}

impl CircuitSnapshot {
    pub(crate) fn new(name: &str, state: CircuitState, totals: WindowTotals) -> Self {
        Self {
            name: name.to_string(),
            state,
            success_count: totals.success_count,
            error_count: totals.error_count(),
            request_count: totals.request_count(),
            short_circuited: totals.short_circuited,
            error_percentage: totals.error_percentage(),
        }
    }
}
