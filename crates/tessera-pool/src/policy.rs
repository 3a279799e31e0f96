//! Refill policies.
//!
//! A policy only decides *when* to start a background fetch. The pool
//! still refills synchronously whenever a caller finds it empty, so even a
//! policy that never prefetches is conformant.

use crate::types::RefillStrategy;
use std::time::{Duration, Instant};

/// Smoothing factor for the moving averages.
const EWMA_ALPHA: f64 = 0.3;

pub trait RefillPolicy: Send {
    /// A certificate left the cache at `at`.
    fn record_dispense(&mut self, at: Instant);

    /// A fetch completed successfully after `latency`.
    fn record_fetch(&mut self, latency: Duration);

    /// Whether to start a background fetch with `cached` certificates left.
    fn should_prefetch(&self, cached: usize) -> bool;
}

pub fn policy_for(strategy: RefillStrategy) -> Box<dyn RefillPolicy> {
    match strategy {
        RefillStrategy::WhenEmpty => Box::new(RefillWhenEmpty),
        RefillStrategy::Prefetch { buffer } => Box::new(PrefetchPolicy::new(buffer)),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefillWhenEmpty;

impl RefillPolicy for RefillWhenEmpty {
    fn record_dispense(&mut self, _at: Instant) {}

    fn record_fetch(&mut self, _latency: Duration) {}

    fn should_prefetch(&self, _cached: usize) -> bool {
        false
    }
}

/// Prefetch once `cached <= rate * (latency + buffer)`.
///
/// `rate` is the EWMA of dispenses per second and `latency` the EWMA of
/// fetch durations. No estimate exists until two dispenses and one fetch
/// have been seen, and until then this behaves like `RefillWhenEmpty`.
#[derive(Debug, Clone)]
pub struct PrefetchPolicy {
    buffer: Duration,
    last_dispense: Option<Instant>,
    interval_secs: Option<f64>,
    latency_secs: Option<f64>,
}

impl PrefetchPolicy {
    pub fn new(buffer: Duration) -> Self {
        Self {
            buffer,
            last_dispense: None,
            interval_secs: None,
            latency_secs: None,
        }
    }

    /// Estimated dispenses per second.
    pub fn arrival_rate(&self) -> Option<f64> {
        self.interval_secs
            .map(|interval| 1.0 / interval.max(f64::EPSILON))
    }

    pub fn average_latency(&self) -> Option<Duration> {
        self.latency_secs.map(Duration::from_secs_f64)
    }

    /// Certificates expected to be consumed while one fetch is in flight.
    pub fn threshold(&self) -> Option<f64> {
        let rate = self.arrival_rate()?;
        let latency = self.latency_secs?;
        Some(rate * (latency + self.buffer.as_secs_f64()))
    }
}

fn ewma(previous: Option<f64>, sample: f64) -> f64 {
    match previous {
        Some(prev) => EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * prev,
        None => sample,
    }
}

impl RefillPolicy for PrefetchPolicy {
    fn record_dispense(&mut self, at: Instant) {
        if let Some(last) = self.last_dispense {
            let sample = at.saturating_duration_since(last).as_secs_f64();
            self.interval_secs = Some(ewma(self.interval_secs, sample));
        }
        self.last_dispense = Some(at);
    }

    fn record_fetch(&mut self, latency: Duration) {
        self.latency_secs = Some(ewma(self.latency_secs, latency.as_secs_f64()));
    }

    fn should_prefetch(&self, cached: usize) -> bool {
        if cached == 0 {
            return false;
        }
        match self.threshold() {
            Some(threshold) => (cached as f64) <= threshold,
            None => false,
        }
    }
}
