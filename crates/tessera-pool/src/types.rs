use serde::{Deserialize, Serialize};
use std::time::Duration;
use tessera_core::TCert;

/// Default number of certificates requested per batch.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Default bound on a single batch fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default slack added to the observed fetch latency by the prefetch policy.
pub const DEFAULT_PREFETCH_BUFFER: Duration = Duration::from_secs(1);

/// Result of asking for one certificate.
///
/// Only `Available` carries a certificate. The other variants are the
/// "no certificate right now" signal, split by cause for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertOutcome {
    Available(TCert),
    /// The batch fetch this call depended on failed or timed out.
    IssuanceFailed { reason: String },
    /// A fetch succeeded but left nothing for this caller.
    Exhausted,
    /// No pool applies (empty attribute list).
    NotApplicable,
}

impl CertOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, CertOutcome::Available(_))
    }

    pub fn into_cert(self) -> Option<TCert> {
        match self {
            CertOutcome::Available(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn as_cert(&self) -> Option<&TCert> {
        match self {
            CertOutcome::Available(cert) => Some(cert),
            _ => None,
        }
    }
}

/// Diagnostic counters for one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Completed fetch attempts, successful or not.
    pub fetches: u64,
    pub fetch_failures: u64,
    pub dispensed: u64,
    /// Certificates currently cached.
    pub cached: usize,
    pub last_error: Option<String>,
}

/// When to refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillStrategy {
    /// Fetch only when a caller finds the cache empty.
    WhenEmpty,
    /// Also fetch in the background once the cache would run dry within
    /// roughly one fetch latency plus `buffer`.
    Prefetch { buffer: Duration },
}

impl Default for RefillStrategy {
    fn default() -> Self {
        RefillStrategy::WhenEmpty
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub batch_size: usize,
    pub fetch_timeout: Duration,
    pub refill: RefillStrategy,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            refill: RefillStrategy::WhenEmpty,
        }
    }
}

impl PoolSettings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_prefetch(mut self, buffer: Duration) -> Self {
        self.refill = RefillStrategy::Prefetch { buffer };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let cert = TCert::new(vec![1, 2], vec![3]);
        let ok = CertOutcome::Available(cert.clone());
        assert!(ok.is_available());
        assert_eq!(ok.as_cert(), Some(&cert));
        assert_eq!(ok.into_cert(), Some(cert));

        for none in [
            CertOutcome::Exhausted,
            CertOutcome::NotApplicable,
            CertOutcome::IssuanceFailed {
                reason: "down".into(),
            },
        ] {
            assert!(!none.is_available());
            assert!(none.into_cert().is_none());
        }
    }

    #[test]
    fn test_settings_defaults_and_builders() {
        let s = PoolSettings::default();
        assert_eq!(s.batch_size, 200);
        assert_eq!(s.refill, RefillStrategy::WhenEmpty);

        let s = PoolSettings::default()
            .with_batch_size(5)
            .with_fetch_timeout(Duration::from_millis(10))
            .with_prefetch(Duration::from_millis(50));
        assert_eq!(s.batch_size, 5);
        assert_eq!(s.fetch_timeout, Duration::from_millis(10));
        assert_eq!(
            s.refill,
            RefillStrategy::Prefetch {
                buffer: Duration::from_millis(50)
            }
        );
    }

    #[test]
    fn test_stats_serialize() {
        let stats = PoolStats {
            fetches: 2,
            fetch_failures: 1,
            dispensed: 7,
            cached: 3,
            last_error: Some("timeout".into()),
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"fetch_failures\":1"));
        let back: PoolStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
