//! Certificate cache for one (principal, attribute set) partition.
//!
//! States: EMPTY, FETCHING, HAS_CERTS. At most one fetch is in flight per
//! pool. Callers that find the cache empty while a fetch is running wait
//! for that fetch and then try exactly one pop, so a failed fetch is seen
//! by every waiter at once.
//!
//! A fetch that times out leaves its worker inside the issuer. Until that
//! worker returns, callers on an empty cache get `IssuanceFailed` at once
//! and no new fetch starts. Whatever the late worker brings back is dropped.

use crate::error::{PoolError, PoolResult};
use crate::policy::{policy_for, RefillPolicy};
use crate::types::{CertOutcome, PoolSettings, PoolStats};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tessera_core::{AttributeKey, CertificateIssuer, Enrollment, TCert, TCertBatchRequest};

struct PoolState {
    /// Certificates are popped from the back, so the last one the issuer
    /// listed is dispensed first.
    cache: Vec<TCert>,
    fetching: bool,
    /// A worker is inside `fetch_batch`, possibly one whose caller gave up.
    worker_busy: bool,
    /// Bumped every time a fetch completes.
    generation: u64,
    last_fetch_error: Option<String>,
    fetches: u64,
    fetch_failures: u64,
    dispensed: u64,
    policy: Box<dyn RefillPolicy>,
}

struct Shared {
    principal: String,
    attribute_key: AttributeKey,
    attributes: Vec<String>,
    issuer: Arc<dyn CertificateIssuer>,
    fetch_timeout: Duration,
    batch_size: AtomicUsize,
    state: Mutex<PoolState>,
    fetch_done: Condvar,
}

pub struct CertificatePool {
    shared: Arc<Shared>,
}

impl CertificatePool {
    pub fn new(
        principal: impl Into<String>,
        attributes: Vec<String>,
        issuer: Arc<dyn CertificateIssuer>,
        settings: PoolSettings,
    ) -> PoolResult<Self> {
        let attribute_key = AttributeKey::from_attributes(&attributes).ok_or_else(|| {
            PoolError::InvalidAttributes("a certificate pool needs at least one attribute".into())
        })?;
        Ok(Self {
            shared: Arc::new(Shared {
                principal: principal.into(),
                attribute_key,
                attributes,
                issuer,
                fetch_timeout: settings.fetch_timeout,
                batch_size: AtomicUsize::new(settings.batch_size.max(1)),
                state: Mutex::new(PoolState {
                    cache: Vec::new(),
                    fetching: false,
                    worker_busy: false,
                    generation: 0,
                    last_fetch_error: None,
                    fetches: 0,
                    fetch_failures: 0,
                    dispensed: 0,
                    policy: policy_for(settings.refill),
                }),
                fetch_done: Condvar::new(),
            }),
        })
    }

    pub fn principal(&self) -> &str {
        &self.shared.principal
    }

    pub fn attribute_key(&self) -> &AttributeKey {
        &self.shared.attribute_key
    }

    pub fn attributes(&self) -> &[String] {
        &self.shared.attributes
    }

    pub fn batch_size(&self) -> usize {
        self.shared.batch_size.load(Ordering::Relaxed)
    }

    /// Applies to the next fetch. Zero is raised to one.
    pub fn set_batch_size(&self, batch_size: usize) {
        self.shared
            .batch_size
            .store(batch_size.max(1), Ordering::Relaxed);
    }

    /// Dispense one certificate, fetching a batch first if the cache is empty.
    ///
    /// Fetch failures are not errors here: they come back as
    /// `CertOutcome::IssuanceFailed` and are counted in `stats()`.
    pub fn get_next(&self, enrollment: &Enrollment) -> PoolResult<CertOutcome> {
        let mut state = self.shared.lock()?;

        if state.cache.is_empty() {
            if state.fetching {
                state = self.shared.wait_for_fetch(state)?;
            } else if state.worker_busy {
                tracing::debug!(
                    principal = %self.shared.principal,
                    attribute_key = %self.shared.attribute_key,
                    "previous TCert fetch still running"
                );
                let reason = state
                    .last_fetch_error
                    .clone()
                    .unwrap_or_else(|| "previous batch fetch still running".to_string());
                return Ok(CertOutcome::IssuanceFailed { reason });
            } else {
                state.fetching = true;
                state.worker_busy = true;
                drop(state);

                let result = Shared::fetch(&self.shared, enrollment.clone());
                state = self.shared.lock()?;
                self.shared.finish_fetch(&mut state, result);
            }

            if state.cache.is_empty() {
                return Ok(match &state.last_fetch_error {
                    Some(reason) => CertOutcome::IssuanceFailed {
                        reason: reason.clone(),
                    },
                    None => CertOutcome::Exhausted,
                });
            }
        }

        let Some(cert) = state.cache.pop() else {
            return Ok(CertOutcome::Exhausted);
        };
        state.dispensed += 1;
        state.policy.record_dispense(Instant::now());

        let prefetch = !state.fetching
            && !state.worker_busy
            && state.policy.should_prefetch(state.cache.len());
        if prefetch {
            state.fetching = true;
            state.worker_busy = true;
        }
        drop(state);

        if prefetch {
            Shared::spawn_prefetch(&self.shared, enrollment.clone());
        }
        Ok(CertOutcome::Available(cert))
    }

    pub fn stats(&self) -> PoolResult<PoolStats> {
        let state = self.shared.lock()?;
        Ok(PoolStats {
            fetches: state.fetches,
            fetch_failures: state.fetch_failures,
            dispensed: state.dispensed,
            cached: state.cache.len(),
            last_error: state.last_fetch_error.clone(),
        })
    }

    pub fn cached(&self) -> PoolResult<usize> {
        Ok(self.shared.lock()?.cache.len())
    }

    pub fn is_fetching(&self) -> PoolResult<bool> {
        Ok(self.shared.lock()?.fetching)
    }

    /// True while a worker is still inside the issuer, including one left
    /// behind by a timed-out fetch.
    pub fn is_worker_busy(&self) -> PoolResult<bool> {
        Ok(self.shared.lock()?.worker_busy)
    }
}

impl std::fmt::Debug for CertificatePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificatePool")
            .field("principal", &self.shared.principal)
            .field("attribute_key", &self.shared.attribute_key)
            .field("batch_size", &self.batch_size())
            .finish()
    }
}

/// Clears `worker_busy` when the issuer call ends, including by panic.
struct BusyWorker(Arc<Shared>);

impl Drop for BusyWorker {
    fn drop(&mut self) {
        self.0.release_worker();
    }
}

impl Shared {
    fn lock(&self) -> PoolResult<MutexGuard<'_, PoolState>> {
        self.state.lock().map_err(|_| PoolError::LockPoisoned)
    }

    fn wait_for_fetch<'a>(
        &self,
        mut state: MutexGuard<'a, PoolState>,
    ) -> PoolResult<MutexGuard<'a, PoolState>> {
        let generation = state.generation;
        while state.generation == generation {
            state = self
                .fetch_done
                .wait(state)
                .map_err(|_| PoolError::LockPoisoned)?;
        }
        Ok(state)
    }

    /// Run one batch fetch on a worker thread, bounded by `fetch_timeout`.
    ///
    /// The caller has already set `worker_busy`; the worker clears it when
    /// the issuer returns. A result that arrives after the deadline is
    /// dropped with the channel.
    fn fetch(shared: &Arc<Self>, enrollment: Enrollment) -> PoolResult<(Vec<TCert>, Duration)> {
        let request = TCertBatchRequest {
            name: shared.principal.clone(),
            enrollment,
            num: shared.batch_size.load(Ordering::Relaxed),
            attributes: shared.attributes.clone(),
        };
        tracing::debug!(
            principal = %shared.principal,
            attribute_key = %shared.attribute_key,
            batch_size = request.num,
            "fetching TCert batch"
        );

        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(shared);
        let started = Instant::now();
        let spawned = thread::Builder::new()
            .name(format!("tcert-fetch-{}", shared.principal))
            .spawn(move || {
                // Released before the hand-off, and on unwind. A waiting
                // fetcher still holds `fetching`, so nothing new can start
                // in between.
                let result = {
                    let _busy = BusyWorker(Arc::clone(&worker));
                    worker.issuer.fetch_batch(&request)
                };
                if tx.send(result).is_err() {
                    tracing::debug!(
                        principal = %worker.principal,
                        attribute_key = %worker.attribute_key,
                        "late TCert batch discarded"
                    );
                }
            });
        if let Err(e) = spawned {
            shared.release_worker();
            return Err(PoolError::Worker(e.to_string()));
        }

        match rx.recv_timeout(shared.fetch_timeout) {
            Ok(Ok(certs)) => Ok((certs, started.elapsed())),
            Ok(Err(e)) => Err(PoolError::Issuance(e.to_string())),
            Err(RecvTimeoutError::Timeout) => Err(PoolError::FetchTimedOut {
                timeout_ms: shared.fetch_timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::Issuance(
                "issuer returned no result".into(),
            )),
        }
    }

    fn release_worker(&self) {
        match self.lock() {
            Ok(mut state) => state.worker_busy = false,
            Err(e) => tracing::warn!(error = %e, "could not release TCert fetch worker"),
        }
    }

    /// Record a fetch result and wake every waiter. Caller holds the lock.
    fn finish_fetch(&self, state: &mut PoolState, result: PoolResult<(Vec<TCert>, Duration)>) {
        state.fetches += 1;
        match result {
            Ok((certs, latency)) => {
                tracing::debug!(
                    principal = %self.principal,
                    attribute_key = %self.attribute_key,
                    received = certs.len(),
                    latency_ms = latency.as_millis() as u64,
                    "TCert batch received"
                );
                state.cache.extend(certs);
                state.policy.record_fetch(latency);
                state.last_fetch_error = None;
            }
            Err(e) => {
                state.fetch_failures += 1;
                tracing::warn!(
                    principal = %self.principal,
                    attribute_key = %self.attribute_key,
                    failures = state.fetch_failures,
                    error = %e,
                    "TCert batch fetch failed"
                );
                state.last_fetch_error = Some(e.to_string());
            }
        }
        state.generation = state.generation.wrapping_add(1);
        state.fetching = false;
        self.fetch_done.notify_all();
    }

    fn spawn_prefetch(shared: &Arc<Shared>, enrollment: Enrollment) {
        let worker = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("tcert-prefetch-{}", shared.principal))
            .spawn(move || {
                let result = Shared::fetch(&worker, enrollment);
                match worker.lock() {
                    Ok(mut state) => worker.finish_fetch(&mut state, result),
                    Err(e) => tracing::warn!(error = %e, "dropping prefetched TCert batch"),
                }
            });

        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start TCert prefetch");
            if let Ok(mut state) = shared.lock() {
                state.fetching = false;
                state.worker_busy = false;
                state.generation = state.generation.wrapping_add(1);
                shared.fetch_done.notify_all();
            }
        }
    }
}
