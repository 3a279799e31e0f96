//! End-to-end journeys through the client facade.
//!
//! Journey 1: register, enroll and draw attributed certificates
//! Journey 2: issuance outages degrade to "no certificate"
//! Journey 3: concurrent callers share one batch fetch
//! Journey 4: confidential payloads and signatures with TCert keys
//! Journey 5: identity state survives a client restart
//! Journey 6: transactions need an active peer

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use tessera::{CertOutcome, Client, CryptoEngine, InMemoryStateStore, MemberServices, RootConfig};
use tessera_core::{
    CertificateIssuer, ChainCodeResponse, ChainContext, DeployRequest, Enrollment,
    EnrollmentRequest, EnrollmentService, InvokeRequest, QueryRequest, Registrar,
    RegistrationRequest, RegistrationService, ResponseStatus, StateStore, TCert,
    TCertBatchRequest, TesseraError, TesseraResult, TransactionContext,
};
use tessera_crypto::PublicKey;

// ============================================================================
// Collaborators
// ============================================================================

struct MemberServicesMock {
    issued_secret: String,
}

impl RegistrationService for MemberServicesMock {
    fn register(
        &self,
        request: &RegistrationRequest,
        registrar: Option<&Registrar>,
    ) -> TesseraResult<String> {
        if registrar.is_none() {
            return Err(TesseraError::Registration("no registrar".into()));
        }
        Ok(format!("{}-{}", self.issued_secret, request.enrollment_id))
    }
}

impl EnrollmentService for MemberServicesMock {
    fn enroll(&self, request: &EnrollmentRequest) -> TesseraResult<Enrollment> {
        let expected = format!("{}-{}", self.issued_secret, request.enrollment_id);
        if request.enrollment_secret != expected {
            return Err(TesseraError::Enrollment("identity or token does not match".into()));
        }
        Ok(Enrollment {
            key: vec![0x11; 8],
            cert: request.enrollment_id.as_bytes().to_vec(),
            chain_key: "chain-key".into(),
        })
    }
}

/// Issues certificates with real keys and remembers every public key it
/// handed out, keyed by certificate bytes.
struct KeyIssuer {
    engine: CryptoEngine,
    calls: AtomicU64,
    delay: Duration,
    issued: Mutex<Vec<(Vec<u8>, PublicKey)>>,
}

impl KeyIssuer {
    fn new(engine: CryptoEngine) -> Self {
        Self::with_delay(engine, Duration::ZERO)
    }

    fn with_delay(engine: CryptoEngine, delay: Duration) -> Self {
        Self {
            engine,
            calls: AtomicU64::new(0),
            delay,
            issued: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn public_key_for(&self, cert: &[u8]) -> PublicKey {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c == cert)
            .map(|(_, pk)| pk.clone())
            .unwrap()
    }
}

impl CertificateIssuer for KeyIssuer {
    fn fetch_batch(&self, request: &TCertBatchRequest) -> TesseraResult<Vec<TCert>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut batch = Vec::with_capacity(request.num);
        for i in 0..request.num {
            let kp = self.engine.generate_key_pair().unwrap();
            let cert = format!("{}|{}|{}|{}", request.name, request.attributes.join(","), call, i)
                .into_bytes();
            let der = kp.private_key.to_pkcs8_der().unwrap();
            self.issued
                .lock()
                .unwrap()
                .push((cert.clone(), kp.public_key.clone()));
            batch.push(TCert::new(cert, der.to_vec()));
        }
        Ok(batch)
    }
}

struct OutageIssuer {
    calls: AtomicU64,
}

impl CertificateIssuer for OutageIssuer {
    fn fetch_batch(&self, _request: &TCertBatchRequest) -> TesseraResult<Vec<TCert>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TesseraError::Issuance("TCA unavailable".into()))
    }
}

struct EchoTx {
    principal: String,
    bound_tcert: bool,
}

impl EchoTx {
    fn respond(&self, kind: &str, function: &str) -> TesseraResult<ChainCodeResponse> {
        Ok(ChainCodeResponse {
            status: ResponseStatus::Success,
            message: format!("{} {} by {}", kind, function, self.principal),
            payload: vec![self.bound_tcert as u8],
            transaction_id: Some("tx-1".into()),
        })
    }
}

impl TransactionContext for EchoTx {
    fn deploy(&self, request: &DeployRequest) -> TesseraResult<ChainCodeResponse> {
        self.respond("deploy", &request.function)
    }
    fn invoke(&self, request: &InvokeRequest) -> TesseraResult<ChainCodeResponse> {
        self.respond("invoke", &request.function)
    }
    fn query(&self, request: &QueryRequest) -> TesseraResult<ChainCodeResponse> {
        self.respond("query", &request.function)
    }
}

struct TestChain {
    peers: AtomicUsize,
    batch_size: usize,
}

impl ChainContext for TestChain {
    fn name(&self) -> &str {
        "journey-chain"
    }
    fn active_peer_count(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }
    fn tcert_batch_size(&self) -> usize {
        self.batch_size
    }
    fn registrar(&self) -> Option<Registrar> {
        Some(Registrar {
            name: "WebAppAdmin".into(),
            roles: vec!["client".into()],
        })
    }
    fn new_transaction_context(
        &self,
        principal: &str,
        tcert: Option<TCert>,
    ) -> Box<dyn TransactionContext> {
        Box::new(EchoTx {
            principal: principal.to_string(),
            bound_tcert: tcert.is_some(),
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

fn services(issuer: Arc<dyn CertificateIssuer>) -> MemberServices {
    let ms = Arc::new(MemberServicesMock {
        issued_secret: "pw".into(),
    });
    MemberServices {
        registration: ms.clone(),
        enrollment: ms,
        issuer,
    }
}

fn chain(batch_size: usize) -> Arc<TestChain> {
    Arc::new(TestChain {
        peers: AtomicUsize::new(2),
        batch_size,
    })
}

fn client_with(
    config: RootConfig,
    chain: Arc<TestChain>,
    issuer: Arc<dyn CertificateIssuer>,
    store: Option<Arc<dyn StateStore>>,
) -> Client {
    Client::new(config, chain, services(issuer), store).unwrap()
}

fn enrolled(client: &Client, name: &str) -> Arc<tessera::Identity> {
    let member = client.member(name).unwrap();
    member
        .register_and_enroll(&RegistrationRequest::new(name))
        .unwrap();
    member
}

// ============================================================================
// Journey 1: register, enroll and draw attributed certificates
// ============================================================================

#[test]
fn test_journey_alice_register_enroll_certificates() {
    tessera::init_tracing("tessera=debug");
    let config = RootConfig::default();
    let issuer = Arc::new(KeyIssuer::new(config.crypto_engine().unwrap()));
    let client = client_with(config, chain(5), issuer.clone(), None);

    let alice = client.member("alice").unwrap();
    assert!(!alice.is_registered().unwrap());

    let secret = alice.register(&RegistrationRequest::new("alice")).unwrap();
    assert_eq!(alice.enrollment_secret().unwrap(), Some(secret.clone()));
    assert!(alice.is_registered().unwrap());
    assert!(!alice.is_enrolled().unwrap());

    alice.enroll(&secret).unwrap();
    assert!(alice.is_enrolled().unwrap());

    let none: [&str; 0] = [];
    assert_eq!(alice.get_certificate(&none).unwrap(), CertOutcome::NotApplicable);
    assert_eq!(alice.pool_count().unwrap(), 0);
    assert_eq!(issuer.calls(), 0);

    let outcome = alice.get_certificate(&["role"]).unwrap();
    assert!(outcome.is_available());
    assert_eq!(alice.pool_count().unwrap(), 1);
    assert_eq!(issuer.calls(), 1);

    // LIFO: the last certificate of the batch comes out first.
    let cert = outcome.into_cert().unwrap();
    assert_eq!(cert.cert, b"alice|role|0|4".to_vec());
}

#[test]
fn test_journey_batch_of_n_then_exactly_one_refetch() {
    let config = RootConfig::default();
    let issuer = Arc::new(KeyIssuer::new(config.crypto_engine().unwrap()));
    let client = client_with(config, chain(3), issuer.clone(), None);
    let bob = enrolled(&client, "bob");

    for _ in 0..3 {
        assert!(bob.get_certificate(&["dept", "level"]).unwrap().is_available());
    }
    assert_eq!(issuer.calls(), 1);

    assert!(bob.get_certificate(&["dept", "level"]).unwrap().is_available());
    assert_eq!(issuer.calls(), 2);

    let stats = bob.pool_stats(&["dept", "level"]).unwrap().unwrap();
    assert_eq!(stats.fetches, 2);
    assert_eq!(stats.dispensed, 4);
    assert_eq!(stats.cached, 2);
}

#[test]
fn test_journey_attribute_order_selects_distinct_pools() {
    let config = RootConfig::default();
    let issuer = Arc::new(KeyIssuer::new(config.crypto_engine().unwrap()));
    let client = client_with(config, chain(2), issuer.clone(), None);
    let carol = enrolled(&client, "carol");

    carol.get_certificate(&["a", "b"]).unwrap();
    carol.get_certificate(&["b", "a"]).unwrap();
    assert_eq!(carol.pool_count().unwrap(), 2);
    assert_eq!(issuer.calls(), 2);
}

#[test]
fn test_journey_unenrolled_member_cannot_draw() {
    let config = RootConfig::default();
    let issuer = Arc::new(KeyIssuer::new(config.crypto_engine().unwrap()));
    let client = client_with(config, chain(2), issuer, None);
    let dave = client.member("dave").unwrap();
    assert!(matches!(
        dave.get_certificate(&["role"]),
        Err(tessera_member::MemberError::NotEnrolled(_))
    ));
}

// ============================================================================
// Journey 2: issuance outages degrade to "no certificate"
// ============================================================================

#[test]
fn test_journey_issuance_outage_degrades() {
    let issuer = Arc::new(OutageIssuer {
        calls: AtomicU64::new(0),
    });
    let client = client_with(RootConfig::default(), chain(10), issuer.clone(), None);
    let erin = enrolled(&client, "erin");

    let outcome = erin.get_certificate(&["role"]).unwrap();
    match outcome {
        CertOutcome::IssuanceFailed { reason } => assert!(reason.contains("TCA unavailable")),
        other => panic!("expected degrade, got {:?}", other),
    }
    assert!(erin.get_user_cert(&["role"]).unwrap().is_none());

    let stats = erin.pool_stats(&["role"]).unwrap().unwrap();
    assert_eq!(stats.fetch_failures, 2);
    assert_eq!(stats.cached, 0);
    assert!(stats.last_error.is_some());
    assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_journey_slow_issuer_times_out() {
    let mut config = RootConfig::default();
    config.pool.fetch_timeout_ms = 30;
    let issuer = Arc::new(KeyIssuer::with_delay(
        config.crypto_engine().unwrap(),
        Duration::from_millis(400),
    ));
    let client = client_with(config, chain(1), issuer, None);
    let frank = enrolled(&client, "frank");

    let outcome = frank.get_certificate(&["role"]).unwrap();
    assert!(matches!(outcome, CertOutcome::IssuanceFailed { .. }));
    let stats = frank.pool_stats(&["role"]).unwrap().unwrap();
    assert!(stats.last_error.unwrap().contains("timed out"));
}

// ============================================================================
// Journey 3: concurrent callers share one batch fetch
// ============================================================================

#[test]
fn test_journey_concurrent_draws_single_fetch() {
    const CALLERS: usize = 10;
    let config = RootConfig::default();
    let issuer = Arc::new(KeyIssuer::with_delay(
        config.crypto_engine().unwrap(),
        Duration::from_millis(100),
    ));
    let client = client_with(config, chain(CALLERS), issuer.clone(), None);
    let grace = enrolled(&client, "grace");
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let grace = Arc::clone(&grace);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                grace.get_user_cert(&["role"]).unwrap()
            })
        })
        .collect();

    let mut certs: Vec<Vec<u8>> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap().cert.clone())
        .collect();

    assert_eq!(issuer.calls(), 1, "racing callers must share one fetch");
    assert_eq!(grace.pool_count().unwrap(), 1);
    certs.sort();
    certs.dedup();
    assert_eq!(certs.len(), CALLERS, "no certificate dispensed twice");
}

#[test]
fn test_journey_concurrent_pool_creation() {
    const CALLERS: usize = 8;
    let config = RootConfig::default();
    let issuer = Arc::new(KeyIssuer::new(config.crypto_engine().unwrap()));
    let client = client_with(config, chain(CALLERS), issuer.clone(), None);
    let heidi = enrolled(&client, "heidi");
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let heidi = Arc::clone(&heidi);
            let barrier = Arc::clone(&barrier);
            let attr = if i % 2 == 0 { "even" } else { "odd" };
            thread::spawn(move || {
                barrier.wait();
                heidi.get_certificate(&[attr]).unwrap().is_available()
            })
        })
        .collect();

    for h in handles {
        assert!(h.join().unwrap());
    }
    assert_eq!(heidi.pool_count().unwrap(), 2);
    assert_eq!(issuer.calls(), 2);
}

// ============================================================================
// Journey 4: confidential payloads and signatures with TCert keys
// ============================================================================

#[test]
fn test_journey_tcert_keys_decrypt_and_sign() {
    for (family, level) in [("SHA3", 256), ("SHA2", 384)] {
        let mut config = RootConfig::default();
        config.crypto.hash_family = family.into();
        config.crypto.security_level = level;
        let issuer = Arc::new(KeyIssuer::new(config.crypto_engine().unwrap()));
        let client = client_with(config, chain(2), issuer.clone(), None);
        let ivan = enrolled(&client, "ivan");

        let tcert = ivan.get_user_cert(&["role"]).unwrap().unwrap();
        let public = issuer.public_key_for(&tcert.cert);

        let blob = client
            .engine()
            .ecies_encrypt(&public, b"{\"amount\":10}")
            .unwrap();
        assert_eq!(
            client.decrypt_for_tcert(&tcert, &blob).unwrap(),
            b"{\"amount\":10}"
        );

        let mut tampered = blob.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        assert!(matches!(
            client.decrypt_for_tcert(&tcert, &tampered),
            Err(tessera::RootError::Crypto(
                tessera_crypto::CryptoError::AuthenticationFailure
            ))
        ));

        let a = client.sign_with_tcert(&tcert, b"invoke move a b 10").unwrap();
        let b = client.sign_with_tcert(&tcert, b"invoke move a b 10").unwrap();
        assert_eq!(a, b, "signatures are deterministic");
        assert!(a.r.iter().all(u8::is_ascii_digit));
        assert!(a.s.iter().all(u8::is_ascii_digit));
        assert!(client
            .engine()
            .ecdsa_verify(&public, b"invoke move a b 10", &a)
            .unwrap());
    }
}

// ============================================================================
// Journey 5: identity state survives a client restart
// ============================================================================

#[test]
fn test_journey_restart_restores_identity() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let config = RootConfig::default();
    let issuer = Arc::new(KeyIssuer::new(config.crypto_engine().unwrap()));

    {
        let client = client_with(config.clone(), chain(2), issuer.clone(), Some(store.clone()));
        let judy = client.member("judy").unwrap();
        let mut request = RegistrationRequest::new("judy");
        request.roles = vec!["client".into()];
        request.affiliation = "institution_a".into();
        judy.register_and_enroll(&request).unwrap();
        assert!(judy.get_certificate(&["role"]).unwrap().is_available());
    }

    let client = client_with(config, chain(2), issuer.clone(), Some(store));
    let judy = client.member("judy").unwrap();
    assert!(judy.is_enrolled().unwrap());
    assert_eq!(judy.affiliation().unwrap(), "institution_a");
    assert_eq!(judy.roles().unwrap(), vec!["client".to_string()]);

    // Pools are not persisted; the restored identity fetches afresh.
    assert_eq!(judy.pool_count().unwrap(), 0);
    assert!(judy.get_certificate(&["role"]).unwrap().is_available());
    assert_eq!(issuer.calls(), 2);
}

// ============================================================================
// Journey 6: transactions need an active peer
// ============================================================================

#[test]
fn test_journey_transactions() {
    let config = RootConfig::default();
    let issuer = Arc::new(KeyIssuer::new(config.crypto_engine().unwrap()));
    let chain = chain(2);
    let client = client_with(config, chain.clone(), issuer, None);
    let mallory = enrolled(&client, "mallory");

    let request = InvokeRequest {
        function: "move".into(),
        args: vec!["a".into(), "b".into(), "10".into()],
        ..Default::default()
    };
    let response = mallory.invoke(&request).unwrap();
    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.message, "invoke move by mallory");
    assert_eq!(response.payload, vec![0]);

    let tcert = mallory.get_user_cert(&["role"]).unwrap().unwrap();
    let bound = mallory.new_transaction_context(Some(tcert));
    assert_eq!(bound.query(&request).unwrap().payload, vec![1]);

    chain.peers.store(0, Ordering::SeqCst);
    assert!(matches!(
        mallory.deploy(&request),
        Err(tessera_member::MemberError::NoValidPeer(_))
    ));
}
