use crate::error::{MemberError, MemberResult};
use crate::snapshot::{IdentitySnapshot, SNAPSHOT_VERSION};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_core::{
    AttributeKey, CertificateIssuer, ChainCodeResponse, ChainContext, DeployRequest, Enrollment,
    EnrollmentRequest, EnrollmentService, InvokeRequest, QueryRequest, RegistrationRequest,
    RegistrationService, StateStore, StoreKey, TCert, TransactionContext, TransactionKind,
};
use tessera_pool::{CertOutcome, CertificatePool, PoolSettings, PoolStats};

/// Handles to the three member services an identity talks to.
#[derive(Clone)]
pub struct MemberServices {
    pub registration: Arc<dyn RegistrationService>,
    pub enrollment: Arc<dyn EnrollmentService>,
    pub issuer: Arc<dyn CertificateIssuer>,
}

#[derive(Default)]
struct Profile {
    roles: Vec<String>,
    account: String,
    affiliation: String,
    enrollment_secret: Option<String>,
    enrollment: Option<Enrollment>,
    /// Zero defers to the chain, then the pool settings.
    tcert_batch_size: usize,
}

/// One principal on a chain.
///
/// Holds the durable profile (roles, secret, enrollment) plus one
/// certificate pool per requested attribute set. All methods take `&self`
/// and are safe to call from several threads.
pub struct Identity {
    name: String,
    chain: Arc<dyn ChainContext>,
    services: MemberServices,
    store: Option<Arc<dyn StateStore>>,
    pool_settings: PoolSettings,
    profile: RwLock<Profile>,
    pools: Mutex<HashMap<AttributeKey, Arc<CertificatePool>>>,
}

impl Identity {
    pub fn new(
        name: impl Into<String>,
        chain: Arc<dyn ChainContext>,
        services: MemberServices,
        store: Option<Arc<dyn StateStore>>,
        pool_settings: PoolSettings,
    ) -> Self {
        Self {
            name: name.into(),
            chain,
            services,
            store,
            pool_settings,
            profile: RwLock::new(Profile::default()),
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain(&self) -> &Arc<dyn ChainContext> {
        &self.chain
    }

    // -----------------------------------------------------------------------
    // Profile accessors
    // -----------------------------------------------------------------------

    pub fn roles(&self) -> MemberResult<Vec<String>> {
        Ok(self.read_profile()?.roles.clone())
    }

    pub fn set_roles(&self, roles: Vec<String>) -> MemberResult<()> {
        self.write_profile()?.roles = roles;
        Ok(())
    }

    pub fn account(&self) -> MemberResult<String> {
        Ok(self.read_profile()?.account.clone())
    }

    pub fn set_account(&self, account: impl Into<String>) -> MemberResult<()> {
        self.write_profile()?.account = account.into();
        Ok(())
    }

    pub fn affiliation(&self) -> MemberResult<String> {
        Ok(self.read_profile()?.affiliation.clone())
    }

    pub fn set_affiliation(&self, affiliation: impl Into<String>) -> MemberResult<()> {
        self.write_profile()?.affiliation = affiliation.into();
        Ok(())
    }

    pub fn enrollment_secret(&self) -> MemberResult<Option<String>> {
        Ok(self.read_profile()?.enrollment_secret.clone())
    }

    pub fn enrollment(&self) -> MemberResult<Option<Enrollment>> {
        Ok(self.read_profile()?.enrollment.clone())
    }

    /// Effective batch size: the identity's own value, else the chain
    /// default, else the configured pool default.
    pub fn tcert_batch_size(&self) -> MemberResult<usize> {
        let own = self.read_profile()?.tcert_batch_size;
        if own != 0 {
            return Ok(own);
        }
        match self.chain.tcert_batch_size() {
            0 => Ok(self.pool_settings.batch_size),
            chain_default => Ok(chain_default),
        }
    }

    /// Set the batch size for this identity and every pool it already has.
    pub fn set_tcert_batch_size(&self, batch_size: usize) -> MemberResult<()> {
        self.write_profile()?.tcert_batch_size = batch_size;
        let effective = self.tcert_batch_size()?;
        for pool in self.lock_pools()?.values() {
            pool.set_batch_size(effective);
        }
        Ok(())
    }

    pub fn is_enrolled(&self) -> MemberResult<bool> {
        Ok(self.read_profile()?.enrollment.is_some())
    }

    /// Enrolled, or holding a non-empty enrollment secret.
    pub fn is_registered(&self) -> MemberResult<bool> {
        let profile = self.read_profile()?;
        Ok(profile.enrollment.is_some() || has_secret(&profile.enrollment_secret))
    }

    // -----------------------------------------------------------------------
    // Registration and enrollment
    // -----------------------------------------------------------------------

    /// Register this principal and keep the secret the registrar issued.
    pub fn register(&self, request: &RegistrationRequest) -> MemberResult<String> {
        if request.enrollment_id != self.name {
            return Err(MemberError::InvalidRequest(format!(
                "registration is for '{}' but this identity is '{}'",
                request.enrollment_id, self.name
            )));
        }

        let registrar = self.chain.registrar();
        let secret = self
            .services
            .registration
            .register(request, registrar.as_ref())
            .map_err(|e| MemberError::Registration(e.to_string()))?;

        {
            let mut profile = self.write_profile()?;
            profile.enrollment_secret = Some(secret.clone());
            if !request.roles.is_empty() {
                profile.roles = request.roles.clone();
            }
            if !request.account.is_empty() {
                profile.account = request.account.clone();
            }
            if !request.affiliation.is_empty() {
                profile.affiliation = request.affiliation.clone();
            }
        }
        tracing::info!(
            principal = %self.name,
            registrar = registrar.as_ref().map(|r| r.name.as_str()).unwrap_or("-"),
            "registered"
        );
        self.save_state();
        Ok(secret)
    }

    pub fn enroll(&self, secret: &str) -> MemberResult<Enrollment> {
        let request = EnrollmentRequest {
            enrollment_id: self.name.clone(),
            enrollment_secret: secret.to_string(),
        };
        let enrollment = self
            .services
            .enrollment
            .enroll(&request)
            .map_err(|e| MemberError::Enrollment(e.to_string()))?;

        self.write_profile()?.enrollment = Some(enrollment.clone());
        tracing::info!(principal = %self.name, "enrolled");
        self.save_state();
        Ok(enrollment)
    }

    /// Register, then enroll with the secret registration returned. Any
    /// secret already on the request is only a suggestion to the registrar.
    pub fn register_and_enroll(&self, request: &RegistrationRequest) -> MemberResult<Enrollment> {
        let secret = self.register(request)?;
        self.enroll(&secret)
    }

    // -----------------------------------------------------------------------
    // Certificates
    // -----------------------------------------------------------------------

    /// Dispense one TCert carrying `attributes`.
    ///
    /// An empty attribute list always yields `NotApplicable` without
    /// touching any pool.
    pub fn get_certificate<S: AsRef<str>>(&self, attributes: &[S]) -> MemberResult<CertOutcome> {
        let enrollment = self
            .enrollment()?
            .ok_or_else(|| MemberError::NotEnrolled(self.name.clone()))?;

        let Some(key) = AttributeKey::from_attributes(attributes) else {
            return Ok(CertOutcome::NotApplicable);
        };
        let pool = self.pool_for(key, attributes)?;
        let outcome = pool.get_next(&enrollment)?;
        if let CertOutcome::IssuanceFailed { reason } = &outcome {
            tracing::debug!(
                principal = %self.name,
                attribute_key = %pool.attribute_key(),
                reason = %reason,
                "no TCert available"
            );
        }
        Ok(outcome)
    }

    /// Like `get_certificate` but yields the certificate itself, if any.
    pub fn get_user_cert<S: AsRef<str>>(&self, attributes: &[S]) -> MemberResult<Option<TCert>> {
        Ok(self.get_certificate(attributes)?.into_cert())
    }

    pub fn pool_stats<S: AsRef<str>>(&self, attributes: &[S]) -> MemberResult<Option<PoolStats>> {
        let Some(key) = AttributeKey::from_attributes(attributes) else {
            return Ok(None);
        };
        match self.lock_pools()?.get(&key) {
            Some(pool) => Ok(Some(pool.stats()?)),
            None => Ok(None),
        }
    }

    pub fn pool_count(&self) -> MemberResult<usize> {
        Ok(self.lock_pools()?.len())
    }

    /// Look up the pool for `key`, creating it under the map lock so two
    /// callers never build competing pools.
    fn pool_for<S: AsRef<str>>(
        &self,
        key: AttributeKey,
        attributes: &[S],
    ) -> MemberResult<Arc<CertificatePool>> {
        let mut pools = self.lock_pools()?;
        if let Some(pool) = pools.get(&key) {
            return Ok(Arc::clone(pool));
        }

        // Read under the map lock so a concurrent resize either sees this
        // pool or is seen by it.
        let batch_size = self.tcert_batch_size()?;
        let pool = Arc::new(CertificatePool::new(
            self.name.clone(),
            attributes.iter().map(|a| a.as_ref().to_string()).collect(),
            Arc::clone(&self.services.issuer),
            self.pool_settings.clone().with_batch_size(batch_size),
        )?);
        tracing::debug!(
            principal = %self.name,
            attribute_key = %key,
            batch_size,
            "created TCert pool"
        );
        pools.insert(key, Arc::clone(&pool));
        Ok(pool)
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    pub fn deploy(&self, request: &DeployRequest) -> MemberResult<ChainCodeResponse> {
        let context = self.transaction_context_for(TransactionKind::Deploy)?;
        context
            .deploy(request)
            .map_err(|e| MemberError::Transaction(e.to_string()))
    }

    pub fn invoke(&self, request: &InvokeRequest) -> MemberResult<ChainCodeResponse> {
        let context = self.transaction_context_for(TransactionKind::Invoke)?;
        context
            .invoke(request)
            .map_err(|e| MemberError::Transaction(e.to_string()))
    }

    pub fn query(&self, request: &QueryRequest) -> MemberResult<ChainCodeResponse> {
        let context = self.transaction_context_for(TransactionKind::Query)?;
        context
            .query(request)
            .map_err(|e| MemberError::Transaction(e.to_string()))
    }

    /// A transaction context for this principal, optionally bound to a TCert
    /// the caller already holds.
    pub fn new_transaction_context(&self, tcert: Option<TCert>) -> Box<dyn TransactionContext> {
        self.chain.new_transaction_context(&self.name, tcert)
    }

    fn transaction_context_for(
        &self,
        kind: TransactionKind,
    ) -> MemberResult<Box<dyn TransactionContext>> {
        if self.chain.active_peer_count() == 0 {
            tracing::warn!(principal = %self.name, %kind, "no active peer");
            return Err(MemberError::NoValidPeer(self.chain.name().to_string()));
        }
        tracing::debug!(principal = %self.name, %kind, "issuing transaction");
        Ok(self.new_transaction_context(None))
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn store_key(&self) -> StoreKey {
        StoreKey::for_member(&self.name)
    }

    pub fn snapshot(&self) -> MemberResult<IdentitySnapshot> {
        let profile = self.read_profile()?;
        Ok(IdentitySnapshot {
            version: SNAPSHOT_VERSION,
            name: self.name.clone(),
            roles: profile.roles.clone(),
            account: profile.account.clone(),
            affiliation: profile.affiliation.clone(),
            enrollment_secret: profile.enrollment_secret.clone(),
            enrollment: profile.enrollment.clone(),
        })
    }

    /// Write the durable fields to the state store. Failures are logged and
    /// otherwise ignored.
    pub fn save_state(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let result = self
            .snapshot()
            .and_then(|snapshot| snapshot.to_bytes())
            .and_then(|bytes| {
                store
                    .set(&self.store_key(), &bytes)
                    .map_err(|e| MemberError::Snapshot(e.to_string()))
            });
        if let Err(e) = result {
            tracing::warn!(principal = %self.name, error = %e, "failed to save identity state");
        }
    }

    /// Overwrite the durable fields from the state store.
    ///
    /// Returns `true` if a snapshot was applied. A missing snapshot is a
    /// no-op; an unreadable one is logged and ignored.
    pub fn restore_state(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match self.try_restore(store.as_ref()) {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(principal = %self.name, error = %e, "failed to restore identity state");
                false
            }
        }
    }

    fn try_restore(&self, store: &dyn StateStore) -> MemberResult<bool> {
        let Some(bytes) = store
            .get(&self.store_key())
            .map_err(|e| MemberError::Snapshot(e.to_string()))?
        else {
            return Ok(false);
        };
        let snapshot = IdentitySnapshot::from_bytes(&bytes)?;
        if snapshot.name != self.name {
            return Err(MemberError::Snapshot(format!(
                "snapshot belongs to '{}'",
                snapshot.name
            )));
        }

        let mut profile = self.write_profile()?;
        // Registration state only moves forward.
        if profile.enrollment.is_some() && snapshot.enrollment.is_none() {
            return Err(MemberError::Snapshot("snapshot would undo enrollment".into()));
        }
        let was_registered =
            profile.enrollment.is_some() || has_secret(&profile.enrollment_secret);
        let stays_registered =
            snapshot.enrollment.is_some() || has_secret(&snapshot.enrollment_secret);
        if was_registered && !stays_registered {
            return Err(MemberError::Snapshot("snapshot would undo registration".into()));
        }
        profile.roles = snapshot.roles;
        profile.account = snapshot.account;
        profile.affiliation = snapshot.affiliation;
        profile.enrollment_secret = snapshot.enrollment_secret;
        profile.enrollment = snapshot.enrollment;
        tracing::debug!(principal = %self.name, "restored identity state");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    fn read_profile(&self) -> MemberResult<RwLockReadGuard<'_, Profile>> {
        self.profile.read().map_err(|_| MemberError::LockPoisoned)
    }

    fn write_profile(&self) -> MemberResult<RwLockWriteGuard<'_, Profile>> {
        self.profile.write().map_err(|_| MemberError::LockPoisoned)
    }

    fn lock_pools(&self) -> MemberResult<MutexGuard<'_, HashMap<AttributeKey, Arc<CertificatePool>>>> {
        self.pools.lock().map_err(|_| MemberError::LockPoisoned)
    }
}

fn has_secret(secret: &Option<String>) -> bool {
    secret.as_deref().map_or(false, |s| !s.is_empty())
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("chain", &self.chain.name())
            .finish_non_exhaustive()
    }
}
