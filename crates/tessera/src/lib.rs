//! Tessera
//!
//! Identity core for a permissioned ledger client. Ties together the crypto
//! engine (ECIES, deterministic ECDSA), per-attribute TCert pools and member
//! identities, and owns configuration and logging setup.
//!
//! Wire transport to member services and peers is supplied by the caller
//! through the collaborator traits in `tessera_core`.

pub mod config;
pub mod error;

pub use config::{CryptoConfig, LoggingConfig, PoolConfig, RootConfig};
pub use error::{RootError, RootResult};

pub use tessera_crypto::{CryptoEngine, EcdsaSignature, HashFamily, SecurityLevel};
pub use tessera_member::{Identity, InMemoryStateStore, MemberServices};
pub use tessera_pool::{CertOutcome, PoolStats};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tessera_core::{ChainContext, StateStore, TCert};
use tracing::info;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` overrides `filter` when set. Returns `false` if a subscriber
/// was already installed, which makes repeated calls harmless.
pub fn init_tracing(filter: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Entry point: one crypto engine and the identities known on one chain.
///
/// Identities are created on first use and restored from the state store
/// when a snapshot exists.
pub struct Client {
    config: RootConfig,
    engine: CryptoEngine,
    chain: Arc<dyn ChainContext>,
    services: MemberServices,
    store: Option<Arc<dyn StateStore>>,
    members: Mutex<HashMap<String, Arc<Identity>>>,
}

impl Client {
    pub fn new(
        config: RootConfig,
        chain: Arc<dyn ChainContext>,
        services: MemberServices,
        store: Option<Arc<dyn StateStore>>,
    ) -> RootResult<Self> {
        config.validate()?;
        let engine = config.crypto_engine()?;
        info!(
            chain = chain.name(),
            hash_family = %engine.hash_family(),
            security_level = %engine.security_level(),
            "client initialized"
        );
        Ok(Self {
            config,
            engine,
            chain,
            services,
            store,
            members: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    pub fn engine(&self) -> &CryptoEngine {
        &self.engine
    }

    pub fn chain(&self) -> &Arc<dyn ChainContext> {
        &self.chain
    }

    /// The identity for `name`, created and restored on first request.
    pub fn member(&self, name: &str) -> RootResult<Arc<Identity>> {
        let mut members = self
            .members
            .lock()
            .map_err(|_| RootError::Member(tessera_member::MemberError::LockPoisoned))?;
        if let Some(identity) = members.get(name) {
            return Ok(Arc::clone(identity));
        }

        let identity = Arc::new(Identity::new(
            name,
            Arc::clone(&self.chain),
            self.services.clone(),
            self.store.clone(),
            self.config.pool.settings(),
        ));
        if identity.restore_state() {
            info!(principal = name, "identity restored from state store");
        }
        members.insert(name.to_string(), Arc::clone(&identity));
        Ok(identity)
    }

    pub fn member_names(&self) -> RootResult<Vec<String>> {
        let members = self
            .members
            .lock()
            .map_err(|_| RootError::Member(tessera_member::MemberError::LockPoisoned))?;
        let mut names: Vec<String> = members.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Decrypt an ECIES blob addressed to a TCert's key.
    pub fn decrypt_for_tcert(&self, tcert: &TCert, blob: &[u8]) -> RootResult<Vec<u8>> {
        let key = self.engine.import_private_key(&tcert.private_key)?;
        Ok(self.engine.ecies_decrypt(&key, blob)?)
    }

    /// Sign `message` with a TCert's key.
    pub fn sign_with_tcert(&self, tcert: &TCert, message: &[u8]) -> RootResult<EcdsaSignature> {
        let key = self.engine.import_private_key(&tcert.private_key)?;
        Ok(self.engine.ecdsa_sign(&key, message)?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("chain", &self.chain.name())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
