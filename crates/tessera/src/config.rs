use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_crypto::{CryptoEngine, HashFamily, SecurityLevel};
use tessera_pool::PoolSettings;

use crate::error::{RootError, RootResult};

/// Hash family and curve for the whole network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CryptoConfig {
    /// `SHA2` or `SHA3`, case-insensitive.
    #[serde(default = "default_hash_family")]
    pub hash_family: String,

    /// 256 (secp256r1) or 384 (secp384r1).
    #[serde(default = "default_security_level")]
    pub security_level: u32,
}

fn default_hash_family() -> String {
    "SHA3".to_string()
}

fn default_security_level() -> u32 {
    256
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            hash_family: default_hash_family(),
            security_level: default_security_level(),
        }
    }
}

/// TCert pool behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Certificates per batch when neither the identity nor the chain
    /// sets a size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound on one batch fetch, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Refill in the background before the cache runs dry.
    #[serde(default)]
    pub prefetch: bool,

    /// Slack added to the average fetch latency when prefetching.
    #[serde(default = "default_prefetch_buffer_ms")]
    pub prefetch_buffer_ms: u64,
}

fn default_batch_size() -> usize {
    tessera_pool::DEFAULT_BATCH_SIZE
}

fn default_fetch_timeout_ms() -> u64 {
    tessera_pool::DEFAULT_FETCH_TIMEOUT.as_millis() as u64
}

fn default_prefetch_buffer_ms() -> u64 {
    tessera_pool::DEFAULT_PREFETCH_BUFFER.as_millis() as u64
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            prefetch: false,
            prefetch_buffer_ms: default_prefetch_buffer_ms(),
        }
    }
}

impl PoolConfig {
    pub fn settings(&self) -> PoolSettings {
        let settings = PoolSettings::default()
            .with_batch_size(self.batch_size)
            .with_fetch_timeout(Duration::from_millis(self.fetch_timeout_ms));
        if self.prefetch {
            settings.with_prefetch(Duration::from_millis(self.prefetch_buffer_ms))
        } else {
            settings
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives. `RUST_LOG` wins when set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "tessera=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// Top-level configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootConfig {
    #[serde(default)]
    pub crypto: CryptoConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> RootResult<()> {
        self.crypto
            .hash_family
            .parse::<HashFamily>()
            .map_err(|e| RootError::Config(e.to_string()))?;
        SecurityLevel::try_from(self.crypto.security_level)
            .map_err(|e| RootError::Config(e.to_string()))?;
        if self.pool.batch_size == 0 {
            return Err(RootError::Config("pool.batch_size must be > 0".into()));
        }
        if self.pool.fetch_timeout_ms == 0 {
            return Err(RootError::Config("pool.fetch_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Build the crypto engine this configuration describes.
    pub fn crypto_engine(&self) -> RootResult<CryptoEngine> {
        CryptoEngine::new(&self.crypto.hash_family, self.crypto.security_level)
            .map_err(|e| RootError::Config(e.to_string()))
    }

    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".tessera/config.toml")
    }
}
