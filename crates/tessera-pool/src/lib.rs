pub mod error;
pub mod policy;
pub mod pool;
pub mod types;

pub use error::*;
pub use policy::{policy_for, PrefetchPolicy, RefillPolicy, RefillWhenEmpty};
pub use pool::CertificatePool;
pub use types::*;
