//! A member of a permissioned chain: registration, enrollment, pooled
//! transaction certificates and snapshot persistence.

pub mod error;
pub mod identity;
pub mod memory_store;
pub mod snapshot;

pub use error::*;
pub use identity::{Identity, MemberServices};
pub use memory_store::InMemoryStateStore;
pub use snapshot::{IdentitySnapshot, SNAPSHOT_VERSION};
