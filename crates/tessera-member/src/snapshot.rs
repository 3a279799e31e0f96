//! Durable part of an identity, as stored in the state store.
//!
//! Only plain data is captured here. Service handles, the chain and the
//! certificate pools are rebuilt by whoever constructs the identity.

use crate::error::{MemberError, MemberResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::Enrollment;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub affiliation: String,
    #[serde(default)]
    pub enrollment_secret: Option<String>,
    #[serde(default)]
    pub enrollment: Option<Enrollment>,
}

impl IdentitySnapshot {
    pub fn to_bytes(&self) -> MemberResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MemberError::Snapshot(e.to_string()))
    }

    /// Decode a stored snapshot. Versions other than the current one are
    /// rejected rather than guessed at.
    pub fn from_bytes(bytes: &[u8]) -> MemberResult<Self> {
        let snapshot: Self =
            serde_json::from_slice(bytes).map_err(|e| MemberError::Snapshot(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MemberError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

impl fmt::Debug for IdentitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySnapshot")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("roles", &self.roles)
            .field("account", &self.account)
            .field("affiliation", &self.affiliation)
            .field(
                "enrollment_secret",
                &self.enrollment_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("enrollment", &self.enrollment)
            .finish()
    }
}
