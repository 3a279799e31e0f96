use crate::error::TesseraResult;
use crate::types::{
    ChainCodeResponse, DeployRequest, Enrollment, EnrollmentRequest, InvokeRequest, QueryRequest,
    Registrar, RegistrationRequest, StoreKey, TCert, TCertBatchRequest,
};

// ---------------------------------------------------------------------------
// Member services: the network side of registration, enrollment and
// certificate issuance. Wire encoding lives with the transport, not here.
// ---------------------------------------------------------------------------

pub trait CertificateIssuer: Send + Sync {
    /// Fetch a batch of transaction certificates for one attribute set.
    fn fetch_batch(&self, request: &TCertBatchRequest) -> TesseraResult<Vec<TCert>>;
}

pub trait RegistrationService: Send + Sync {
    /// Register a principal and return its one-time enrollment secret.
    fn register(
        &self,
        request: &RegistrationRequest,
        registrar: Option<&Registrar>,
    ) -> TesseraResult<String>;
}

pub trait EnrollmentService: Send + Sync {
    fn enroll(&self, request: &EnrollmentRequest) -> TesseraResult<Enrollment>;
}

// ---------------------------------------------------------------------------
// StateStore: key/value persistence for identity snapshots
//
// Values are opaque bytes; the store never sees live objects.
// ---------------------------------------------------------------------------

pub trait StateStore: Send + Sync {
    fn get(&self, key: &StoreKey) -> TesseraResult<Option<Vec<u8>>>;
    fn set(&self, key: &StoreKey, value: &[u8]) -> TesseraResult<()>;
}

// ---------------------------------------------------------------------------
// Chain: peers, defaults and transaction contexts of the surrounding network
// ---------------------------------------------------------------------------

pub trait ChainContext: Send + Sync {
    fn name(&self) -> &str;

    /// Number of peers currently known to be active.
    fn active_peer_count(&self) -> usize;

    /// Network-wide default TCert batch size.
    fn tcert_batch_size(&self) -> usize;

    fn registrar(&self) -> Option<Registrar>;

    /// Create a context for one or more transactions, optionally bound to a
    /// pre-fetched certificate.
    fn new_transaction_context(
        &self,
        principal: &str,
        tcert: Option<TCert>,
    ) -> Box<dyn TransactionContext>;
}

pub trait TransactionContext: Send {
    fn deploy(&self, request: &DeployRequest) -> TesseraResult<ChainCodeResponse>;
    fn invoke(&self, request: &InvokeRequest) -> TesseraResult<ChainCodeResponse>;
    fn query(&self, request: &QueryRequest) -> TesseraResult<ChainCodeResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify the trait objects are object-safe
    fn _assert_issuer_object_safe(_: &dyn CertificateIssuer) {}
    fn _assert_registration_object_safe(_: &dyn RegistrationService) {}
    fn _assert_enrollment_object_safe(_: &dyn EnrollmentService) {}
    fn _assert_store_object_safe(_: &dyn StateStore) {}
    fn _assert_chain_object_safe(_: &dyn ChainContext) {}
    fn _assert_tx_object_safe(_: &dyn TransactionContext) {}

    struct FixedIssuer;

    impl CertificateIssuer for FixedIssuer {
        fn fetch_batch(&self, request: &TCertBatchRequest) -> TesseraResult<Vec<TCert>> {
            Ok((0..request.num)
                .map(|i| TCert::new(vec![i as u8], vec![]))
                .collect())
        }
    }

    #[test]
    fn test_issuer_honours_batch_size() {
        let request = TCertBatchRequest {
            name: "alice".into(),
            enrollment: Enrollment {
                key: vec![],
                cert: vec![],
                chain_key: String::new(),
            },
            num: 3,
            attributes: vec!["role".into()],
        };
        let batch = FixedIssuer.fetch_batch(&request).unwrap();
        assert_eq!(batch.len(), 3);
    }
}
