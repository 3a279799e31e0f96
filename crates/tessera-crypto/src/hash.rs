use crate::config::HashAlgorithm;
use crate::error::{CryptoError, CryptoResult};
use hkdf::SimpleHkdf;
use hmac::digest::core_api::BlockSizeUser;
use hmac::digest::Digest;
use hmac::{Mac, SimpleHmac};
use sha2::{Sha256, Sha384};
use sha3::{Sha3_256, Sha3_384};
use subtle::ConstantTimeEq;

impl HashAlgorithm {
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha3_256 => Sha3_256::digest(data).to_vec(),
            HashAlgorithm::Sha3_384 => Sha3_384::digest(data).to_vec(),
        }
    }

    pub fn hmac(&self, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
        match self {
            HashAlgorithm::Sha256 => hmac_with::<Sha256>(key, data),
            HashAlgorithm::Sha384 => hmac_with::<Sha384>(key, data),
            HashAlgorithm::Sha3_256 => hmac_with::<Sha3_256>(key, data),
            HashAlgorithm::Sha3_384 => hmac_with::<Sha3_384>(key, data),
        }
    }

    /// Recompute the HMAC over `data` and compare it to `tag` in constant time.
    pub fn verify_hmac(&self, key: &[u8], data: &[u8], tag: &[u8]) -> CryptoResult<bool> {
        let expected = self.hmac(key, data)?;
        Ok(expected.as_slice().ct_eq(tag).into())
    }

    /// HKDF with no salt and no info, filling `okm` from the start of the
    /// output stream.
    pub fn hkdf_expand(&self, ikm: &[u8], okm: &mut [u8]) -> CryptoResult<()> {
        match self {
            HashAlgorithm::Sha256 => hkdf_with::<Sha256>(ikm, okm),
            HashAlgorithm::Sha384 => hkdf_with::<Sha384>(ikm, okm),
            HashAlgorithm::Sha3_256 => hkdf_with::<Sha3_256>(ikm, okm),
            HashAlgorithm::Sha3_384 => hkdf_with::<Sha3_384>(ikm, okm),
        }
    }
}

fn hmac_with<D>(key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>>
where
    D: Digest + BlockSizeUser,
{
    let mut mac = <SimpleHmac<D> as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::KeyDerivation(format!("HMAC init failed: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hkdf_with<D>(ikm: &[u8], okm: &mut [u8]) -> CryptoResult<()>
where
    D: Digest + BlockSizeUser + Clone,
{
    let hk = SimpleHkdf::<D>::new(None, ikm);
    hk.expand(&[], okm)
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {}", e)))
}
