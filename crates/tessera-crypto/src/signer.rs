//! Deterministic ECDSA with decimal-string signature components.
//!
//! The nonce comes from an RFC 6979 HMAC-DRBG keyed with SHA-512 no matter
//! which digest hashes the message. `r` and `s` leave this module as the
//! ASCII decimal text of each integer, which is what peers on the wire expect.

use crate::config::{HashAlgorithm, SecurityLevel};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey};
use ecdsa::hazmat::{bits2field, SignPrimitive, VerifyPrimitive};
use ecdsa::signature::hazmat::PrehashVerifier;
use ecdsa::{Signature, SignatureSize, VerifyingKey};
use elliptic_curve::generic_array::{ArrayLength, GenericArray};
use elliptic_curve::ops::Reduce;
use elliptic_curve::sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint};
use elliptic_curve::{
    AffinePoint, CurveArithmetic, FieldBytes, FieldBytesSize, NonZeroScalar, PrimeCurve, Scalar,
    SecretKey,
};
use num_bigint::BigUint;
use rfc6979::HmacDrbg;
use sha2::Sha512;

/// Upper bound on DRBG draws before giving up on a nonce.
const MAX_NONCE_DRAWS: usize = 64;

/// ECDSA signature as two ASCII decimal strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaSignature {
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

impl EcdsaSignature {
    pub fn r_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.r).ok()
    }

    pub fn s_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.s).ok()
    }
}

pub(crate) fn sign(
    hash: HashAlgorithm,
    level: SecurityLevel,
    key: &PrivateKey,
    message: &[u8],
) -> CryptoResult<EcdsaSignature> {
    if key.security_level() != level {
        return Err(CryptoError::Signing(format!(
            "private key is not on {}",
            level.curve_name()
        )));
    }

    let digest = hash.digest(message);
    let (r, s) = match key {
        PrivateKey::P256(sk) => sign_prehashed(sk, &digest)?,
        PrivateKey::P384(sk) => sign_prehashed(sk, &digest)?,
    };
    Ok(EcdsaSignature {
        r: to_decimal(&r),
        s: to_decimal(&s),
    })
}

pub(crate) fn verify(
    hash: HashAlgorithm,
    level: SecurityLevel,
    key: &PublicKey,
    message: &[u8],
    signature: &EcdsaSignature,
) -> CryptoResult<bool> {
    if key.security_level() != level {
        return Err(CryptoError::Signing(format!(
            "public key is not on {}",
            level.curve_name()
        )));
    }

    let field_len = level.field_len();
    let (Some(r), Some(s)) = (
        from_decimal(&signature.r, field_len),
        from_decimal(&signature.s, field_len),
    ) else {
        return Ok(false);
    };

    let digest = hash.digest(message);
    let valid = match key {
        PublicKey::P256(pk) => verify_prehashed(pk, &digest, &r, &s),
        PublicKey::P384(pk) => verify_prehashed(pk, &digest, &r, &s),
    };
    Ok(valid)
}

fn sign_prehashed<C>(secret: &SecretKey<C>, digest: &[u8]) -> CryptoResult<(Vec<u8>, Vec<u8>)>
where
    C: PrimeCurve + CurveArithmetic,
    Scalar<C>: SignPrimitive<C>,
    SignatureSize<C>: ArrayLength<u8>,
{
    let z = bits2field::<C>(digest)
        .map_err(|_| CryptoError::Signing("digest too short for curve".into()))?;
    let d: Scalar<C> = *secret.to_nonzero_scalar();
    let x = secret.to_bytes();
    let h: FieldBytes<C> = <Scalar<C> as Reduce<C::Uint>>::reduce_bytes(&z).into();

    let k = derive_nonce::<C>(&x, &h)?;
    let (signature, _) = d
        .try_sign_prehashed(k, &z)
        .map_err(|_| CryptoError::Signing("signature computation failed".into()))?;

    let (r, s) = signature.split_bytes();
    Ok((r.to_vec(), s.to_vec()))
}

/// RFC 6979 §3.2 with SHA-512 as the HMAC hash.
fn derive_nonce<C>(x: &FieldBytes<C>, h: &FieldBytes<C>) -> CryptoResult<Scalar<C>>
where
    C: PrimeCurve + CurveArithmetic,
{
    let mut drbg = HmacDrbg::<Sha512>::new(x, h, &[]);
    for _ in 0..MAX_NONCE_DRAWS {
        let mut candidate: FieldBytes<C> = GenericArray::default();
        drbg.fill_bytes(&mut candidate);
        let k: Option<NonZeroScalar<C>> = NonZeroScalar::<C>::from_repr(candidate).into();
        if let Some(k) = k {
            return Ok(*k.as_ref());
        }
    }
    Err(CryptoError::Signing("nonce derivation did not converge".into()))
}

fn verify_prehashed<C>(
    public: &elliptic_curve::PublicKey<C>,
    digest: &[u8],
    r: &[u8],
    s: &[u8],
) -> bool
where
    C: PrimeCurve + CurveArithmetic,
    AffinePoint<C>: VerifyPrimitive<C> + FromEncodedPoint<C> + ToEncodedPoint<C>,
    FieldBytesSize<C>: ModulusSize,
    SignatureSize<C>: ArrayLength<u8>,
{
    let r = FieldBytes::<C>::clone_from_slice(r);
    let s = FieldBytes::<C>::clone_from_slice(s);
    let Ok(signature) = Signature::<C>::from_scalars(r, s) else {
        return false;
    };
    VerifyingKey::<C>::from(public)
        .verify_prehash(digest, &signature)
        .is_ok()
}

fn to_decimal(be_bytes: &[u8]) -> Vec<u8> {
    BigUint::from_bytes_be(be_bytes)
        .to_str_radix(10)
        .into_bytes()
}

/// Parse ASCII decimal into a big-endian integer left-padded to `width`.
///
/// Returns `None` for empty input, non-digits, or values wider than `width`.
fn from_decimal(digits: &[u8], width: usize) -> Option<Vec<u8>> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = BigUint::parse_bytes(digits, 10)?;
    let bytes = value.to_bytes_be();
    if bytes.len() > width {
        return None;
    }
    let mut padded = vec![0u8; width - bytes.len()];
    padded.extend_from_slice(&bytes);
    Some(padded)
}
