//! ECIES-style hybrid encryption.
//!
//! Wire layout, bit-exact:
//!
//! ```text
//! [ ephemeral public key | IV (16) || AES-CFB ciphertext | HMAC tag ]
//!   ephemeral_key_len      message_len                     mac_tag_len
//! ```
//!
//! Key schedule: ECDH shared secret → HKDF (no salt, no info) → first 32
//! bytes AES-256 key, next 32 bytes HMAC key. The tag covers the whole
//! message region and is checked before anything is decrypted.

use crate::config::{HashAlgorithm, SecurityLevel};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey};
use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use elliptic_curve::ecdh::{diffie_hellman, EphemeralSecret};
use elliptic_curve::sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint};
use elliptic_curve::{AffinePoint, CurveArithmetic, FieldBytesSize, SecretKey};
use rand::RngCore;
use zeroize::Zeroizing;

pub const IV_LEN: usize = 16;
pub const SYMMETRIC_KEY_LEN: usize = 32;
pub const MAC_KEY_LEN: usize = 32;

type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

/// Byte lengths of the three regions of a ciphertext blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CiphertextLayout {
    pub ephemeral_key_len: usize,
    pub message_len: usize,
    pub tag_len: usize,
}

impl CiphertextLayout {
    /// Split a blob of `blob_len` bytes for the given security level.
    ///
    /// The message region must hold at least the IV.
    pub fn for_blob(level: SecurityLevel, blob_len: usize) -> CryptoResult<Self> {
        let ephemeral_key_len = level.ephemeral_key_len();
        let tag_len = level.mac_tag_len();
        let message_len = blob_len
            .checked_sub(ephemeral_key_len + tag_len)
            .ok_or_else(|| {
                CryptoError::MalformedCiphertext(format!(
                    "{} bytes is shorter than the {} byte minimum",
                    blob_len,
                    ephemeral_key_len + tag_len
                ))
            })?;
        if message_len < IV_LEN {
            return Err(CryptoError::MalformedCiphertext(format!(
                "message region of {} bytes cannot hold a {} byte IV",
                message_len, IV_LEN
            )));
        }
        Ok(Self {
            ephemeral_key_len,
            message_len,
            tag_len,
        })
    }

    pub fn total_len(&self) -> usize {
        self.ephemeral_key_len + self.message_len + self.tag_len
    }
}

struct DerivedKeys {
    encryption_key: Zeroizing<[u8; SYMMETRIC_KEY_LEN]>,
    mac_key: Zeroizing<[u8; MAC_KEY_LEN]>,
}

fn derive_keys(hash: HashAlgorithm, shared_secret: &[u8]) -> CryptoResult<DerivedKeys> {
    let mut okm = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN + MAC_KEY_LEN]);
    hash.hkdf_expand(shared_secret, &mut *okm)?;

    let mut encryption_key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    let mut mac_key = Zeroizing::new([0u8; MAC_KEY_LEN]);
    encryption_key.copy_from_slice(&okm[..SYMMETRIC_KEY_LEN]);
    mac_key.copy_from_slice(&okm[SYMMETRIC_KEY_LEN..]);
    Ok(DerivedKeys {
        encryption_key,
        mac_key,
    })
}

pub(crate) fn decrypt(
    hash: HashAlgorithm,
    level: SecurityLevel,
    recipient: &PrivateKey,
    blob: &[u8],
) -> CryptoResult<Vec<u8>> {
    if recipient.security_level() != level {
        return Err(CryptoError::Decryption(format!(
            "recipient key is not on {}",
            level.curve_name()
        )));
    }

    let layout = CiphertextLayout::for_blob(level, blob.len())?;
    let (ephemeral, rest) = blob.split_at(layout.ephemeral_key_len);
    let (message, tag) = rest.split_at(layout.message_len);

    let shared_secret = match recipient {
        PrivateKey::P256(sk) => agree(sk, ephemeral)?,
        PrivateKey::P384(sk) => agree(sk, ephemeral)?,
    };
    let keys = derive_keys(hash, &shared_secret)?;

    if !hash.verify_hmac(&*keys.mac_key, message, tag)? {
        tracing::warn!(
            curve = level.curve_name(),
            blob_len = blob.len(),
            "ECIES tag mismatch"
        );
        return Err(CryptoError::AuthenticationFailure);
    }

    let (iv, ciphertext) = message.split_at(IV_LEN);
    let mut plaintext = ciphertext.to_vec();
    Aes256CfbDec::new_from_slices(&*keys.encryption_key, iv)
        .map_err(|e| CryptoError::Decryption(format!("cipher init failed: {}", e)))?
        .decrypt(&mut plaintext);
    Ok(plaintext)
}

pub(crate) fn encrypt(
    hash: HashAlgorithm,
    level: SecurityLevel,
    recipient: &PublicKey,
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    if recipient.security_level() != level {
        return Err(CryptoError::Encryption(format!(
            "recipient key is not on {}",
            level.curve_name()
        )));
    }

    let (ephemeral, shared_secret) = match recipient {
        PublicKey::P256(pk) => ephemeral_agree(pk),
        PublicKey::P384(pk) => ephemeral_agree(pk),
    };
    let keys = derive_keys(hash, &shared_secret)?;

    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::Encryption(format!("random source failed: {}", e)))?;

    let mut message = Vec::with_capacity(IV_LEN + plaintext.len());
    message.extend_from_slice(&iv);
    message.extend_from_slice(plaintext);
    Aes256CfbEnc::new_from_slices(&*keys.encryption_key, &iv)
        .map_err(|e| CryptoError::Encryption(format!("cipher init failed: {}", e)))?
        .encrypt(&mut message[IV_LEN..]);

    let tag = hash.hmac(&*keys.mac_key, &message)?;

    let mut blob = Vec::with_capacity(ephemeral.len() + message.len() + tag.len());
    blob.extend_from_slice(&ephemeral);
    blob.extend_from_slice(&message);
    blob.extend_from_slice(&tag);
    Ok(blob)
}

/// ECDH between a static secret and an encoded ephemeral point.
fn agree<C>(secret: &SecretKey<C>, ephemeral: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>>
where
    C: CurveArithmetic,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    FieldBytesSize<C>: ModulusSize,
{
    let public = elliptic_curve::PublicKey::<C>::from_sec1_bytes(ephemeral).map_err(|_| {
        CryptoError::MalformedCiphertext("ephemeral key is not a valid curve point".into())
    })?;
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
}

/// Fresh ephemeral key plus its ECDH secret with the recipient.
fn ephemeral_agree<C>(recipient: &elliptic_curve::PublicKey<C>) -> (Vec<u8>, Zeroizing<Vec<u8>>)
where
    C: CurveArithmetic,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    FieldBytesSize<C>: ModulusSize,
{
    let ephemeral = EphemeralSecret::<C>::random(&mut rand::rngs::OsRng);
    let encoded = ephemeral
        .public_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec();
    let shared = ephemeral.diffie_hellman(recipient);
    (encoded, Zeroizing::new(shared.raw_secret_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashFamily;
    use crate::keys::generate_key_pair;

    fn all_configs() -> Vec<(HashAlgorithm, SecurityLevel)> {
        let mut out = Vec::new();
        for family in [HashFamily::Sha2, HashFamily::Sha3] {
            for level in [SecurityLevel::Level256, SecurityLevel::Level384] {
                out.push((HashAlgorithm::select(family, level), level));
            }
        }
        out
    }

    #[test]
    fn test_roundtrip_all_configs() {
        for (hash, level) in all_configs() {
            let kp = generate_key_pair(level).unwrap();
            let plaintext = b"confidential chaincode payload";
            let blob = encrypt(hash, level, &kp.public_key, plaintext).unwrap();
            let decrypted = decrypt(hash, level, &kp.private_key, &blob).unwrap();
            assert_eq!(decrypted, plaintext, "{} / {}", hash, level);
        }
    }

    #[test]
    fn test_blob_layout_lengths() {
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha256;
        let kp = generate_key_pair(level).unwrap();
        let blob = encrypt(hash, level, &kp.public_key, &[0u8; 10]).unwrap();
        assert_eq!(blob.len(), 65 + 16 + 10 + 32);
        assert_eq!(blob[0], 0x04);

        let layout = CiphertextLayout::for_blob(level, blob.len()).unwrap();
        assert_eq!(layout.ephemeral_key_len, 65);
        assert_eq!(layout.message_len, 26);
        assert_eq!(layout.tag_len, 32);
        assert_eq!(layout.total_len(), blob.len());
    }

    #[test]
    fn test_blob_layout_lengths_384() {
        let level = SecurityLevel::Level384;
        let hash = HashAlgorithm::Sha3_384;
        let kp = generate_key_pair(level).unwrap();
        let blob = encrypt(hash, level, &kp.public_key, b"x").unwrap();
        assert_eq!(blob.len(), 97 + 16 + 1 + 48);
    }

    #[test]
    fn test_empty_plaintext() {
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha3_256;
        let kp = generate_key_pair(level).unwrap();
        let blob = encrypt(hash, level, &kp.public_key, b"").unwrap();
        assert_eq!(decrypt(hash, level, &kp.private_key, &blob).unwrap(), b"");
    }

    #[test]
    fn test_plaintext_not_block_aligned() {
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha256;
        let kp = generate_key_pair(level).unwrap();
        let plaintext: Vec<u8> = (0..=100u8).collect();
        let blob = encrypt(hash, level, &kp.public_key, &plaintext).unwrap();
        assert_eq!(decrypt(hash, level, &kp.private_key, &blob).unwrap(), plaintext);
    }

    #[test]
    fn test_tamper_every_tag_byte() {
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha256;
        let kp = generate_key_pair(level).unwrap();
        let blob = encrypt(hash, level, &kp.public_key, b"integrity").unwrap();
        let tag_start = blob.len() - level.mac_tag_len();
        for i in tag_start..blob.len() {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                decrypt(hash, level, &kp.private_key, &tampered),
                Err(CryptoError::AuthenticationFailure),
                "tag byte {}",
                i
            );
        }
    }

    #[test]
    fn test_tamper_message_region() {
        let level = SecurityLevel::Level384;
        let hash = HashAlgorithm::Sha384;
        let kp = generate_key_pair(level).unwrap();
        let blob = encrypt(hash, level, &kp.public_key, b"integrity").unwrap();
        let ek = level.ephemeral_key_len();
        for i in [ek, ek + IV_LEN - 1, ek + IV_LEN] {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x80;
            assert_eq!(
                decrypt(hash, level, &kp.private_key, &tampered),
                Err(CryptoError::AuthenticationFailure)
            );
        }
    }

    #[test]
    fn test_wrong_recipient_fails_authentication() {
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha256;
        let alice = generate_key_pair(level).unwrap();
        let mallory = generate_key_pair(level).unwrap();
        let blob = encrypt(hash, level, &alice.public_key, b"for alice").unwrap();
        assert_eq!(
            decrypt(hash, level, &mallory.private_key, &blob),
            Err(CryptoError::AuthenticationFailure)
        );
    }

    #[test]
    fn test_short_blob_is_malformed() {
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha256;
        let kp = generate_key_pair(level).unwrap();
        for len in [0, 1, 64, 65, 96] {
            let blob = vec![0x04u8; len];
            assert!(matches!(
                decrypt(hash, level, &kp.private_key, &blob),
                Err(CryptoError::MalformedCiphertext(_))
            ));
        }
    }

    #[test]
    fn test_message_shorter_than_iv_is_malformed() {
        let level = SecurityLevel::Level256;
        assert!(CiphertextLayout::for_blob(level, 65 + 32 + 15).is_err());
        assert!(CiphertextLayout::for_blob(level, 65 + 32 + 16).is_ok());
    }

    #[test]
    fn test_invalid_ephemeral_point_is_malformed() {
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha256;
        let kp = generate_key_pair(level).unwrap();
        let mut blob = encrypt(hash, level, &kp.public_key, b"payload").unwrap();
        // X = Y = 2^256 - 1 lies outside the field.
        for b in blob[1..65].iter_mut() {
            *b = 0xFF;
        }
        assert!(matches!(
            decrypt(hash, level, &kp.private_key, &blob),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_curve_mismatch_rejected() {
        let kp = generate_key_pair(SecurityLevel::Level384).unwrap();
        let err = encrypt(
            HashAlgorithm::Sha256,
            SecurityLevel::Level256,
            &kp.public_key,
            b"x",
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::Encryption(_)));

        let blob = vec![0u8; 200];
        let err = decrypt(
            HashAlgorithm::Sha256,
            SecurityLevel::Level256,
            &kp.private_key,
            &blob,
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(_)));
    }

    #[test]
    fn test_fresh_ephemeral_per_encryption() {
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha256;
        let kp = generate_key_pair(level).unwrap();
        let a = encrypt(hash, level, &kp.public_key, b"same").unwrap();
        let b = encrypt(hash, level, &kp.public_key, b"same").unwrap();
        assert_ne!(a[..65], b[..65]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_keys_splits_hkdf_stream() {
        let hash = HashAlgorithm::Sha256;
        let secret = [0x11u8; 32];
        let keys = derive_keys(hash, &secret).unwrap();
        let mut stream = [0u8; 64];
        hash.hkdf_expand(&secret, &mut stream).unwrap();
        assert_eq!(&keys.encryption_key[..], &stream[..32]);
        assert_eq!(&keys.mac_key[..], &stream[32..]);
    }

    #[test]
    fn test_hand_assembled_blob_decrypts() {
        // Build a blob from the documented steps without going through encrypt().
        let level = SecurityLevel::Level256;
        let hash = HashAlgorithm::Sha3_256;
        let recipient = generate_key_pair(level).unwrap();
        let ephemeral = generate_key_pair(level).unwrap();

        let (PrivateKey::P256(eph_sk), PublicKey::P256(rcpt_pk)) =
            (&ephemeral.private_key, &recipient.public_key)
        else {
            panic!("expected P-256 keys");
        };
        let shared = diffie_hellman(eph_sk.to_nonzero_scalar(), rcpt_pk.as_affine());
        let mut okm = [0u8; 64];
        hash.hkdf_expand(shared.raw_secret_bytes(), &mut okm).unwrap();

        let iv = [0x24u8; IV_LEN];
        let mut message = iv.to_vec();
        let mut ct = b"hand assembled".to_vec();
        Aes256CfbEnc::new_from_slices(&okm[..32], &iv)
            .unwrap()
            .encrypt(&mut ct);
        message.extend_from_slice(&ct);
        let tag = hash.hmac(&okm[32..], &message).unwrap();

        let mut blob = ephemeral.public_key.to_uncompressed_bytes();
        blob.extend_from_slice(&message);
        blob.extend_from_slice(&tag);

        let plaintext = decrypt(hash, level, &recipient.private_key, &blob).unwrap();
        assert_eq!(plaintext, b"hand assembled");
    }
}
