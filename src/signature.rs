//! Detached signature verification against the configured signing key.

use chrono::{DateTime, Duration, Utc};
use pgp::packet::Signature;
use pgp::types::PublicKeyTrait;
use pgp::{Deserializable, SignedPublicKey, SignedPublicSubKey, StandaloneSignature};
use tracing::{debug, warn};

use crate::error::{AkdError, ConfigError, Result};

/// Capability to check a detached signature over some data
pub trait DetachedVerifier: Send + Sync {
    /// Returns `Ok(true)` when `signature` is a valid signature over `data`
    /// at time `now`, `Ok(false)` when it is well-formed but does not verify,
    /// and `Err(SignatureFormat)` when it cannot be interpreted at all.
    fn verify_detached(&self, data: &[u8], signature: &[u8], now: DateTime<Utc>) -> Result<bool>;
}

/// OpenPGP public key that AKDS records must be signed with
#[derive(Debug, Clone)]
pub struct TrustedKey {
    key: SignedPublicKey,
}

impl TrustedKey {
    /// Parse an ASCII-armored OpenPGP public key block
    pub fn from_armored(armored: &str) -> std::result::Result<Self, ConfigError> {
        let (key, _headers) = SignedPublicKey::from_string(armored)
            .map_err(|e| ConfigError::InvalidPublicKey(e.to_string()))?;

        key.verify()
            .map_err(|e| ConfigError::InvalidPublicKey(format!("bad self-signature: {}", e)))?;

        debug!(
            "Loaded signing key {:?} with {} subkeys",
            key.key_id(),
            key.public_subkeys.len()
        );
        Ok(Self { key })
    }
}

impl DetachedVerifier for TrustedKey {
    fn verify_detached(&self, data: &[u8], signature: &[u8], now: DateTime<Utc>) -> Result<bool> {
        let signature = StandaloneSignature::from_bytes(signature)
            .map_err(|e| AkdError::SignatureFormat(e.to_string()))?;

        if let Some(created) = signature.signature.created() {
            if *created > now {
                warn!("Signature creation time {} is in the future", created);
                return Ok(false);
            }
            if expired(created, signature.signature.signature_expiration_time(), now) {
                warn!("Signature created {} has expired", created);
                return Ok(false);
            }
        }

        // An expired primary key takes its subkeys with it
        let primary_expiry = self.key.details.key_expiration_time();
        if expired(self.key.primary_key.created_at(), primary_expiry.as_ref(), now) {
            warn!("Signing key {:?} has expired", self.key.key_id());
            return Ok(false);
        }

        if signature.verify(&self.key, data).is_ok() {
            return Ok(true);
        }

        let by_subkey = self
            .key
            .public_subkeys
            .iter()
            .filter(|subkey| usable_for_signing(subkey, now))
            .any(|subkey| signature.verify(&subkey.key, data).is_ok());
        Ok(by_subkey)
    }
}

/// Whether a validity period starting at `start` has run out by `now`.
/// A missing or zero period never expires.
fn expired(start: &DateTime<Utc>, validity: Option<&Duration>, now: DateTime<Utc>) -> bool {
    match validity {
        Some(validity) if *validity > Duration::zero() => *start + *validity <= now,
        _ => false,
    }
}

/// Newest binding signature of a subkey
fn binding(subkey: &SignedPublicSubKey) -> Option<&Signature> {
    subkey.signatures.iter().max_by_key(|sig| sig.created().copied())
}

/// A subkey may verify data signatures only if its binding grants the sign
/// capability and the key has not expired
fn usable_for_signing(subkey: &SignedPublicSubKey, now: DateTime<Utc>) -> bool {
    let Some(binding) = binding(subkey) else {
        return false;
    };
    if !binding.key_flags().sign() {
        debug!("Skipping subkey {:?} without the sign capability", subkey.key.key_id());
        return false;
    }
    if expired(subkey.key.created_at(), binding.key_expiration_time(), now) {
        warn!("Signing subkey {:?} has expired", subkey.key.key_id());
        return false;
    }
    true
}

/// Verify `signature` over `data` with the configured key, if any.
///
/// An empty signature is reported before a missing key.
pub fn verify_signature(
    data: &[u8],
    signature: &[u8],
    key: Option<&dyn DetachedVerifier>,
    now: DateTime<Utc>,
) -> Result<bool> {
    if signature.is_empty() {
        return Err(AkdError::EmptySignature);
    }

    let key = key.ok_or(AkdError::NoPublicKeyConfigured)?;
    key.verify_detached(data, signature, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use chrono::TimeZone;

    const SIGNER: &str = include_str!("../tests/fixtures/signer.asc");
    const OTHER: &str = include_str!("../tests/fixtures/other.asc");
    const KEYS: &str = include_str!("../tests/fixtures/authorized_keys");
    const KEYS_SIG: &str = include_str!("../tests/fixtures/authorized_keys.sig.b64");
    // Keys and signatures below are over SHORT_KEY, all made 2026-10-18T22:55Z
    const SHORT_KEY: &[u8] = b"ssh-ed25519 AAAA";
    /// Primary key that expires one day after creation
    const EXPIRING: &str = include_str!("../tests/fixtures/expiring.asc");
    const EXPIRING_KEY_SIG: &str = include_str!("../tests/fixtures/expiring_key.sig.b64");
    /// Certify-only primary with an ed25519 signing subkey
    const SUBKEY_SIGNER: &str = include_str!("../tests/fixtures/subkey_signer.asc");
    /// The same subkey rebound with the authentication capability only
    const SUBKEY_AUTH_ONLY: &str = include_str!("../tests/fixtures/subkey_auth_only.asc");
    const SUBKEY_SIG: &str = include_str!("../tests/fixtures/subkey.sig.b64");
    /// Made by the signing subkey with a one day signature lifetime
    const EXPIRING_SIG: &str = include_str!("../tests/fixtures/expiring_sig.sig.b64");

    fn later() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn sig() -> Vec<u8> {
        decode(KEYS_SIG)
    }

    fn decode(b64: &str) -> Vec<u8> {
        BASE64.decode(b64.trim()).unwrap()
    }

    fn next_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_valid_signature() {
        let key = TrustedKey::from_armored(SIGNER).unwrap();
        assert!(key.verify_detached(KEYS.as_bytes(), &sig(), later()).unwrap());
    }

    #[test]
    fn test_tampered_data() {
        let key = TrustedKey::from_armored(SIGNER).unwrap();
        let mut data = KEYS.as_bytes().to_vec();
        data[0] ^= 0x01;
        assert!(!key.verify_detached(&data, &sig(), later()).unwrap());
    }

    #[test]
    fn test_wrong_key() {
        let key = TrustedKey::from_armored(OTHER).unwrap();
        assert!(!key.verify_detached(KEYS.as_bytes(), &sig(), later()).unwrap());
    }

    #[test]
    fn test_signature_from_the_future() {
        let key = TrustedKey::from_armored(SIGNER).unwrap();
        let before = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(!key.verify_detached(KEYS.as_bytes(), &sig(), before).unwrap());
    }

    #[test]
    fn test_garbage_signature_is_format_error() {
        let key = TrustedKey::from_armored(SIGNER).unwrap();
        assert!(matches!(
            key.verify_detached(KEYS.as_bytes(), b"not a signature", later()),
            Err(AkdError::SignatureFormat(_))
        ));
    }

    #[test]
    fn test_invalid_armor() {
        assert!(matches!(
            TrustedKey::from_armored("-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nnope\n"),
            Err(ConfigError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_precondition_order() {
        let key = TrustedKey::from_armored(SIGNER).unwrap();
        assert_eq!(
            verify_signature(b"data", b"", None, later()),
            Err(AkdError::EmptySignature)
        );
        assert_eq!(
            verify_signature(b"data", b"", Some(&key), later()),
            Err(AkdError::EmptySignature)
        );
        assert_eq!(
            verify_signature(b"data", &sig(), None, later()),
            Err(AkdError::NoPublicKeyConfigured)
        );
        assert_eq!(
            verify_signature(KEYS.as_bytes(), &sig(), Some(&key), later()),
            Ok(true)
        );
    }

    #[test]
    fn test_signing_subkey() {
        let key = TrustedKey::from_armored(SUBKEY_SIGNER).unwrap();
        assert!(key.verify_detached(SHORT_KEY, &decode(SUBKEY_SIG), later()).unwrap());
    }

    #[test]
    fn test_subkey_without_sign_capability() {
        let key = TrustedKey::from_armored(SUBKEY_AUTH_ONLY).unwrap();
        assert!(!key.verify_detached(SHORT_KEY, &decode(SUBKEY_SIG), later()).unwrap());
    }

    #[test]
    fn test_expired_signature() {
        let key = TrustedKey::from_armored(SUBKEY_SIGNER).unwrap();
        let sig = decode(EXPIRING_SIG);
        assert!(key.verify_detached(SHORT_KEY, &sig, next_day()).unwrap());
        assert!(!key.verify_detached(SHORT_KEY, &sig, later()).unwrap());
    }

    #[test]
    fn test_expired_key() {
        let key = TrustedKey::from_armored(EXPIRING).unwrap();
        let sig = decode(EXPIRING_KEY_SIG);
        assert!(key.verify_detached(SHORT_KEY, &sig, next_day()).unwrap());
        assert!(!key.verify_detached(SHORT_KEY, &sig, later()).unwrap());
    }

    #[test]
    fn test_expiry_boundaries() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let day = Duration::days(1);
        assert!(!expired(&start, None, later()));
        assert!(!expired(&start, Some(&Duration::zero()), later()));
        assert!(!expired(&start, Some(&day), start + Duration::hours(23)));
        assert!(expired(&start, Some(&day), start + day));
    }
}
