//! Mock key-management service.
//!
//! Deterministic key derivation (PBKDF2 stretched, re-keyed under a
//! process-lifetime master secret) plus authenticated stream encryption
//! (SHA-256 keystream XOR, HMAC-SHA256 tag). The construction is
//! intentionally transparent for auditability and is not production
//! cryptography.

use std::collections::HashMap;
use std::sync::RwLock;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{LabError, Result};

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;
const PBKDF2_ROUNDS: u32 = 200_000;

/// A 32-byte key bound to an (identity, context) pair.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Process-wide mock KMS.
///
/// Constructed once at startup and shared by handle; holds no external
/// resources. The master secret is never persisted and stays fixed for the
/// process lifetime. A fixed secret can be injected for deterministic tests.
pub struct KeyService {
    master_secret: [u8; KEY_LEN],
    cache: RwLock<HashMap<(String, String), DerivedKey>>,
}

impl KeyService {
    /// Create a KMS with a fresh random master secret.
    pub fn new() -> Self {
        let mut seed = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut seed);
        Self::with_master_secret(Sha256::digest(seed).into())
    }

    /// Create a KMS with an injected master secret.
    pub fn with_master_secret(master_secret: [u8; KEY_LEN]) -> Self {
        Self {
            master_secret,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Derive the key for an (identity, context) pair.
    ///
    /// Deterministic under a fixed master secret: the identity is stretched
    /// through PBKDF2-HMAC-SHA256 with salt = SHA-256(context), then re-keyed
    /// under the master secret. Results are cached so repeated derivations
    /// skip the deliberately slow stretch; racing derivations converge on the
    /// same value.
    pub fn derive_key(&self, identity: &str, context: &str) -> DerivedKey {
        let cache_key = (identity.to_string(), context.to_string());
        if let Some(key) = self.cache.read().unwrap().get(&cache_key) {
            return key.clone();
        }

        let salt = Sha256::digest(context.as_bytes());
        let mut stretched = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(identity.as_bytes(), &salt, PBKDF2_ROUNDS, &mut stretched);

        let mut mac = HmacSha256::new_from_slice(&self.master_secret)
            .expect("HMAC can take a key of any size");
        mac.update(&stretched);
        let wrapped: [u8; KEY_LEN] = mac.finalize().into_bytes().into();

        let mut cache = self.cache.write().unwrap();
        cache
            .entry(cache_key)
            .or_insert(DerivedKey(wrapped))
            .clone()
    }

    /// Encrypt and authenticate a payload.
    ///
    /// Every call draws a fresh 16-byte IV. The token is the url-safe base64
    /// encoding of `iv || ciphertext || mac`, with the MAC computed over
    /// `iv || ciphertext`.
    pub fn encrypt(&self, key: &DerivedKey, plaintext: &[u8]) -> String {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let keystream = Self::expand_keystream(key, &iv, plaintext.len());
        let ciphertext: Vec<u8> = plaintext
            .iter()
            .zip(&keystream)
            .map(|(p, k)| p ^ k)
            .collect();

        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .expect("HMAC can take a key of any size");
        mac.update(&iv);
        mac.update(&ciphertext);
        let tag = mac.finalize().into_bytes();

        let mut token = Vec::with_capacity(IV_LEN + ciphertext.len() + MAC_LEN);
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);
        token.extend_from_slice(&tag);
        URL_SAFE.encode(token)
    }

    /// Verify and decrypt a token produced by [`encrypt`](Self::encrypt).
    ///
    /// The tag is recomputed and compared in constant time before any
    /// plaintext byte is reconstructed.
    pub fn decrypt(&self, key: &DerivedKey, token: &str) -> Result<Vec<u8>> {
        let data = URL_SAFE.decode(token).map_err(|_| LabError::MalformedToken)?;
        if data.len() < IV_LEN + MAC_LEN {
            return Err(LabError::MalformedToken);
        }

        let (iv, rest) = data.split_at(IV_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - MAC_LEN);

        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .expect("HMAC can take a key of any size");
        mac.update(iv);
        mac.update(ciphertext);
        mac.verify_slice(tag).map_err(|_| LabError::IntegrityFailure)?;

        let keystream = Self::expand_keystream(key, iv, ciphertext.len());
        Ok(ciphertext
            .iter()
            .zip(&keystream)
            .map(|(c, k)| c ^ k)
            .collect())
    }

    /// Expand `SHA-256(key || iv || counter)` blocks until `len` bytes are
    /// covered, truncating the final block.
    fn expand_keystream(key: &DerivedKey, iv: &[u8], len: usize) -> Vec<u8> {
        let mut stream = Vec::with_capacity(len + MAC_LEN);
        let mut counter: u32 = 0;
        while stream.len() < len {
            let mut hasher = Sha256::new();
            hasher.update(key.as_bytes());
            hasher.update(iv);
            hasher.update(counter.to_be_bytes());
            stream.extend_from_slice(&hasher.finalize());
            counter += 1;
        }
        stream.truncate(len);
        stream
    }
}

impl Default for KeyService {
    fn default() -> Self {
        Self::new()
    }
}

/// 16 random bytes, hex-encoded. Used as the freshness nonce in attestation
/// reports; collisions are not checked (negligible at this scale).
pub fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_kms() -> KeyService {
        KeyService::with_master_secret([7u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let kms = test_kms();
        let key = kms.derive_key("alice", "context");
        let token = kms.encrypt(&key, b"payload");
        let recovered = kms.decrypt(&key, &token).unwrap();
        assert_eq!(recovered, b"payload");
    }

    #[test]
    fn test_empty_plaintext_round_trip() {
        let kms = test_kms();
        let key = kms.derive_key("alice", "context");
        let token = kms.encrypt(&key, b"");
        // iv + empty ciphertext + mac
        assert_eq!(URL_SAFE.decode(&token).unwrap().len(), IV_LEN + MAC_LEN);
        assert_eq!(kms.decrypt(&key, &token).unwrap(), b"");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let kms = test_kms();
        let first = kms.derive_key("alice", "ctx");
        let second = kms.derive_key("alice", "ctx");
        assert!(first == second);

        let other = KeyService::with_master_secret([7u8; 32]);
        assert!(other.derive_key("alice", "ctx") == first);
    }

    #[test]
    fn test_derivation_separates_identity_and_context() {
        let kms = test_kms();
        let base = kms.derive_key("alice", "ctx");
        assert!(kms.derive_key("bob", "ctx") != base);
        assert!(kms.derive_key("alice", "other") != base);
    }

    #[test]
    fn test_different_master_secrets_differ() {
        let a = KeyService::with_master_secret([1u8; 32]);
        let b = KeyService::with_master_secret([2u8; 32]);
        assert!(a.derive_key("alice", "ctx") != b.derive_key("alice", "ctx"));
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let kms = test_kms();
        let key = kms.derive_key("alice", "ctx");
        let first = kms.encrypt(&key, b"same payload");
        let second = kms.encrypt(&key, b"same payload");
        assert_ne!(first, second);
        assert_eq!(kms.decrypt(&key, &first).unwrap(), b"same payload");
        assert_eq!(kms.decrypt(&key, &second).unwrap(), b"same payload");
    }

    #[test]
    fn test_tampering_any_byte_is_detected() {
        let kms = test_kms();
        let key = kms.derive_key("bob", "context");
        let token = kms.encrypt(&key, b"payload");
        let raw = URL_SAFE.decode(&token).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let err = kms.decrypt(&key, &URL_SAFE.encode(tampered)).unwrap_err();
            assert!(
                matches!(err, LabError::IntegrityFailure),
                "byte {} flip not caught",
                i
            );
        }
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let kms = test_kms();
        let key = kms.derive_key("alice", "ctx");
        let other = kms.derive_key("alice", "other");
        let token = kms.encrypt(&key, b"payload");
        assert!(matches!(
            kms.decrypt(&other, &token),
            Err(LabError::IntegrityFailure)
        ));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let kms = test_kms();
        let key = kms.derive_key("alice", "ctx");
        assert!(matches!(
            kms.decrypt(&key, "not//valid//base64!!"),
            Err(LabError::MalformedToken)
        ));
        // Valid base64 but shorter than iv + mac.
        let short = URL_SAFE.encode([0u8; 20]);
        assert!(matches!(
            kms.decrypt(&key, &short),
            Err(LabError::MalformedToken)
        ));
    }

    #[test]
    fn test_keystream_covers_multi_block_payloads() {
        let kms = test_kms();
        let key = kms.derive_key("alice", "ctx");
        // 100 bytes forces four SHA-256 blocks with a truncated tail.
        let plaintext = vec![0xA5u8; 100];
        let token = kms.encrypt(&key, &plaintext);
        assert_eq!(kms.decrypt(&key, &token).unwrap(), plaintext);
    }

    #[test]
    fn test_nonces_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let nonce = random_nonce();
            assert_eq!(nonce.len(), 32);
            assert!(seen.insert(nonce));
        }
    }
}
