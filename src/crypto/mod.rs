//! Crypto Envelope (C1)
//! Mission: deterministic, convergent field-level encryption backed by a
//! pluggable KMS, so identical (key, context, plaintext) triples always
//! produce the same ciphertext while different contexts stay unrelated.

mod kms;
pub mod mask;

pub use kms::{KmsBackend, LocalFileKms, VaultTransitKms};

use anyhow::{anyhow, bail, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const CIPHERTEXT_VERSION: u8 = 1;

/// Wraps a `KmsBackend` with the versioned envelope format and the outer
/// integrity tag. This is the type the rest of the crate depends on; it
/// never talks to the KMS transport directly.
#[derive(Clone)]
pub struct CryptoEnvelope<K: KmsBackend + Clone> {
    kms: K,
    integrity_key: [u8; 32],
}

impl<K: KmsBackend + Clone> CryptoEnvelope<K> {
    pub fn new(kms: K, integrity_key: [u8; 32]) -> Self {
        Self { kms, integrity_key }
    }

    /// Encrypts `plaintext` under `context` (e.g. `"user:email"`). The same
    /// inputs always yield the same ciphertext bytes.
    pub async fn encrypt(&self, context: &str, plaintext: &str) -> Result<Vec<u8>> {
        let inner = self.kms.encrypt(context, plaintext.as_bytes()).await?;
        let tag = self.tag_for(context, &inner);

        let mut out = Vec::with_capacity(1 + 32 + inner.len());
        out.push(CIPHERTEXT_VERSION);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&inner);
        Ok(out)
    }

    /// Decrypts and verifies the outer integrity tag before handing the
    /// inner ciphertext to the KMS backend.
    pub async fn decrypt(&self, context: &str, ciphertext: &[u8]) -> Result<String> {
        if ciphertext.len() < 1 + 32 {
            bail!("ciphertext too short to contain version + integrity tag");
        }
        let version = ciphertext[0];
        if version != CIPHERTEXT_VERSION {
            bail!("unsupported ciphertext version {version}");
        }
        let tag = &ciphertext[1..33];
        let inner = &ciphertext[33..];

        let expected = self.tag_for(context, inner);
        if !constant_time_eq(tag, &expected) {
            bail!("integrity tag mismatch");
        }

        let plaintext = self.kms.decrypt(context, inner).await?;
        String::from_utf8(plaintext).map_err(|e| anyhow!("decrypted plaintext is not utf-8: {e}"))
    }

    fn tag_for(&self, context: &str, inner: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.integrity_key)
            .expect("HMAC accepts any key length");
        mac.update(context.as_bytes());
        mac.update(inner);
        let result = mac.finalize().into_bytes();
        let mut out = [0u8; 32];
        out.copy_from_slice(&result);
        out
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use kms::LocalFileKms;

    fn envelope() -> CryptoEnvelope<LocalFileKms> {
        let kms = LocalFileKms::from_key([7u8; 32]);
        CryptoEnvelope::new(kms, [9u8; 32])
    }

    #[tokio::test]
    async fn same_context_and_plaintext_is_deterministic() {
        let env = envelope();
        let a = env.encrypt("user:email", "alice@example.com").await.unwrap();
        let b = env.encrypt("user:email", "alice@example.com").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_context_is_unrelated() {
        let env = envelope();
        let a = env.encrypt("user:email", "alice@example.com").await.unwrap();
        let b = env
            .encrypt("tenant_config:gateway_server_key", "alice@example.com")
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn round_trips() {
        let env = envelope();
        let ciphertext = env.encrypt("user:email", "bob@example.com").await.unwrap();
        let plaintext = env.decrypt("user:email", &ciphertext).await.unwrap();
        assert_eq!(plaintext, "bob@example.com");
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_integrity_check() {
        let env = envelope();
        let mut ciphertext = env.encrypt("user:email", "carol@example.com").await.unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(env.decrypt("user:email", &ciphertext).await.is_err());
    }

    #[tokio::test]
    async fn decrypting_with_wrong_context_fails() {
        let env = envelope();
        let ciphertext = env.encrypt("user:email", "dave@example.com").await.unwrap();
        assert!(env.decrypt("user:phone", &ciphertext).await.is_err());
    }
}
