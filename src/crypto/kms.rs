//! KMS backends for the crypto envelope: a Vault Transit-shaped HTTP client
//! for production, and a local AES-256-GCM fallback for environments with no
//! KMS deployment.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Deadlines;

type HmacSha256 = Hmac<Sha256>;

/// A KMS capable of convergent encryption: the same `(context, plaintext)`
/// under the same key always returns the same ciphertext.
#[async_trait]
pub trait KmsBackend: Send + Sync {
    async fn encrypt(&self, context: &str, plaintext: &[u8]) -> Result<Vec<u8>>;
    async fn decrypt(&self, context: &str, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Talks to a Vault Transit-style convergent-encryption endpoint.
///
/// Request/response shapes follow Vault's `transit/encrypt` and
/// `transit/decrypt` API: base64 plaintext/ciphertext, an opaque `context`
/// parameter, `convergent_encryption: true`.
pub struct VaultTransitKms {
    client: reqwest::Client,
    addr: String,
    token: String,
    transit_key: String,
}

impl VaultTransitKms {
    pub fn new(addr: String, token: String, transit_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Deadlines::KMS)
            .build()
            .context("failed to build KMS http client")?;
        Ok(Self {
            client,
            addr,
            token,
            transit_key,
        })
    }
}

#[async_trait]
impl KmsBackend for VaultTransitKms {
    async fn encrypt(&self, context: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let url = format!("{}/v1/transit/encrypt/{}", self.addr, self.transit_key);
        let body = serde_json::json!({
            "plaintext": STANDARD.encode(plaintext),
            "context": STANDARD.encode(context.as_bytes()),
            "convergent_encryption": true,
        });
        let resp: serde_json::Value = self
            .client
            .post(url)
            .header("X-Vault-Token", &self.token)
            .json(&body)
            .send()
            .await
            .context("KMS encrypt request failed")?
            .error_for_status()
            .context("KMS encrypt returned an error status")?
            .json()
            .await
            .context("KMS encrypt response was not valid JSON")?;

        let ciphertext = resp["data"]["ciphertext"]
            .as_str()
            .ok_or_else(|| anyhow!("KMS encrypt response missing data.ciphertext"))?;
        Ok(ciphertext.as_bytes().to_vec())
    }

    async fn decrypt(&self, context: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let url = format!("{}/v1/transit/decrypt/{}", self.addr, self.transit_key);
        let ciphertext_str =
            std::str::from_utf8(ciphertext).context("KMS ciphertext token was not utf-8")?;
        let body = serde_json::json!({
            "ciphertext": ciphertext_str,
            "context": STANDARD.encode(context.as_bytes()),
        });
        let resp: serde_json::Value = self
            .client
            .post(url)
            .header("X-Vault-Token", &self.token)
            .json(&body)
            .send()
            .await
            .context("KMS decrypt request failed")?
            .error_for_status()
            .context("KMS decrypt returned an error status")?
            .json()
            .await
            .context("KMS decrypt response was not valid JSON")?;

        let plaintext_b64 = resp["data"]["plaintext"]
            .as_str()
            .ok_or_else(|| anyhow!("KMS decrypt response missing data.plaintext"))?;
        STANDARD
            .decode(plaintext_b64)
            .context("KMS decrypt response plaintext was not valid base64")
    }
}

/// Local fallback for deployments with no Vault Transit cluster. Derives a
/// deterministic 96-bit nonce from `HMAC(key, context || plaintext)` so that
/// AES-256-GCM, normally randomized, becomes convergent for a fixed key.
#[derive(Clone)]
pub struct LocalFileKms {
    cipher: Aes256Gcm,
    nonce_key: [u8; 32],
}

impl LocalFileKms {
    pub fn from_key(key: [u8; 32]) -> Self {
        let cipher = Aes256Gcm::new_from_slice(&key).expect("key is exactly 32 bytes");
        Self {
            cipher,
            nonce_key: key,
        }
    }

    pub fn load_from_path(path: &str) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read encryption key file at {path}"))?;
        let decoded = if raw.len() == 32 {
            raw
        } else {
            STANDARD
                .decode(raw.trim_ascii())
                .context("encryption key file must be 32 raw bytes or base64")?
        };
        if decoded.len() != 32 {
            return Err(anyhow!(
                "encryption key must decode to 32 bytes, got {}",
                decoded.len()
            ));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&decoded);
        Ok(Self::from_key(key))
    }

    fn nonce_for(&self, context: &str, plaintext: &[u8]) -> Result<[u8; 12]> {
        let mut mac = HmacSha256::new_from_slice(&self.nonce_key)
            .map_err(|e| anyhow!("HMAC key setup failed: {e}"))?;
        mac.update(context.as_bytes());
        mac.update(plaintext);
        let digest = mac.finalize().into_bytes();
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&digest[..12]);
        Ok(nonce)
    }
}

#[async_trait]
impl KmsBackend for LocalFileKms {
    async fn encrypt(&self, context: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce_bytes = self.nonce_for(context, plaintext)?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| anyhow!("AES-GCM encryption failed: {e}"))?;

        let mut out = Vec::with_capacity(12 + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, _context: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < 12 {
            return Err(anyhow!("ciphertext too short to contain a nonce"));
        }
        let (nonce_bytes, body) = ciphertext.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, body)
            .map_err(|e| anyhow!("AES-GCM decryption failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn local_kms_is_convergent() {
        let kms = LocalFileKms::from_key([3u8; 32]);
        let a = kms.encrypt("user:email", b"alice@example.com").await.unwrap();
        let b = kms.encrypt("user:email", b"alice@example.com").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn local_kms_round_trips() {
        let kms = LocalFileKms::from_key([5u8; 32]);
        let ciphertext = kms.encrypt("user:phone", b"+6281234567890").await.unwrap();
        let plaintext = kms.decrypt("user:phone", &ciphertext).await.unwrap();
        assert_eq!(plaintext, b"+6281234567890");
    }

    #[tokio::test]
    async fn different_plaintext_changes_nonce_and_ciphertext() {
        let kms = LocalFileKms::from_key([5u8; 32]);
        let a = kms.encrypt("user:phone", b"one").await.unwrap();
        let b = kms.encrypt("user:phone", b"two").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn load_from_path_accepts_base64_or_raw_bytes() {
        let mut raw_file = tempfile::NamedTempFile::new().unwrap();
        raw_file.write_all(&[7u8; 32]).unwrap();
        let kms = LocalFileKms::load_from_path(raw_file.path().to_str().unwrap()).unwrap();
        assert_eq!(kms.nonce_key, [7u8; 32]);

        let mut b64_file = tempfile::NamedTempFile::new().unwrap();
        let encoded = STANDARD.encode([9u8; 32]);
        b64_file.write_all(encoded.as_bytes()).unwrap();
        let kms = LocalFileKms::load_from_path(b64_file.path().to_str().unwrap()).unwrap();
        assert_eq!(kms.nonce_key, [9u8; 32]);
    }

    #[test]
    fn load_from_path_rejects_wrong_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"too short").unwrap();
        assert!(LocalFileKms::load_from_path(file.path().to_str().unwrap()).is_err());
    }
}
