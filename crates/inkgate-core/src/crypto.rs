//! Credential cipher — Fernet tokens for stored API keys.
//!
//! Token layout (before URL-safe base64):
//! `0x80 | timestamp (u64 BE) | IV (16) | AES-128-CBC ciphertext | HMAC-SHA256 (32)`.
//! The 32-byte key is split into a signing half and an encryption half.

use std::fmt;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::DecryptionError;
use crate::types::ApiKey;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const VERSION: u8 = 0x80;
const HEADER_LEN: usize = 1 + 8 + 16;
const MAC_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

/// Encrypts and decrypts stored credentials.
pub trait CredentialCipher: Send + Sync {
    /// Encrypt a plaintext API key into an opaque token.
    fn encrypt(&self, plaintext: &str) -> String;

    /// Decrypt a token. An empty token decrypts to an empty key.
    fn decrypt(&self, token: &str) -> Result<ApiKey, DecryptionError>;
}

/// Fernet implementation of [`CredentialCipher`].
pub struct FernetCipher {
    key: Zeroizing<[u8; 32]>,
    /// Keyed with the signing half; cloned per token.
    mac: HmacSha256,
}

impl FernetCipher {
    /// Build from a URL-safe base64 key of 32 bytes.
    pub fn new(key_b64: &str) -> Result<Self, DecryptionError> {
        let trimmed = key_b64.trim();
        if trimmed.is_empty() {
            return Err(DecryptionError::InvalidKey("key is empty".into()));
        }

        let raw = Zeroizing::new(
            URL_SAFE
                .decode(trimmed)
                .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
                .map_err(|_| DecryptionError::InvalidKey("key is not URL-safe base64".into()))?,
        );
        if raw.len() != 32 {
            return Err(DecryptionError::InvalidKey(format!(
                "key must decode to 32 bytes, got {}",
                raw.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&raw);
        let mac = <HmacSha256 as Mac>::new_from_slice(&key[..16])
            .map_err(|e| DecryptionError::InvalidKey(format!("signing key rejected: {e}")))?;
        Ok(Self { key, mac })
    }

    /// Generate a fresh random key, URL-safe base64 encoded.
    pub fn generate_key() -> String {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut key[..]);
        URL_SAFE.encode(&key[..])
    }

    fn encryption_key(&self) -> &[u8] {
        &self.key[16..]
    }

    fn mac(&self) -> HmacSha256 {
        self.mac.clone()
    }

    /// Encrypt with an explicit timestamp and IV.
    pub fn encrypt_at(&self, plaintext: &str, timestamp: u64, iv: [u8; 16]) -> String {
        let ciphertext = Aes128CbcEnc::new(self.encryption_key().into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut token = Vec::with_capacity(HEADER_LEN + ciphertext.len() + MAC_LEN);
        token.push(VERSION);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);

        let mut mac = self.mac();
        mac.update(&token);
        token.extend_from_slice(&mac.finalize().into_bytes());

        URL_SAFE.encode(token)
    }
}

impl CredentialCipher for FernetCipher {
    fn encrypt(&self, plaintext: &str) -> String {
        let timestamp = chrono::Utc::now().timestamp().max(0) as u64;
        let mut iv = [0u8; 16];
        OsRng.fill_bytes(&mut iv);
        self.encrypt_at(plaintext, timestamp, iv)
    }

    fn decrypt(&self, token: &str) -> Result<ApiKey, DecryptionError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(ApiKey::new(String::new()));
        }

        let data = URL_SAFE
            .decode(token)
            .map_err(|_| DecryptionError::Encoding)?;

        if data.len() < HEADER_LEN + BLOCK_LEN + MAC_LEN
            || (data.len() - HEADER_LEN - MAC_LEN) % BLOCK_LEN != 0
        {
            return Err(DecryptionError::Malformed);
        }
        if data[0] != VERSION {
            return Err(DecryptionError::Malformed);
        }

        let (signed, tag) = data.split_at(data.len() - MAC_LEN);
        let mut mac = self.mac();
        mac.update(signed);
        mac.verify_slice(tag)
            .map_err(|_| DecryptionError::SignatureMismatch)?;

        let iv = &signed[9..HEADER_LEN];
        let ciphertext = &signed[HEADER_LEN..];
        let plaintext = Aes128CbcDec::new_from_slices(self.encryption_key(), iv)
            .map_err(|_| DecryptionError::Malformed)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| DecryptionError::Malformed)?;

        let plaintext = String::from_utf8(plaintext).map_err(|_| DecryptionError::Utf8)?;
        Ok(ApiKey::new(plaintext))
    }
}

impl fmt::Debug for FernetCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FernetCipher(<redacted>)")
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
