//! Cryptographic provider for encrypted Oganesson sessions.
//!
//! Provides three things:
//!   1. `SecretKey` — XChaCha20-Poly1305 symmetric envelope encryption
//!   2. `EncryptionPair` / `PublicEncryptionKey` — Curve25519 sealed boxes
//!      for delivering the first session key
//!   3. `CryptoText` — the `PREFIX:hex` textual key form used on the wire
//!
//! Key material is wiped from memory on drop. There is no unsafe code in
//! this module.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{OgError, Result};

/// XChaCha20 nonce length.
const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length.
const TAG_LEN: usize = 16;

/// Domain-separation context for sealed-box key derivation.
const SEAL_CONTEXT: &str = "oganesson v1 session key seal";

/// Textual prefix for symmetric keys.
pub const SECRET_KEY_PREFIX: &str = "XCHACHA20";

/// Textual prefix for Curve25519 public keys.
pub const PUBLIC_KEY_PREFIX: &str = "CURVE25519";

// ── Textual key form ──────────────────────────────────────────────────────────

/// A parsed `PREFIX:hexbody` key string.
///
/// The prefix names the algorithm family in uppercase ASCII; the body is
/// the hex-encoded key material. This is the only form key material takes
/// inside wire-message attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoText {
    prefix: String,
    body: Vec<u8>,
}

impl CryptoText {
    /// Parse a `PREFIX:hexbody` string.
    pub fn parse(text: &str) -> Result<CryptoText> {
        let (prefix, body) = text.split_once(':').ok_or(OgError::KeyError)?;
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(OgError::KeyError);
        }
        let body = hex::decode(body).map_err(|_| OgError::KeyError)?;
        if body.is_empty() {
            return Err(OgError::KeyError);
        }
        Ok(CryptoText {
            prefix: prefix.to_string(),
            body,
        })
    }

    /// Format raw key material as `PREFIX:hexbody`.
    pub fn assemble(prefix: &str, body: &[u8]) -> String {
        format!("{prefix}:{}", hex::encode(body))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

// ── Symmetric keys ────────────────────────────────────────────────────────────

/// A 256-bit XChaCha20-Poly1305 key.
///
/// Wire format per envelope: `nonce (24 bytes) ‖ ciphertext+tag`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; 32],
}

impl SecretKey {
    /// Generate a fresh random key.
    pub fn generate() -> SecretKey {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        SecretKey { key }
    }

    pub fn from_bytes(key: [u8; 32]) -> SecretKey {
        SecretKey { key }
    }

    /// Textual form: `XCHACHA20:<hex>`.
    pub fn as_text(&self) -> String {
        CryptoText::assemble(SECRET_KEY_PREFIX, &self.key)
    }

    /// Parse the textual form produced by [`SecretKey::as_text`].
    pub fn from_text(text: &str) -> Result<SecretKey> {
        let parsed = CryptoText::parse(text)?;
        if parsed.prefix() != SECRET_KEY_PREFIX {
            return Err(OgError::KeyError);
        }
        let key: [u8; 32] = parsed.body().try_into().map_err(|_| OgError::KeyError)?;
        Ok(SecretKey { key })
    }

    /// Encrypt with a fresh random nonce. Output: `nonce ‖ ciphertext+tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| OgError::KeyError)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt an envelope produced by [`SecretKey::encrypt`].
    ///
    /// Fails with `ErrKeyError` on truncation, tampering, or a wrong key.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(OgError::KeyError);
        }
        let cipher = XChaCha20Poly1305::new((&self.key).into());
        cipher
            .decrypt(XNonce::from_slice(&data[..NONCE_LEN]), &data[NONCE_LEN..])
            .map_err(|_| OgError::KeyError)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

// ── Sealed boxes ──────────────────────────────────────────────────────────────

/// A peer's Curve25519 public key, used to seal data only they can open.
#[derive(Clone)]
pub struct PublicEncryptionKey {
    public: PublicKey,
}

impl PublicEncryptionKey {
    /// Parse the textual form `CURVE25519:<hex>`.
    pub fn from_text(text: &str) -> Result<PublicEncryptionKey> {
        let parsed = CryptoText::parse(text)?;
        if parsed.prefix() != PUBLIC_KEY_PREFIX {
            return Err(OgError::KeyError);
        }
        let raw: [u8; 32] = parsed.body().try_into().map_err(|_| OgError::KeyError)?;
        Ok(PublicEncryptionKey {
            public: PublicKey::from(raw),
        })
    }

    /// Textual form: `CURVE25519:<hex>`.
    pub fn as_text(&self) -> String {
        CryptoText::assemble(PUBLIC_KEY_PREFIX, self.public.as_bytes())
    }

    /// Seal `plaintext` so only the private-key holder can open it.
    ///
    /// An ephemeral Curve25519 keypair supplies forward secrecy for the
    /// handshake: the symmetric key is derived from the ephemeral DH shared
    /// secret and both public keys, then discarded.
    ///
    /// Output: `ephemeral_public (32) ‖ nonce (24) ‖ ciphertext+tag`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let ephemeral = StaticSecret::random_from_rng(rand::thread_rng());
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.public);
        let key = seal_key(
            ephemeral_public.as_bytes(),
            self.public.as_bytes(),
            shared.as_bytes(),
        );

        let sealed = SecretKey::from_bytes(key).encrypt(plaintext)?;
        let mut out = Vec::with_capacity(32 + sealed.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&sealed);
        Ok(out)
    }
}

impl fmt::Debug for PublicEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicEncryptionKey({})", self.as_text())
    }
}

/// A Curve25519 keypair for receiving sealed boxes.
///
/// The private half is held only for the duration of a handshake and is
/// wiped when the pair is dropped.
pub struct EncryptionPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EncryptionPair {
    /// Generate a new random keypair.
    pub fn generate() -> EncryptionPair {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        EncryptionPair { secret, public }
    }

    /// Textual form of the public half: `CURVE25519:<hex>`.
    pub fn public_text(&self) -> String {
        CryptoText::assemble(PUBLIC_KEY_PREFIX, self.public.as_bytes())
    }

    /// Open a sealed box produced with our public key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < 32 + NONCE_LEN + TAG_LEN {
            return Err(OgError::KeyError);
        }
        let ephemeral_raw: [u8; 32] = sealed[..32].try_into().map_err(|_| OgError::KeyError)?;
        let ephemeral_public = PublicKey::from(ephemeral_raw);
        let shared = self.secret.diffie_hellman(&ephemeral_public);
        let key = seal_key(
            ephemeral_public.as_bytes(),
            self.public.as_bytes(),
            shared.as_bytes(),
        );

        SecretKey::from_bytes(key).decrypt(&sealed[32..])
    }
}

impl fmt::Debug for EncryptionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPair({})", self.public_text())
    }
}

/// Derive the sealed-box symmetric key. Binds both public keys so a sealed
/// box cannot be replayed toward a different recipient.
fn seal_key(ephemeral_public: &[u8; 32], recipient_public: &[u8; 32], shared: &[u8; 32]) -> [u8; 32] {
    let mut material = [0u8; 96];
    material[..32].copy_from_slice(ephemeral_public);
    material[32..64].copy_from_slice(recipient_public);
    material[64..].copy_from_slice(shared);
    let key = blake3::derive_key(SEAL_CONTEXT, &material);
    material.zeroize();
    key
}

// ── Tests ─────────────────────────────────────────────────────────────────────
