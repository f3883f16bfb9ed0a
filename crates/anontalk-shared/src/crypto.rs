//! Password sealing for the account record.
//!
//! The key pair is stored on the graph encrypted under a key stretched from
//! the password with Argon2id. The salt travels next to the ciphertext so any
//! client that knows the password can reopen it. Every peer can read the
//! sealed blob, so the stretching cost is the only brake on guessing.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;

use crate::constants::{
    ARGON2_ITERATIONS, ARGON2_MEMORY_KIB, ARGON2_PARALLELISM, KDF_CONTEXT_ACCOUNT_KEY, NONCE_SIZE,
    SALT_SIZE,
};
use crate::error::CryptoError;

/// Plaintext sealed under a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// Hex-encoded salt
    pub salt: String,
    /// Base64 of nonce || ciphertext
    pub ciphertext: String,
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

fn account_cipher(password: &str, salt: &[u8]) -> Result<XChaCha20Poly1305, CryptoError> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(32),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut stretched = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut stretched)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let key = blake3::derive_key(KDF_CONTEXT_ACCOUNT_KEY, &stretched);
    Ok(XChaCha20Poly1305::new(&key.into()))
}

pub fn seal_with_password(password: &str, plaintext: &[u8]) -> Result<SealedBox, CryptoError> {
    let salt: [u8; SALT_SIZE] = random_bytes();
    let nonce: [u8; NONCE_SIZE] = random_bytes();

    let sealed = account_cipher(password, &salt)?
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut framed = nonce.to_vec();
    framed.extend(sealed);
    Ok(SealedBox {
        salt: hex::encode(salt),
        ciphertext: BASE64.encode(framed),
    })
}

/// Reopen a [`SealedBox`]. A wrong password and a tampered payload both
/// surface as [`CryptoError::DecryptionFailed`].
pub fn open_with_password(password: &str, sealed: &SealedBox) -> Result<Vec<u8>, CryptoError> {
    let salt = hex::decode(&sealed.salt).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    let framed = BASE64
        .decode(&sealed.ciphertext)
        .map_err(|e| CryptoError::Malformed(e.to_string()))?;
    if framed.len() < NONCE_SIZE {
        return Err(CryptoError::Malformed("payload shorter than nonce".into()));
    }

    let (nonce, body) = framed.split_at(NONCE_SIZE);
    account_cipher(password, &salt)?
        .decrypt(XNonce::from_slice(nonce), body)
        .map_err(|_| CryptoError::DecryptionFailed)
}
