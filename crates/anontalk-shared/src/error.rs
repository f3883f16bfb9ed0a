use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Malformed sealed payload: {0}")]
    Malformed(String),

    #[error("Password stretching failed: {0}")]
    KeyDerivation(String),
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Public key does not match private key")]
    KeyMismatch,

    #[error("Malformed credential: {0}")]
    MalformedCredential(String),
}

/// A record read from the graph did not have the expected shape.
///
/// Any peer can write anything into the shared graph, so callers drop the
/// record and move on.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Record is a namespace sentinel")]
    Sentinel,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}
