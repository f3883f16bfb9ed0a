use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as EncryptionPublicKey, StaticSecret};

use crate::error::IdentityError;
use crate::types::Username;

/// An account keypair: Ed25519 for signing, X25519 for encryption.
/// The signing public key is the account's identity in the graph.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    encryption_key: StaticSecret,
}

/// Serializable format for storing/exporting a keypair. All fields are hex.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeypairExport {
    #[serde(rename = "pub")]
    pub public_key: String,
    #[serde(rename = "priv")]
    pub private_key: String,
    #[serde(rename = "epub")]
    pub encryption_public_key: String,
    #[serde(rename = "epriv")]
    pub encryption_private_key: String,
}

impl fmt::Debug for KeypairExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeypairExport")
            .field("pub", &self.public_key)
            .field("epub", &self.encryption_public_key)
            .finish_non_exhaustive()
    }
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            encryption_key: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Restore a keypair from an export, checking that the public halves
    /// match the private ones.
    pub fn from_export(export: &KeypairExport) -> Result<Self, IdentityError> {
        let signing_secret = decode_key(&export.private_key)?;
        let encryption_secret = decode_key(&export.encryption_private_key)?;

        let keypair = Self {
            signing_key: SigningKey::from_bytes(&signing_secret),
            encryption_key: StaticSecret::from(encryption_secret),
        };

        if keypair.public_key_hex() != export.public_key.to_ascii_lowercase()
            || keypair.encryption_public_key_hex()
                != export.encryption_public_key.to_ascii_lowercase()
        {
            return Err(IdentityError::KeyMismatch);
        }
        Ok(keypair)
    }

    /// Export keypair for serialization
    pub fn to_export(&self) -> KeypairExport {
        KeypairExport {
            public_key: self.public_key_hex(),
            private_key: hex::encode(self.signing_key.as_bytes()),
            encryption_public_key: self.encryption_public_key_hex(),
            encryption_private_key: hex::encode(self.encryption_key.to_bytes()),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn encryption_public_key_hex(&self) -> String {
        hex::encode(EncryptionPublicKey::from(&self.encryption_key).as_bytes())
    }
}

fn decode_key(hex_str: &str) -> Result<[u8; 32], IdentityError> {
    let bytes = hex::decode(hex_str).map_err(|_| IdentityError::InvalidKeyBytes)?;
    bytes.try_into().map_err(|_| IdentityError::InvalidKeyBytes)
}

/// The signed-in user: a keypair plus the name it was registered under.
#[derive(Clone)]
pub struct Identity {
    keypair: Keypair,
    display_name: Username,
}

impl Identity {
    pub fn new(keypair: Keypair, display_name: Username) -> Self {
        Self {
            keypair,
            display_name,
        }
    }

    pub fn display_name(&self) -> &Username {
        &self.display_name
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key(&self) -> String {
        self.keypair.public_key_hex()
    }

    pub fn encryption_public_key(&self) -> String {
        self.keypair.encryption_public_key_hex()
    }

    /// Opaque credential that re-authenticates this identity without a
    /// password.
    pub fn credential(&self) -> Result<SessionCredential, IdentityError> {
        SessionCredential::from_keypair(&self.keypair)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("display_name", &self.display_name)
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Persisted session credential: base64 of the JSON keypair export.
/// Never printed; `Debug` shows only its length.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential(String);

impl SessionCredential {
    pub fn from_keypair(keypair: &Keypair) -> Result<Self, IdentityError> {
        let json = serde_json::to_vec(&keypair.to_export())
            .map_err(|e| IdentityError::MalformedCredential(e.to_string()))?;
        Ok(Self(BASE64.encode(json)))
    }

    /// Wrap a blob read back from persistence. Validity is only checked by
    /// [`SessionCredential::to_keypair`].
    pub fn from_persisted(blob: String) -> Self {
        Self(blob)
    }

    pub fn to_keypair(&self) -> Result<Keypair, IdentityError> {
        let json = BASE64
            .decode(self.0.trim())
            .map_err(|e| IdentityError::MalformedCredential(e.to_string()))?;
        let export: KeypairExport = serde_json::from_slice(&json)
            .map_err(|e| IdentityError::MalformedCredential(e.to_string()))?;
        Keypair::from_export(&export)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionCredential(<{} bytes redacted>)", self.0.len())
    }
}
