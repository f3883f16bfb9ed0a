use thiserror::Error;

use anontalk_graph::GraphError;
use anontalk_store::StoreError;

/// Authentication failures. Surfaced to the caller, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Username is already taken")]
    DuplicateUsername,

    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    /// The new key pair could not be encoded or sealed locally.
    #[error("Could not seal account keys: {0}")]
    Sealing(String),
}

impl From<GraphError> for AuthError {
    fn from(err: GraphError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

/// A graph write that did not land. The user retries manually.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("Store rejected the write: {0}")]
    Rejected(String),

    #[error("Store unreachable: {0}")]
    Unavailable(String),
}

impl From<GraphError> for WriteError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Rejected(reason) => WriteError::Rejected(reason),
            other => WriteError::Unavailable(other.to_string()),
        }
    }
}

/// Upload to the pinning service failed. Aborts the enclosing operation
/// before any graph write.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Pinning service credentials are not configured")]
    MissingCredentials,

    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pinning service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed pinning service response: {0}")]
    Malformed(String),
}

/// Image preparation failed.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Media too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported or corrupt image: {0}")]
    Decode(String),

    #[error("Image encoding failed: {0}")]
    Encode(String),
}

/// Top-level error for client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Relay unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Session storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
