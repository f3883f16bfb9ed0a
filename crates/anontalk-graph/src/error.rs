use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The store refused the write; carries the store's reason.
    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Store connection failed: {0}")]
    Connect(String),

    #[error("Store connection closed")]
    Disconnected,

    #[error("Store did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
