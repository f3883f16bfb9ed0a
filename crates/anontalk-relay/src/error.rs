use thiserror::Error;

use anontalk_graph::GraphError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
