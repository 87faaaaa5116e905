use thiserror::Error;

/// Errors reported by the tree operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Invalid branching degree: {0} (must be >= 2)")]
    InvalidDegree(usize),

    #[error("Invalid tree state: {0}")]
    InvalidState(String),
}

pub type TreeResult<T> = Result<T, TreeError>;
