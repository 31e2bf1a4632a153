use thiserror::Error;

use crate::Address;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Typed outcomes of a rejected registry call. None of them leaves the
/// registry partially updated.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} has already submitted")]
    DuplicateSubmission(Address),
    #[error("{0} has not submitted")]
    MissingSubmission(Address),
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),
    #[error("comparison needs at least one participant")]
    EmptyComparison,
    #[error("comparison over {got} participants exceeds the limit of {max}")]
    TooManyCandidates { got: usize, max: usize },
    #[error("{0} appears more than once in the comparison list")]
    DuplicateCandidate(Address),
    /// The hosting environment's homomorphic capability failed.
    #[error(transparent)]
    Coprocessor(#[from] anyhow::Error),
    #[error("internal invariant failed")]
    InternalInvariantFailed,
}
