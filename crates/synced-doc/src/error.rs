use thiserror::Error;

use crate::clock::Ts;

/// Errors returned by document reads and edits.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocError {
    /// No node with this ID exists.
    #[error("NOT_FOUND: {0}")]
    NotFound(Ts),
    /// The node exists but has a different type than the edit requires.
    #[error("WRONG_TYPE: {0}")]
    WrongType(Ts),
    /// An array index is past the end of the array.
    #[error("OUT_OF_BOUNDS: index {index} of length {len}")]
    OutOfBounds { index: usize, len: usize },
}
