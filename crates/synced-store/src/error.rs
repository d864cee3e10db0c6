use synced_doc::DocError;
use thiserror::Error;

/// Errors reported by the sync engine.
///
/// None of these abort a mutation as a whole: the failing branch or
/// operation is skipped, logged and pushed to the diagnostics channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A value of the wrong shape: a top-level primitive, a store-owned
    /// value written into the document, a root of the wrong kind.
    #[error("SHAPE_VIOLATION: {0}")]
    ShapeViolation(String),
    /// An intermediate path segment does not exist.
    #[error("PATH_NOT_FOUND: {0}")]
    PathNotFound(String),
    /// A filter segment was applied to something other than a sequence.
    #[error("FILTER_ON_NON_SEQUENCE: {0}")]
    FilterOnNonSequence(String),
    #[error("UNSUPPORTED: {0}")]
    Unsupported(String),
    /// Two fan-out branches resolved to the same target.
    #[error("OVERLAPPING_TARGETS: {0}")]
    OverlappingTargets(String),
    #[error("DOCUMENT: {0}")]
    Document(#[from] DocError),
}

pub type SyncResult<T> = Result<T, SyncError>;
