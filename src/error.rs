//! Errors raised by the core object model
use thiserror::Error;

use crate::value::kind::Kind;

/// Allocation failure
///
/// The heap is an arena of nodes so there is no bad-size case left
/// from the block allocator; only exhaustion of the configured node
/// budget.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("out of memory: node limit {0} reached")]
    OutOfMemory(usize),
}

/// Recoverable conditions signalled by series editing and context
/// management.
///
/// The evaluator is expected to translate these into language-level
/// errors. Nothing in this crate catches them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("series is locked and cannot be modified")]
    LockedTarget,
    #[error("context is locked and cannot be modified")]
    LockedContext,
    #[error("key '{0}' is locked")]
    LockedKey(String),
    #[error("byte index {0} is not on a codepoint boundary")]
    InvalidCodepointIndex(usize),
    #[error("invalid UTF-8 data where text is required")]
    Encoding,
    #[error("duplicate variable '{0}' in key collection")]
    DuplicateKey(String),
    #[error("value {0} out of range for a byte")]
    OutOfRange(i64),
    #[error("key '{key}' does not accept values of kind {kind:?}")]
    TypeCheck { key: String, kind: Kind },
    #[error("value has {have} quote levels, {want} requested")]
    NotQuotedEnough { have: u32, want: u32 },
    #[error("{0:?} is not a valid target for this operation")]
    BadTarget(Kind),
    #[error("index {0} out of range")]
    BadIndex(usize),
    #[error("{0} repetitions exceed the addressable series size")]
    SizeOverflow(i64),
    #[error("no frame is on the call stack")]
    NoFrame,
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// A broken collector invariant.
///
/// These indicate memory corruption has already happened; there is no
/// safe continuation so the collector panics on receipt of one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} cell violates GC invariant: {reason}")]
pub struct InvariantViolation {
    pub kind: Kind,
    pub reason: String,
}

impl InvariantViolation {
    pub fn new(kind: Kind, reason: impl Into<String>) -> Self {
        InvariantViolation {
            kind,
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_alloc_error_converts() {
        let e: CoreError = AllocError::OutOfMemory(4).into();
        assert_eq!(e.to_string(), "out of memory: node limit 4 reached");
    }

    #[test]
    pub fn test_violation_display() {
        let v = InvariantViolation::new(Kind::Block, "node not marked");
        assert_eq!(
            v.to_string(),
            "Block cell violates GC invariant: node not marked"
        );
    }
}
