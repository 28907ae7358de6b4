//! Error types for clique-tree elimination.

use thiserror::Error;

/// Errors that can occur while eliminating a cluster forest.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Elimination is deterministic given its inputs, so no variant is retried
/// internally; recovery (e.g. recomputing the ordering and the forest) is the
/// caller's responsibility.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TreeError {
    /// An orphan subtree wrapper reached in-place elimination.
    ///
    /// In-place elimination keeps the clique-tree topology fixed, so grafting
    /// a previously-built subtree is structurally impossible. Orphan wrappers
    /// are normally created only by build-mode elimination, so hitting this
    /// indicates a misuse of the API rather than bad numeric input.
    #[error("orphan subtree encountered during in-place elimination: {0}")]
    OrphanInReuse(String),

    /// The clique tree handed to in-place elimination does not have the same
    /// shape as the cluster forest being eliminated.
    #[error("clique tree does not match cluster forest: {0}")]
    ShapeMismatch(String),

    /// The caller-supplied elimination function failed.
    #[error("elimination error: {0}")]
    Elimination(String),

    /// Internal engine error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TreeError {
    /// Whether this error signals a violated programming contract, as opposed
    /// to an ordinary runtime failure.
    ///
    /// Contract violations indicate a defect in the calling code; retrying
    /// the same call will fail the same way.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            TreeError::OrphanInReuse(_) | TreeError::ShapeMismatch(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TreeError::OrphanInReuse("clique over [3]".to_string());
        assert!(err.to_string().contains("in-place elimination"));

        let err = TreeError::Elimination("singular system".to_string());
        assert_eq!(err.to_string(), "elimination error: singular system");
    }

    #[test]
    fn test_contract_violation_classification() {
        assert!(TreeError::OrphanInReuse(String::new()).is_contract_violation());
        assert!(TreeError::ShapeMismatch(String::new()).is_contract_violation());
        assert!(!TreeError::Elimination(String::new()).is_contract_violation());
        assert!(!TreeError::Internal(String::new()).is_contract_violation());
    }
}
