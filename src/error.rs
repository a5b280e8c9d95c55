//! Error types for the lecture-to-notebook pipeline.

use std::fmt;
use thiserror::Error;

/// A single field-level schema violation found while validating a chunk
/// extraction reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Section id the violation belongs to, if known
    pub section_id: Option<String>,
    /// Field that failed validation (e.g. "priority")
    pub field: String,
    /// Human-readable description of the problem
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section_id {
            Some(id) => write!(f, "{}.{}: {}", id, self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

/// The structured list of violations produced by one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Error type for pipeline operations.
///
/// Component-local failures (invalid chunk replies, transient provider
/// errors, unparseable generation responses) are absorbed upstream and
/// degrade gracefully; only persistent provider errors and structurally
/// empty notebooks escalate to the caller.
#[derive(Error, Debug)]
pub enum LecternError {
    /// A chunk extraction reply failed schema validation
    #[error("schema validation failed: {0}")]
    Validation(Violations),

    /// A generation response could not be parsed into any cell
    #[error("generation response contained no recognizable cell markers")]
    Format,

    /// Network or rate-limit failure; retried with backoff, then demoted
    /// to a chunk-level skip
    #[error("transient provider failure: {0}")]
    TransientProvider(String),

    /// Authentication or quota failure; fatal for the whole run
    #[error("provider rejected request: {0}")]
    PersistentProvider(String),

    /// Instructor/student cell sequences diverged
    #[error("notebook parity violation: {0}")]
    Parity(String),

    /// An entire notebook's generation produced zero cells
    #[error("generation produced no cells for the notebook")]
    EmptyNotebook,

    /// No sections survived the priority filter
    #[error("no sections met priority threshold {0}")]
    NoSections(u8),

    /// I/O error reading or writing pipeline artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// PDF loading or rendering failure
    #[error("PDF error: {0}")]
    Pdf(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, LecternError>;

impl LecternError {
    /// True for failures worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientProvider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        let v = Violation {
            section_id: Some("intro".into()),
            field: "priority".into(),
            message: "must be between 1 and 10, got 15".into(),
        };
        assert_eq!(v.to_string(), "intro.priority: must be between 1 and 10, got 15");
    }

    #[test]
    fn test_violations_joined() {
        let vs = Violations(vec![
            Violation {
                section_id: None,
                field: "sections".into(),
                message: "missing".into(),
            },
            Violation {
                section_id: Some("a".into()),
                field: "pages".into(),
                message: "empty".into(),
            },
        ]);
        assert_eq!(vs.to_string(), "sections: missing; a.pages: empty");
    }

    #[test]
    fn test_transient_classification() {
        assert!(LecternError::TransientProvider("429".into()).is_transient());
        assert!(!LecternError::PersistentProvider("401".into()).is_transient());
        assert!(!LecternError::Format.is_transient());
    }
}
