//! Engine error taxonomy.
//!
//! Input and lookup errors are surfaced immediately and precisely; runner
//! failures never appear here — the engine folds them into a `Partial`
//! outcome before they can cross the boundary.

use serde::Serialize;
use thiserror::Error;

use crate::schema::ViolationSet;

/// Stable error codes, used in HTTP bodies and audit records.
pub mod codes {
    pub const VALIDATION: &str = "E_VALIDATION";
    pub const AGENT_NOT_FOUND: &str = "E_AGENT_NOT_FOUND";
    pub const DUPLICATE_AGENT: &str = "E_DUPLICATE_AGENT";
    pub const INVALID_DESCRIPTOR: &str = "E_INVALID_DESCRIPTOR";
    pub const INTERRUPTED: &str = "E_INTERRUPTED";
    pub const INTERNAL: &str = "E_INTERNAL";
}

/// Errors raised by the registry and the execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller's input violated the agent's declared input schema.
    #[error("input validation failed: {0}")]
    Validation(ViolationSet),

    /// No agent registered under the requested name.
    #[error("unknown agent: {0}")]
    AgentNotFound(String),

    /// A second descriptor was registered under an existing name.
    #[error("agent already registered: {0}")]
    DuplicateAgent(String),

    /// A descriptor is structurally unusable (empty name, empty output schema).
    #[error("invalid descriptor for '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// The run was cut short; the caller received a fallback report instead.
    #[error("execution interrupted: {0}")]
    Interrupted(String),

    /// A defect in the engine itself, not in the agent being run.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => codes::VALIDATION,
            EngineError::AgentNotFound(_) => codes::AGENT_NOT_FOUND,
            EngineError::DuplicateAgent(_) => codes::DUPLICATE_AGENT,
            EngineError::InvalidDescriptor { .. } => codes::INVALID_DESCRIPTOR,
            EngineError::Interrupted(_) => codes::INTERRUPTED,
            EngineError::Internal(_) => codes::INTERNAL,
        }
    }
}

/// The terminal failure kinds an [`ExecutionOutcome`](crate::engine::ExecutionOutcome)
/// can carry. Interruption is deliberately absent: an interrupted run
/// degrades to `Partial`, never to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    AgentNotFound,
    Internal,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Validation => codes::VALIDATION,
            FailureKind::AgentNotFound => codes::AGENT_NOT_FOUND,
            FailureKind::Internal => codes::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldViolation, ViolationSet};

    #[test]
    fn codes_are_stable() {
        let err = EngineError::AgentNotFound("ghost".into());
        assert_eq!(err.code(), "E_AGENT_NOT_FOUND");
        assert_eq!(FailureKind::Validation.code(), "E_VALIDATION");
    }

    #[test]
    fn validation_error_displays_field_detail() {
        let set = ViolationSet::new(vec![FieldViolation::new(
            "max_products",
            "must be between 1 and 10",
        )]);
        let err = EngineError::Validation(set);
        let text = err.to_string();
        assert!(text.contains("max_products"));
        assert!(text.contains("between 1 and 10"));
    }
}
