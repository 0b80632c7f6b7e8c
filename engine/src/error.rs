use thiserror::Error;

/// Every failure the engine can surface to a caller.
///
/// `Validation` and `Parse` mean the caller handed over malformed input.
/// `RuleViolation` means the input was well formed but the rules forbid it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("cannot parse '{input}' at '{fragment}': {message}")]
    Parse {
        input: String,
        fragment: String,
        message: String,
    },

    #[error("rule violation ({field}): {message}")]
    RuleViolation { field: String, message: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("engine limit exceeded: {limit} (after {iterations} iterations)")]
    EngineLimitExceeded { limit: &'static str, iterations: usize },
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn rule(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleViolation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Parse errors count as validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Parse { .. })
    }

    pub fn is_rule_violation(&self) -> bool {
        matches!(self, Self::RuleViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The parameter or payload field the error points at, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } | Self::RuleViolation { field, .. } => Some(field),
            Self::Parse { fragment, .. } => Some(fragment),
            Self::NotFound { .. } | Self::EngineLimitExceeded { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
