//! Compilation errors

use thiserror::Error;

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// Parse error reported by the front end
    #[error("SyntaxError: {0}")]
    Parse(String),

    /// Early error detected while generating code
    #[error("SyntaxError at {location}: {message}")]
    Syntax {
        /// Error message
        message: String,
        /// Source location
        location: String,
    },

    /// Syntax the engine does not implement
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A function needs more operand registers than allowed
    #[error("SyntaxError: expression too complex (register limit {limit} exceeded)")]
    RegisterLimitExceeded {
        /// Configured operand register limit
        limit: u16,
    },

    /// Too many stack allocated variables in one function
    #[error("SyntaxError: too many local variables (max {0})")]
    TooManyLocals(u16),

    /// Invalid assignment target
    #[error("SyntaxError: invalid assignment target")]
    InvalidAssignmentTarget,

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self::Syntax {
            message: message.into(),
            location: format!("{}:{}", line, column),
        }
    }

    /// Create an unsupported error
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error surfaces to scripts as a `SyntaxError`
    pub fn is_syntax_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Message without the error class prefix
    pub fn message(&self) -> String {
        match self {
            Self::Parse(msg) => msg.clone(),
            Self::Syntax { message, location } => format!("{message} ({location})"),
            other => {
                let text = other.to_string();
                text.strip_prefix("SyntaxError: ")
                    .map(str::to_string)
                    .unwrap_or(text)
            }
        }
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(CompileError::Parse("x".into()).is_syntax_error());
        assert!(CompileError::RegisterLimitExceeded { limit: 4 }.is_syntax_error());
        assert!(CompileError::unsupported("class").is_syntax_error());
        assert!(!CompileError::internal("oops").is_syntax_error());
    }

    #[test]
    fn test_message_strips_class() {
        let err = CompileError::TooManyLocals(10);
        assert_eq!(err.message(), "too many local variables (max 10)");
        let err = CompileError::syntax("Identifier 'x' has already been declared", 2, 5);
        assert_eq!(err.message(), "Identifier 'x' has already been declared (2:5)");
    }
}
