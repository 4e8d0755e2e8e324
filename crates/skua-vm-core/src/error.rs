//! VM error types

use skua_vm_compiler::CompileError;
use thiserror::Error;

use crate::value::Value;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (e.g., calling non-function)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference error (undefined variable)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Range error (e.g., invalid array length)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Syntax error (compile failure of `eval` or a top-level unit)
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// URI error (malformed URI sequence)
    #[error("URIError: {0}")]
    URIError(String),

    /// Eval error
    #[error("EvalError: {0}")]
    EvalError(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Stack overflow
    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    /// Thrown JS exception
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),

    /// Bytecode error
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] skua_vm_bytecode::BytecodeError),
}

/// A thrown JavaScript value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// The thrown value (as a string representation)
    pub message: String,
    /// Stack trace captured at throw time
    pub stack: Vec<StackFrame>,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A stack frame in error trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name
    pub function_name: String,
    /// Source name of the script
    pub source_name: String,
    /// Line number (1-based, 0 when unknown)
    pub line: u32,
    /// Column number (1-based, 0 when unknown)
    pub column: u32,
    /// Frame was entered through `new`
    pub is_constructor: bool,
    /// Frame runs `eval` code
    pub is_eval: bool,
    /// Frame is a native function
    pub is_native: bool,
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = if self.is_constructor { "new " } else { "" };
        let name = if self.function_name.is_empty() {
            "<anonymous>"
        } else {
            &self.function_name
        };
        if self.is_native {
            write!(f, "at {prefix}{name} (native)")
        } else if self.is_eval {
            write!(f, "at {prefix}{name} (eval at {}:{}:{})", self.source_name, self.line, self.column)
        } else {
            write!(f, "at {prefix}{name} ({}:{}:{})", self.source_name, self.line, self.column)
        }
    }
}

impl VmError {
    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    /// Create a reference error
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::ReferenceError(message.into())
    }

    /// Create a range error
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::RangeError(message.into())
    }

    /// Create a syntax error
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::SyntaxError(message.into())
    }

    /// Create a URI error
    pub fn uri_error(message: impl Into<String>) -> Self {
        Self::URIError(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Wrap a thrown script value
    pub fn exception(value: Value, message: impl Into<String>, stack: Vec<StackFrame>) -> Self {
        Self::Exception(Box::new(ThrownValue {
            value,
            message: message.into(),
            stack,
        }))
    }

    /// Errors a script `catch` can observe
    pub fn is_catchable(&self) -> bool {
        !matches!(self, Self::InternalError(_) | Self::Bytecode(_))
    }

    /// Constructor name of the Error object this error materializes into
    pub fn error_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::TypeError(_) => "TypeError",
            Self::ReferenceError(_) => "ReferenceError",
            Self::RangeError(_) | Self::StackOverflow => "RangeError",
            Self::SyntaxError(_) => "SyntaxError",
            Self::URIError(_) => "URIError",
            Self::EvalError(_) => "EvalError",
            _ => return None,
        })
    }

    /// Message of an engine-raised error
    pub fn message(&self) -> String {
        match self {
            Self::TypeError(m)
            | Self::ReferenceError(m)
            | Self::RangeError(m)
            | Self::SyntaxError(m)
            | Self::URIError(m)
            | Self::EvalError(m)
            | Self::InternalError(m) => m.clone(),
            Self::StackOverflow => "Maximum call stack size exceeded".to_string(),
            Self::Exception(thrown) => thrown.message.clone(),
            Self::Bytecode(e) => e.to_string(),
        }
    }
}

impl From<CompileError> for VmError {
    fn from(error: CompileError) -> Self {
        let text = error.to_string();
        match text.strip_prefix("SyntaxError: ") {
            Some(message) => Self::SyntaxError(message.to_string()),
            None => Self::SyntaxError(text),
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names() {
        assert_eq!(VmError::type_error("x").error_name(), Some("TypeError"));
        assert_eq!(VmError::StackOverflow.error_name(), Some("RangeError"));
        assert_eq!(VmError::internal("x").error_name(), None);
        assert!(!VmError::internal("x").is_catchable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            VmError::StackOverflow.to_string(),
            "RangeError: Maximum call stack size exceeded"
        );
        let frame = StackFrame {
            function_name: "f".into(),
            source_name: "main.js".into(),
            line: 3,
            column: 7,
            is_constructor: true,
            is_eval: false,
            is_native: false,
        };
        assert_eq!(frame.to_string(), "at new f (main.js:3:7)");
    }
}
