//! Language-level error types and compile failures.
//!
//! [`JsError`] corresponds to the built-in error objects a script can
//! observe. [`CompileError`] is what the compilation pipeline produces when
//! a request cannot be satisfied; top-level entry points convert it into a
//! [`JsError`] with the matching [`ErrorKind`].

use std::fmt;

use crate::SourcePosition;

/// Built-in error constructor a failed compile surfaces as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Parse or analysis failure
    SyntaxError,
    /// Stack exhaustion while compiling
    RangeError,
    /// Code generation from strings refused
    EvalError,
    /// Engine-side failure with no script-visible cause
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// A language-level error with its message.
///
/// This is the pending exception a failed top-level compile leaves for the
/// caller.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, JsError};
///
/// let error = JsError::new(ErrorKind::SyntaxError, "Unexpected token");
/// assert_eq!(error.message, "Unexpected token");
/// assert!(error.source_position.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Source position where the error occurred
    pub source_position: Option<SourcePosition>,
}

impl JsError {
    /// Create an error without position information.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source_position: None,
        }
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for JsError {}

/// Failure of a compile request.
///
/// Bailouts are not errors; they are reported through [`crate::Bailout`]
/// values and never reach the caller as an exception.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The parser rejected the source text.
    #[error("{message}")]
    Parse {
        /// Parser diagnostic
        message: String,
        /// Where the parser gave up, if known
        position: Option<SourcePosition>,
    },

    /// Rewriting or scope analysis rejected the literal.
    #[error("{0}")]
    Analysis(String),

    /// Nesting or recursion exhausted the compiler's stack budget.
    #[error("Maximum call stack size exceeded")]
    StackOverflow,

    /// The native context refuses to compile code from strings.
    #[error("Code generation from strings disallowed for this context")]
    CodeGenFromStringsDisallowed,

    /// An on-stack replacement request paired a frame with the wrong
    /// offset interpretation.
    #[error("invalid OSR target: {0}")]
    OsrPairing(String),

    /// Serialized code could not be decoded for the given source.
    #[error("cached data rejected: {0}")]
    Decode(String),
}

impl CompileError {
    /// Create a parse error without position information.
    pub fn parse(message: impl Into<String>) -> Self {
        CompileError::Parse {
            message: message.into(),
            position: None,
        }
    }

    /// The language-level error kind this failure surfaces as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Parse { .. } | CompileError::Analysis(_) => ErrorKind::SyntaxError,
            CompileError::StackOverflow => ErrorKind::RangeError,
            CompileError::CodeGenFromStringsDisallowed => ErrorKind::EvalError,
            CompileError::OsrPairing(_) | CompileError::Decode(_) => ErrorKind::InternalError,
        }
    }
}

impl From<CompileError> for JsError {
    fn from(error: CompileError) -> Self {
        let source_position = match &error {
            CompileError::Parse { position, .. } => position.clone(),
            _ => None,
        };
        JsError {
            kind: error.kind(),
            message: error.to_string(),
            source_position,
        }
    }
}
