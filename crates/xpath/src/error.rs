use core::fmt;
use std::sync::Arc;

use crate::names::ExpandedName;

/// Parse-time failure. Always carries the full expression text so the message
/// can be reported without the caller having to remember what was compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error in expression {expression}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub expression: String,
    /// Byte offset of the offending token, when known.
    pub position: Option<usize>,
}

impl SyntaxError {
    pub fn new(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expression: expression.into(),
            position: None,
        }
    }

    #[must_use]
    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluationErrorKind {
    /// A value of the wrong type reached an operation (e.g. filtering a string).
    Type,
    UndefinedVariable,
    CircularVariable,
    /// The context node (or document) needed by an expression is absent.
    NoContext,
    /// Bad arguments or unavailable resources inside a system function.
    Function,
    /// Raised by a host-supplied extension function or resolver.
    Host,
    /// A syntax error deferred by forwards-compatible parsing.
    Deferred,
    /// Broken internal invariant; not caused by the expression text.
    Internal,
}

impl fmt::Display for EvaluationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvaluationErrorKind::Type => "type error",
            EvaluationErrorKind::UndefinedVariable => "undefined variable",
            EvaluationErrorKind::CircularVariable => "circular variable",
            EvaluationErrorKind::NoContext => "missing context",
            EvaluationErrorKind::Function => "function error",
            EvaluationErrorKind::Host => "extension error",
            EvaluationErrorKind::Deferred => "deferred syntax error",
            EvaluationErrorKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct EvaluationError {
    pub kind: EvaluationErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl EvaluationError {
    pub fn new(kind: EvaluationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(EvaluationErrorKind::Type, message)
    }

    pub fn function(message: impl Into<String>) -> Self {
        Self::new(EvaluationErrorKind::Function, message)
    }

    pub fn no_context(message: impl Into<String>) -> Self {
        Self::new(EvaluationErrorKind::NoContext, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EvaluationErrorKind::Internal, message)
    }

    pub fn undefined_variable(name: &ExpandedName) -> Self {
        Self::new(
            EvaluationErrorKind::UndefinedVariable,
            format!("Variable {name} is undefined"),
        )
    }

    pub fn circular_variable(name: &ExpandedName) -> Self {
        Self::new(
            EvaluationErrorKind::CircularVariable,
            format!("Circular definition of variable {name}"),
        )
    }

    /// Wrap an error raised by host code, keeping its message and the original
    /// error as the source.
    pub fn host(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            kind: EvaluationErrorKind::Host,
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }

    #[must_use]
    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }
}

impl From<SyntaxError> for EvaluationError {
    fn from(err: SyntaxError) -> Self {
        EvaluationError::new(EvaluationErrorKind::Deferred, err.to_string())
            .with_source(Some(Arc::new(err) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

/// Errors raised while resolving names against a static context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StaticError {
    #[error("Prefix {0} has not been declared")]
    UndeclaredPrefix(String),
    #[error("Invalid QName {0}")]
    InvalidName(String),
    #[error("Variable {0} has not been declared")]
    UndeclaredVariable(ExpandedName),
    #[error("Variables are not allowed in a standalone expression")]
    VariablesNotAllowed,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl Error {
    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::Syntax(_))
    }

    pub fn evaluation_kind(&self) -> Option<EvaluationErrorKind> {
        match self {
            Error::Evaluation(e) => Some(e.kind),
            Error::Syntax(_) => None,
        }
    }
}

pub type Result<T, E = EvaluationError> = core::result::Result<T, E>;
