//! Error types shared by the evaluator and the template engine.
//!
//! Every failure aborts the render that raised it.  [`Error`] is what callers
//! see; [`EvalError`] is the cause carried inside [`Error::Evaluation`].

use thiserror::Error;

/// Top-level failure of an evaluation or a render.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed or partially invalid expression.
    #[error("cannot evaluate `{expression}`: {cause}")]
    Evaluation {
        expression: String,
        #[source]
        cause: EvalError,
    },

    /// `render` was called while the same engine was already rendering.
    #[error("a render is already in progress on this engine")]
    Reentrant,

    /// A control-flow directive does not fit the open scopes.
    #[error("{kind} (offset {offset})")]
    Structural { offset: usize, kind: StructuralError },

    /// The external directive hook reported a failure.
    #[error("directive `{directive}` failed: {message}")]
    Hook { directive: String, message: String },
}

impl Error {
    pub(crate) fn evaluation(expression: &str, cause: EvalError) -> Self {
        Error::Evaluation {
            expression: expression.to_owned(),
            cause,
        }
    }

    /// `true` when the root cause is a division by zero or an overflow,
    /// including failures raised inside nested argument evaluations.
    pub fn is_arithmetic(&self) -> bool {
        match self {
            Error::Evaluation { cause, .. } => match cause {
                EvalError::Arithmetic(_) => true,
                EvalError::Nested(inner) => inner.is_arithmetic(),
                _ => false,
            },
            _ => false,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structural { .. })
    }
}

/// Why an expression could not be evaluated.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid integer literal `{0}`")]
    BadNumber(String),

    #[error("unmatched parenthesis")]
    UnmatchedParen,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("expected an operand")]
    MissingOperand,

    #[error("expected an operator before `{0}`")]
    MissingOperator(String),

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("cannot convert {from} to {to}")]
    Cast { from: &'static str, to: &'static str },

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error("{name}: {message}")]
    Function { name: String, message: String },

    /// A function argument failed in its own evaluator.
    #[error(transparent)]
    Nested(Box<Error>),
}

/// Failures of the host integer arithmetic.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

/// Mismatches between control-flow directives and the scope stack.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("`{directive}` without an open {expected} block")]
    UnexpectedCloser {
        directive: &'static str,
        expected: &'static str,
    },

    #[error("{0} block is never closed")]
    Unclosed(&'static str),

    #[error("directive is missing its closing `]`")]
    UnterminatedDirective,
}
