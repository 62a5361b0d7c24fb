use std::fmt;

use crate::value::Value;

/// Check the operand count of a native operation, returning `ProgramError::Arity` on mismatch.
///
/// # Forms
///
/// ```ignore
/// check_arity!(args, "cons", 2);       // exactly 2
/// check_arity!(args, "format", 1..=2); // 1 to 2 inclusive
/// check_arity!(args, "printf", 1..);   // 1 or more
/// ```
#[macro_export]
macro_rules! check_arity {
    ($args:expr, $name:expr, $exact:literal) => {
        if $args.len() != $exact {
            return Err($crate::ProgramError::arity(
                $name,
                stringify!($exact),
                $args.len(),
            ));
        }
    };
    ($args:expr, $name:expr, $lo:literal ..= $hi:literal) => {
        if $args.len() < $lo || $args.len() > $hi {
            return Err($crate::ProgramError::arity(
                $name,
                concat!(stringify!($lo), "-", stringify!($hi)),
                $args.len(),
            ));
        }
    };
    ($args:expr, $name:expr, $lo:literal ..) => {
        if $args.len() < $lo {
            return Err($crate::ProgramError::arity(
                $name,
                concat!(stringify!($lo), "+"),
                $args.len(),
            ));
        }
    };
}

/// A position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(line: usize, col: usize) -> Self {
        Span { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// The one error type a Sprig program can raise.
///
/// Both the tree walker and the stack machine report every user-level failure
/// through this type; the variant only says what kind of failure it was.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProgramError {
    #[error("Assertion failed: {}", .0.to_plain_string())]
    Assertion(Value),

    #[error("Unknown name: {0}")]
    Unbound(String),

    #[error("Type error: expected {expected}, got {got}")]
    Type { expected: String, got: String },

    #[error("Arity error: {name} expects {expected} args, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Not callable: {0}")]
    NotCallable(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unclassified form {form}: {reason}")]
    Unclassified { form: String, reason: String },

    #[error("Maximum recursion depth exceeded ({0})")]
    DepthExceeded(usize),

    #[error("Reader error at {span}: {message}")]
    Reader { message: String, span: Span },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Eval error: {0}")]
    Eval(String),
}

impl ProgramError {
    pub fn eval(msg: impl Into<String>) -> Self {
        ProgramError::Eval(msg.into())
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        ProgramError::Unbound(name.into())
    }

    pub fn type_error(expected: impl Into<String>, got: impl Into<String>) -> Self {
        ProgramError::Type {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn arity(name: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        ProgramError::Arity {
            name: name.into(),
            expected: expected.into(),
            got,
        }
    }

    pub fn unclassified(form: impl Into<String>, reason: impl Into<String>) -> Self {
        ProgramError::Unclassified {
            form: form.into(),
            reason: reason.into(),
        }
    }

    pub fn reader(message: impl Into<String>, span: Span) -> Self {
        ProgramError::Reader {
            message: message.into(),
            span,
        }
    }

    /// The value carried by a failed assertion.
    pub fn assertion_message(&self) -> Option<&Value> {
        match self {
            ProgramError::Assertion(msg) => Some(msg),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProgramError {
    fn from(err: std::io::Error) -> Self {
        ProgramError::Io(err.to_string())
    }
}
