use thiserror::Error;

use crate::ast::Pos;

/// Kind of a fatal evaluation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Name,
    TypeUnknown,
    ConditionType,
    IncompatibleOperands,
    NotAnLvalue,
    ReferenceRequired,
    Arity,
    ArgumentTypeMismatch,
    MissingReturn,
    NotCallable,
    IndexOutOfRange,
    NoSuchField,
    ConversionFailure,
    ArraySize,
    ArithmeticFault,
    NoMain,
    Unsupported,
    DanglingReference,
    Io,
}

/// An error that aborts the current run. `message` is already localized.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", located(.pos, .message))]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Pos>,
}

fn located(pos: &Option<Pos>, message: &str) -> String {
    match pos {
        Some(p) => format!("{}: {}", p, message),
        None => message.to_string(),
    }
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pos: None,
        }
    }

    /// Attach a position unless a more specific (inner) one is already set.
    pub fn at(mut self, pos: Pos) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
