use std::io;
use std::path::PathBuf;

use loxmod_core::{Error as CoreError, Token, Type};
use thiserror::Error;

/// Compile-time diagnostics. These never stop the phase that produced them; they are collected
/// and only checked when the pipeline moves on to the next phase.
#[derive(Debug, Error, PartialEq, Clone)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("[line {line}] scanner error: {source}")]
    ScannerError { line: usize, source: CoreError },

    #[error("[line {line}] parser error: {msg}")]
    ParserError {
        token: Token,

        // line is copied from token, this is required because thiserror doesn't support field
        // access, e.g {token.line:?}, in error strings
        line: usize,
        msg: String,
    },

    #[error("[line {line}] resolver error: {msg}")]
    ResolverError { token: Token, line: usize, msg: String },
}

impl Error {
    pub(crate) fn parser_error(token: &Token, msg: &str) -> Self {
        Error::ParserError {
            token: token.clone(),
            line: token.line,
            msg: String::from(msg),
        }
    }

    pub(crate) fn resolver_error(token: &Token, msg: &str) -> Self {
        Error::ResolverError {
            token: token.clone(),
            line: token.line,
            msg: String::from(msg),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Error::ScannerError { line, .. }
            | Error::ParserError { line, .. }
            | Error::ResolverError { line, .. } => *line,
        }
    }

    /// The bare message, without the line prefix used by `Display`.
    pub fn message(&self) -> String {
        match self {
            Error::ScannerError { source, .. } => source.to_string(),
            Error::ParserError { msg, .. } | Error::ResolverError { msg, .. } => msg.clone(),
        }
    }

    /// Where in the source the error happened, formatted for diagnostics.
    pub(crate) fn location(&self) -> String {
        match self {
            Error::ScannerError { .. } => String::new(),
            Error::ParserError { token, .. } | Error::ResolverError { token, .. } => {
                if token.ty == Type::Eof {
                    String::from(" at end")
                } else {
                    format!(" at '{}'", token.lexeme)
                }
            }
        }
    }
}

impl From<CoreError> for Error {
    fn from(value: CoreError) -> Self {
        Error::ScannerError {
            line: value.line(),
            source: value,
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Operand must be a number.")]
    OperandNotNumber { line: usize },

    #[error("Operands must be numbers.")]
    OperandsNotNumbers { line: usize },

    #[error("Operands must be two numbers or two strings.")]
    InvalidAddOperands { line: usize },

    #[error("Undefined variable '{name}'.")]
    UndefinedVariable { name: String, line: usize },

    #[error("Undefined property '{name}'.")]
    UndefinedProperty { name: String, line: usize },

    #[error("Can only call functions and classes.")]
    NotCallable { line: usize },

    #[error("Expected {expected} arguments but got {actual}.")]
    ArityMismatch {
        expected: usize,
        actual: usize,
        line: usize,
    },

    #[error("Only instances have {what}.")]
    NotAnInstance { what: &'static str, line: usize },

    #[error("Superclass must be a class.")]
    SuperclassNotClass { line: usize },

    #[error("Stack overflow.")]
    StackOverflow { line: usize },

    #[error("Failed to write output: {source}")]
    Output { line: usize, source: io::Error },

    #[error("Failed to import module '{name}'.")]
    Import {
        name: String,
        line: usize,
        source: Box<ModuleError>,
    },
}

impl RuntimeError {
    pub fn line(&self) -> usize {
        match self {
            RuntimeError::OperandNotNumber { line }
            | RuntimeError::OperandsNotNumbers { line }
            | RuntimeError::InvalidAddOperands { line }
            | RuntimeError::UndefinedVariable { line, .. }
            | RuntimeError::UndefinedProperty { line, .. }
            | RuntimeError::NotCallable { line }
            | RuntimeError::ArityMismatch { line, .. }
            | RuntimeError::NotAnInstance { line, .. }
            | RuntimeError::SuperclassNotClass { line }
            | RuntimeError::StackOverflow { line }
            | RuntimeError::Output { line, .. }
            | RuntimeError::Import { line, .. } => *line,
        }
    }

    pub(crate) fn undefined_variable(token: &Token) -> Self {
        RuntimeError::UndefinedVariable {
            name: token.lexeme.clone(),
            line: token.line,
        }
    }

    pub(crate) fn undefined_property(token: &Token) -> Self {
        RuntimeError::UndefinedProperty {
            name: token.lexeme.clone(),
            line: token.line,
        }
    }
}

/// Lookup or assignment of a name that no frame in the chain defines.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("Undefined variable '{name}'.")]
pub struct UndefinedVariable {
    pub name: String,
}

impl UndefinedVariable {
    pub(crate) fn new(name: &str) -> Self {
        UndefinedVariable {
            name: String::from(name),
        }
    }
}

/// Outcome of a module pipeline that did not complete.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Error reading file: {}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("module '{name}' failed to compile")]
    Compile { name: String },

    #[error("module '{name}' failed at runtime")]
    Runtime { name: String },
}

impl ModuleError {
    /// Process exit code a command line host maps this failure to.
    pub fn exit_code(&self) -> u8 {
        match self {
            ModuleError::Read { .. } => 71,
            ModuleError::Compile { .. } => 65,
            ModuleError::Runtime { .. } => 70,
        }
    }
}

pub(crate) type RuntimeResult<T> = Result<T, RuntimeError>;
