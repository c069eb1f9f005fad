use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("Unterminated block comment.")]
    UnterminatedBlockComment { line: usize },

    #[error("Unterminated string.")]
    UnterminatedString { line: usize },

    #[error("Unexpected character.")]
    UnexpectedCharacter { ch: char, line: usize },

    #[error("Invalid escape sequence: '\\{ch}'.")]
    InvalidEscape { ch: char, line: usize },
}

impl Error {
    pub fn line(&self) -> usize {
        match self {
            Error::UnterminatedBlockComment { line } => *line,
            Error::UnterminatedString { line } => *line,
            Error::UnexpectedCharacter { line, .. } => *line,
            Error::InvalidEscape { line, .. } => *line,
        }
    }
}
