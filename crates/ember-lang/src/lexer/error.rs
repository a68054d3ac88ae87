use thiserror::Error;

use crate::diagnostic::{Diagnostic, codes};
use crate::range::Range;
use crate::source::SourceId;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum LexerError {
    #[error("Unexpected character `{1}`")]
    UnexpectedCharacter(Range, char),
    #[error("Newline in constant")]
    UnterminatedString(Range),
    #[error("Unrecognized escape sequence")]
    InvalidEscape(Range),
    #[error("End-of-file found, `*/` expected")]
    UnterminatedComment(Range),
}

impl LexerError {
    pub fn range(&self) -> &Range {
        match self {
            LexerError::UnexpectedCharacter(range, _)
            | LexerError::UnterminatedString(range)
            | LexerError::InvalidEscape(range)
            | LexerError::UnterminatedComment(range) => range,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LexerError::UnexpectedCharacter(..) => codes::UNEXPECTED_CHARACTER,
            LexerError::UnterminatedString(_) => codes::NEWLINE_IN_CONSTANT,
            LexerError::InvalidEscape(_) => codes::UNRECOGNIZED_ESCAPE,
            LexerError::UnterminatedComment(_) => codes::UNTERMINATED_COMMENT,
        }
    }

    pub fn to_diagnostic(&self, source: SourceId) -> Diagnostic {
        Diagnostic::error(self.code(), self.to_string()).at(source, self.range().clone())
    }
}
