use thiserror::Error;

use crate::diagnostic::{Diagnostic, codes};
use crate::lexer::token::Token;

#[derive(Error, Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum ParseError {
    #[error("Identifier expected")]
    IdentifierExpected(Token),
    #[error("`{expected}` expected")]
    Expected { expected: &'static str, found: Token },
    #[error("Invalid expression term `{0}`")]
    InvalidExpressionTerm(Token),
    #[error("Integral constant is too large")]
    IntegralConstantTooLarge(Token),
    #[error("Type or namespace definition, or end-of-file expected")]
    NamespaceMemberExpected(Token),
    #[error("Invalid token `{0}` in class, struct, or interface member declaration")]
    InvalidMemberToken(Token),
    #[error("A using clause must precede all other elements defined in the namespace")]
    UsingAfterDeclaration(Token),
    #[error("Only return statements are supported in method bodies, found `{0}`")]
    UnsupportedStatement(Token),
    #[error("An expression is too long or complex to compile")]
    ExpressionTooComplex(Token),
}

impl ParseError {
    pub fn token(&self) -> &Token {
        match self {
            ParseError::IdentifierExpected(token)
            | ParseError::Expected { found: token, .. }
            | ParseError::InvalidExpressionTerm(token)
            | ParseError::IntegralConstantTooLarge(token)
            | ParseError::NamespaceMemberExpected(token)
            | ParseError::InvalidMemberToken(token)
            | ParseError::UsingAfterDeclaration(token)
            | ParseError::UnsupportedStatement(token)
            | ParseError::ExpressionTooComplex(token) => token,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ParseError::IdentifierExpected(_) => codes::IDENTIFIER_EXPECTED,
            ParseError::Expected { expected, .. } => match *expected {
                ";" => codes::SEMICOLON_EXPECTED,
                "}" => codes::CLOSE_BRACE_EXPECTED,
                "{" => codes::OPEN_BRACE_EXPECTED,
                ")" => codes::CLOSE_PAREN_EXPECTED,
                _ => codes::SYNTAX_ERROR,
            },
            ParseError::InvalidExpressionTerm(_) => codes::INVALID_EXPRESSION_TERM,
            ParseError::IntegralConstantTooLarge(_) => codes::INTEGRAL_CONSTANT_TOO_LARGE,
            ParseError::NamespaceMemberExpected(_) => codes::NAMESPACE_MEMBER_EXPECTED,
            ParseError::InvalidMemberToken(_) => codes::INVALID_MEMBER_TOKEN,
            ParseError::UsingAfterDeclaration(_) => codes::USING_AFTER_DECLARATION,
            ParseError::UnsupportedStatement(_) => codes::UNSUPPORTED_STATEMENT,
            ParseError::ExpressionTooComplex(_) => codes::EXPRESSION_TOO_COMPLEX,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let token = self.token();
        Diagnostic::error(self.code(), self.to_string()).at(token.source_id, token.range.clone())
    }
}
