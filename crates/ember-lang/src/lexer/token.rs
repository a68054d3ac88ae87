use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{range::Range, source::SourceId};

#[derive(PartialEq, PartialOrd, Eq, Ord, Debug, Clone, Copy, Hash)]
pub enum Modifier {
    Public,
    Private,
    Protected,
    Internal,
    Static,
    Sealed,
    Abstract,
    Readonly,
}

impl Modifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::Public => "public",
            Modifier::Private => "private",
            Modifier::Protected => "protected",
            Modifier::Internal => "internal",
            Modifier::Static => "static",
            Modifier::Sealed => "sealed",
            Modifier::Abstract => "abstract",
            Modifier::Readonly => "readonly",
        }
    }

    pub fn is_accessibility(&self) -> bool {
        matches!(
            self,
            Modifier::Public | Modifier::Private | Modifier::Protected | Modifier::Internal
        )
    }
}

impl Display for Modifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(PartialEq, PartialOrd, Eq, Ord, Debug, Clone, Copy, Hash)]
pub enum Keyword {
    Using,
    Namespace,
    Class,
    Struct,
    Interface,
    Enum,
    Return,
}

impl Display for Keyword {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Keyword::Using => "using",
            Keyword::Namespace => "namespace",
            Keyword::Class => "class",
            Keyword::Struct => "struct",
            Keyword::Interface => "interface",
            Keyword::Enum => "enum",
            Keyword::Return => "return",
        };
        f.write_str(s)
    }
}

#[derive(PartialEq, PartialOrd, Eq, Ord, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
    pub source_id: SourceId,
}

impl Token {
    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

#[derive(PartialEq, PartialOrd, Eq, Ord, Debug, Clone)]
pub enum TokenKind {
    AndAnd,
    Arrow,
    Asterisk,
    Bang,
    BoolLiteral(bool),
    Colon,
    Comma,
    Dot,
    Eof,
    EqEq,
    Equal,
    Gt,
    Gte,
    Ident(SmolStr),
    Keyword(Keyword),
    LBrace,
    LBracket,
    LParen,
    Lt,
    Lte,
    Minus,
    Modifier(Modifier),
    NeEq,
    Null,
    NumberLiteral(SmolStr),
    OrOr,
    Percent,
    Plus,
    RBrace,
    RBracket,
    RParen,
    Semicolon,
    Slash,
    StringLiteral(String),
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self {
            TokenKind::AndAnd => write!(f, "&&"),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::Asterisk => write!(f, "*"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::BoolLiteral(b) => write!(f, "{}", b),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::Equal => write!(f, "="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::Keyword(k) => write!(f, "{}", k),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Modifier(m) => write!(f, "{}", m),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::Null => write!(f, "null"),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::OrOr => write!(f, "||"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::StringLiteral(s) => write!(f, "{:?}", s),
        }
    }
}
