pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::bytes::complete::{take, take_till, take_until};
use nom::combinator::opt;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while_m_n},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, none_of},
    combinator::{map, map_opt, map_res, recognize, value},
    multi::many0_count,
    sequence::{delimited, pair, preceded},
};
use nom_locate::position;
use smol_str::SmolStr;
use token::{Keyword, Modifier, Token, TokenKind};

use crate::range::{Position, Range, Span};
use crate::source::SourceId;

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| {
                let source_id = span.extra;
                Token {
                    range: span.into(),
                    kind: $kind,
                    source_id,
                }
            })
            .parse(input)
        }
    };
}

/// Turns Ember source text into tokens.
///
/// Lexing never fails as a whole: characters that cannot start a token are
/// reported as [`LexerError`]s and skipped so the parser still sees the rest
/// of the input.
#[derive(Debug, Clone, Default)]
pub struct Lexer;

impl Lexer {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize(&self, input: &str, source_id: SourceId) -> (Vec<Token>, Vec<LexerError>) {
        let mut span = Span::new_extra(input, source_id);
        let mut tokens = Vec::new();
        let mut errors = Vec::new();

        loop {
            if let Ok((rest, _)) = trivia(span) {
                span = rest;
            }

            if span.fragment().is_empty() {
                break;
            }

            let lexed = if span.fragment().starts_with("/*") {
                None
            } else {
                token(span).ok()
            };

            match lexed {
                Some((rest, token)) => {
                    tokens.push(token);
                    span = rest;
                }
                None => match recover(span) {
                    Some((rest, error)) => {
                        errors.push(error);
                        span = rest;
                    }
                    None => break,
                },
            }
        }

        tokens.push(Token {
            range: Range::at(span.into(), 0),
            kind: TokenKind::Eof,
            source_id,
        });

        (tokens, errors)
    }
}

define_token_parser!(and_and, "&&", TokenKind::AndAnd);
define_token_parser!(arrow, "=>", TokenKind::Arrow);
define_token_parser!(asterisk, "*", TokenKind::Asterisk);
define_token_parser!(bang, "!", TokenKind::Bang);
define_token_parser!(colon, ":", TokenKind::Colon);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(dot, ".", TokenKind::Dot);
define_token_parser!(empty_string, "\"\"", TokenKind::StringLiteral(String::new()));
define_token_parser!(eq_eq, "==", TokenKind::EqEq);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(gte, ">=", TokenKind::Gte);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(lte, "<=", TokenKind::Lte);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(ne_eq, "!=", TokenKind::NeEq);
define_token_parser!(or_or, "||", TokenKind::OrOr);
define_token_parser!(percent, "%", TokenKind::Percent);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(r_brace, "}", TokenKind::RBrace);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(semicolon, ";", TokenKind::Semicolon);
define_token_parser!(slash, "/", TokenKind::Slash);

fn line_comment(input: Span) -> IResult<Span, Span> {
    recognize(pair(tag("//"), take_till(|c: char| c == '\n' || c == '\r'))).parse(input)
}

fn block_comment(input: Span) -> IResult<Span, Span> {
    recognize(delimited(tag("/*"), take_until("*/"), tag("*/"))).parse(input)
}

fn trivia(input: Span) -> IResult<Span, usize> {
    many0_count(alt((multispace1, line_comment, block_comment))).parse(input)
}

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((
        l_brace, r_brace, l_paren, r_paren, l_bracket, r_bracket, semicolon, comma, dot, colon,
    ))
    .parse(input)
}

fn operators(input: Span) -> IResult<Span, Token> {
    alt((
        arrow, eq_eq, ne_eq, lte, gte, and_and, or_or, equal, lt, gt, bang, plus, minus, asterisk, slash, percent,
    ))
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    map(recognize(pair(digit1, opt(pair(char('.'), digit1)))), |span: Span| {
        let source_id = span.extra;
        Token {
            range: span.into(),
            kind: TokenKind::NumberLiteral(SmolStr::new(span.fragment())),
            source_id,
        }
    })
    .parse(input)
}

fn unicode(input: Span) -> IResult<Span, char> {
    map_opt(
        map_res(
            preceded(
                char('u'),
                delimited(
                    char('{'),
                    take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
                    char('}'),
                ),
            ),
            |span: Span| u32::from_str_radix(span.fragment(), 16),
        ),
        char::from_u32,
    )
    .parse(input)
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (span, start) = position(input)?;
    let (span, s) = delimited(
        char('"'),
        escaped_transform(
            none_of("\"\\\r\n"),
            '\\',
            alt((
                value('\\', char('\\')),
                value('\"', char('\"')),
                value('\r', char('r')),
                value('\n', char('n')),
                value('\t', char('t')),
                value('\0', char('0')),
                unicode,
            )),
        ),
        char('"'),
    )
    .parse(span)?;
    let (span, end) = position(span)?;
    let source_id = start.extra;

    Ok((
        span,
        Token {
            range: Range {
                start: start.into(),
                end: end.into(),
            },
            kind: TokenKind::StringLiteral(s),
            source_id,
        },
    ))
}

fn literals(input: Span) -> IResult<Span, Token> {
    alt((number_literal, empty_string, string_literal)).parse(input)
}

fn ident_or_keyword(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0_count(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| {
            let source_id = span.extra;
            let kind = match *span.fragment() {
                "true" => TokenKind::BoolLiteral(true),
                "false" => TokenKind::BoolLiteral(false),
                "null" => TokenKind::Null,
                "using" => TokenKind::Keyword(Keyword::Using),
                "namespace" => TokenKind::Keyword(Keyword::Namespace),
                "class" => TokenKind::Keyword(Keyword::Class),
                "struct" => TokenKind::Keyword(Keyword::Struct),
                "interface" => TokenKind::Keyword(Keyword::Interface),
                "enum" => TokenKind::Keyword(Keyword::Enum),
                "return" => TokenKind::Keyword(Keyword::Return),
                "public" => TokenKind::Modifier(Modifier::Public),
                "private" => TokenKind::Modifier(Modifier::Private),
                "protected" => TokenKind::Modifier(Modifier::Protected),
                "internal" => TokenKind::Modifier(Modifier::Internal),
                "static" => TokenKind::Modifier(Modifier::Static),
                "sealed" => TokenKind::Modifier(Modifier::Sealed),
                "abstract" => TokenKind::Modifier(Modifier::Abstract),
                "readonly" => TokenKind::Modifier(Modifier::Readonly),
                ident => TokenKind::Ident(SmolStr::new(ident)),
            };

            Token {
                range: span.into(),
                kind,
                source_id,
            }
        },
    )
    .parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((literals, operators, punctuations, ident_or_keyword)).parse(input)
}

/// Skips input that no token parser accepts and describes why.
fn recover(span: Span) -> Option<(Span, LexerError)> {
    let fragment = *span.fragment();
    let start: Position = span.into();

    if fragment.starts_with("/*") {
        let (rest, _) = skip(span, fragment.chars().count())?;
        return Some((rest, LexerError::UnterminatedComment(Range::at(start, 2))));
    }

    if fragment.starts_with('"') {
        let (count, terminated) = scan_string(fragment);
        let (rest, _) = skip(span, count)?;
        let range = Range::at(start, count);
        let error = if terminated {
            LexerError::InvalidEscape(range)
        } else {
            LexerError::UnterminatedString(range)
        };
        return Some((rest, error));
    }

    let c = fragment.chars().next()?;
    let (rest, _) = skip(span, 1)?;
    Some((rest, LexerError::UnexpectedCharacter(Range::at(start, 1), c)))
}

fn skip(span: Span, count: usize) -> Option<(Span, Span)> {
    take::<usize, Span, nom::error::Error<Span>>(count).parse(span).ok()
}

/// Counts the chars of a string literal up to its closing quote, or up to the end of its line.
fn scan_string(fragment: &str) -> (usize, bool) {
    let mut chars = fragment.chars().enumerate().skip(1);

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' => return (i + 1, true),
            '\n' | '\r' => return (i, false),
            _ => {}
        }
    }

    (fragment.chars().count(), false)
}
