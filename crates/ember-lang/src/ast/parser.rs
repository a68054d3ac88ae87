use std::collections::BTreeSet;
use std::fmt::Display;

use itertools::Itertools;
use thiserror::Error;

use super::error::ParseError;
use super::node::{
    BinaryOp, Body, CompilationUnit, ConstructorDecl, EnumMemberDecl, Expr, ExprKind, FieldDecl, Ident, Item, Literal,
    Member, MethodDecl, Modifiers, NamespaceDecl, Param, PropertyDecl, QualifiedName, Stmt, TypeDecl, TypeKind,
    TypeRef, UnaryOp, UsingDirective,
};
use crate::lexer::token::{Keyword, Token, TokenKind};
use crate::range::{Position, Range};

#[derive(Debug, Clone, PartialEq, Error)]
pub struct ErrorReporter {
    errors: BTreeSet<ParseError>,
    max_errors: usize,
}

impl Display for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.errors.iter().join(", "))
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self {
            errors: BTreeSet::new(),
            max_errors: 100,
        }
    }
}

impl ErrorReporter {
    pub fn new(max_errors: usize) -> Self {
        Self {
            errors: BTreeSet::new(),
            max_errors,
        }
    }

    /// Records an error unless another one was already reported at the same token.
    pub fn report(&mut self, error: ParseError) {
        let start = &error.token().range.start;

        if self.errors.len() < self.max_errors && !self.errors.iter().any(|e| &e.token().range.start == start) {
            self.errors.insert(error);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ParseError> {
        self.errors
            .iter()
            .cloned()
            .sorted_by(|a, b| a.token().range.cmp(&b.token().range))
            .collect()
    }
}

/// Deepest expression tree the parser builds, and the deepest run of nested
/// parentheses or call arguments it descends into. Lowering at most doubles
/// the depth, which keeps every emitted body under the decoder's limit.
pub const MAX_EXPRESSION_DEPTH: usize = 256;

/// Recursive-descent parser producing a [`CompilationUnit`].
///
/// Errors never abort the parse. They are collected in an [`ErrorReporter`]
/// and the parser resynchronises at `;`, `}` or the next declaration keyword.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    nesting: usize,
    errors: ErrorReporter,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !tokens.last().is_some_and(Token::is_eof) {
            let range = tokens
                .last()
                .map(|t| Range::at(t.range.end.clone(), 0))
                .unwrap_or_default();
            let source_id = tokens.last().map(|t| t.source_id).unwrap_or_default();
            tokens.push(Token {
                range,
                kind: TokenKind::Eof,
                source_id,
            });
        }

        Self {
            tokens,
            current: 0,
            nesting: 0,
            errors: ErrorReporter::default(),
        }
    }

    pub fn parse(mut self) -> (CompilationUnit, Vec<ParseError>) {
        let usings = self.parse_usings();
        let items = self.parse_items(false);

        (CompilationUnit { usings, items }, self.errors.to_vec())
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn peek_nth(&self, n: usize) -> &Token {
        &self.tokens[(self.current + n).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is_eof() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::Expected {
                expected,
                found: self.peek().clone(),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident {
                    name,
                    range: token.range,
                })
            }
            _ => Err(ParseError::IdentifierExpected(token)),
        }
    }

    fn previous_end(&self) -> Position {
        self.current
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.range.end.clone())
            .unwrap_or_default()
    }

    fn range_from(&self, start: &Range) -> Range {
        Range::new(start.start.clone(), self.previous_end())
    }

    #[inline(always)]
    fn starts_declaration(kind: &TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Modifier(_)
                | TokenKind::Keyword(
                    Keyword::Class | Keyword::Struct | Keyword::Interface | Keyword::Enum | Keyword::Namespace | Keyword::Using
                )
        )
    }

    /// Skips tokens until the end of the broken construct.
    ///
    /// Stops after a `;` or a balanced `{ }` block, and before an unbalanced
    /// `}`. With `at_declaration`, also stops before a token that starts a
    /// new declaration once at least one token was skipped.
    fn synchronize(&mut self, at_declaration: bool) {
        let start = self.current;
        let mut depth = 0usize;

        loop {
            let kind = self.peek_kind();
            match kind {
                TokenKind::Eof => break,
                TokenKind::RBrace if depth == 0 => break,
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    break;
                }
                _ if at_declaration && depth == 0 && self.current > start && Self::starts_declaration(&kind) => break,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        break;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn recover(&mut self, error: ParseError) {
        self.errors.report(error);
        self.synchronize(true);
    }

    fn parse_usings(&mut self) -> Vec<UsingDirective> {
        let mut usings = Vec::new();

        while self.check(&TokenKind::Keyword(Keyword::Using)) {
            match self.parse_using() {
                Ok(using) => usings.push(using),
                Err(e) => self.recover(e),
            }
        }

        usings
    }

    fn parse_using(&mut self) -> Result<UsingDirective, ParseError> {
        let keyword = self.advance();
        let name = self.parse_qualified_name()?;
        self.expect(TokenKind::Semicolon, ";")?;

        Ok(UsingDirective {
            name,
            range: self.range_from(&keyword.range),
        })
    }

    fn parse_items(&mut self, in_block: bool) -> Vec<Item> {
        let mut items = Vec::new();

        loop {
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::RBrace if in_block => break,
                TokenKind::Keyword(Keyword::Namespace) => match self.parse_namespace() {
                    Ok(namespace) => items.push(Item::Namespace(namespace)),
                    Err(e) => self.recover(e),
                },
                TokenKind::Keyword(Keyword::Using) => {
                    self.errors
                        .report(ParseError::UsingAfterDeclaration(self.peek().clone()));
                    if let Err(e) = self.parse_using() {
                        self.recover(e);
                    }
                }
                TokenKind::Modifier(_)
                | TokenKind::Keyword(Keyword::Class | Keyword::Struct | Keyword::Interface | Keyword::Enum) => {
                    match self.parse_type_decl() {
                        Ok(decl) => items.push(Item::Type(decl)),
                        Err(e) => self.recover(e),
                    }
                }
                _ => {
                    let error = ParseError::NamespaceMemberExpected(self.advance());
                    self.recover(error);
                }
            }
        }

        items
    }

    fn parse_namespace(&mut self) -> Result<NamespaceDecl, ParseError> {
        let keyword = self.advance();
        let name = self.parse_qualified_name()?;

        if self.eat(&TokenKind::Semicolon) {
            let usings = self.parse_usings();
            let items = self.parse_items(false);

            return Ok(NamespaceDecl {
                name,
                usings,
                items,
                file_scoped: true,
                range: self.range_from(&keyword.range),
            });
        }

        self.expect(TokenKind::LBrace, "{")?;
        let usings = self.parse_usings();
        let items = self.parse_items(true);
        if let Err(e) = self.expect(TokenKind::RBrace, "}") {
            self.errors.report(e);
        }

        Ok(NamespaceDecl {
            name,
            usings,
            items,
            file_scoped: false,
            range: self.range_from(&keyword.range),
        })
    }

    fn parse_qualified_name(&mut self) -> Result<QualifiedName, ParseError> {
        let first = self.expect_ident()?;
        let start = first.range.clone();
        let mut segments = vec![first];

        while self.check(&TokenKind::Dot) && matches!(self.peek_nth(1).kind, TokenKind::Ident(_)) {
            self.advance();
            segments.push(self.expect_ident()?);
        }

        Ok(QualifiedName {
            segments,
            range: self.range_from(&start),
        })
    }

    fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        Ok(TypeRef {
            name: self.parse_qualified_name()?,
        })
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Vec::new();

        while let TokenKind::Modifier(modifier) = self.peek().kind {
            let token = self.advance();
            modifiers.push((modifier, token.range));
        }

        Modifiers(modifiers)
    }

    fn parse_type_decl(&mut self) -> Result<TypeDecl, ParseError> {
        let start = self.peek().range.clone();
        let modifiers = self.parse_modifiers();
        self.parse_type_decl_with(modifiers, start)
    }

    fn parse_type_decl_with(&mut self, modifiers: Modifiers, start: Range) -> Result<TypeDecl, ParseError> {
        let kind = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Class) => TypeKind::Class,
            TokenKind::Keyword(Keyword::Struct) => TypeKind::Struct,
            TokenKind::Keyword(Keyword::Interface) => TypeKind::Interface,
            TokenKind::Keyword(Keyword::Enum) => TypeKind::Enum,
            _ => return Err(ParseError::NamespaceMemberExpected(self.peek().clone())),
        };
        self.advance();

        let name = self.expect_ident()?;
        let bases = if self.eat(&TokenKind::Colon) {
            self.parse_type_list()?
        } else {
            Vec::new()
        };

        self.expect(TokenKind::LBrace, "{")?;
        let members = match kind {
            TypeKind::Enum => self.parse_enum_members(),
            _ => self.parse_members(&name),
        };
        if let Err(e) = self.expect(TokenKind::RBrace, "}") {
            self.errors.report(e);
        }
        self.eat(&TokenKind::Semicolon);

        Ok(TypeDecl {
            modifiers,
            kind,
            name,
            bases,
            members,
            range: self.range_from(&start),
        })
    }

    fn parse_type_list(&mut self) -> Result<Vec<TypeRef>, ParseError> {
        let mut types = vec![self.parse_type_ref()?];

        while self.eat(&TokenKind::Comma) {
            types.push(self.parse_type_ref()?);
        }

        Ok(types)
    }

    fn parse_members(&mut self, type_name: &Ident) -> Vec<Member> {
        let mut members = Vec::new();

        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            match self.parse_member(type_name) {
                Ok(member) => members.push(member),
                Err(e) => self.recover(e),
            }
        }

        members
    }

    fn parse_member(&mut self, type_name: &Ident) -> Result<Member, ParseError> {
        let start = self.peek().range.clone();
        let modifiers = self.parse_modifiers();

        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Class | Keyword::Struct | Keyword::Interface | Keyword::Enum) => {
                return self
                    .parse_type_decl_with(modifiers, start)
                    .map(Member::NestedType);
            }
            TokenKind::Ident(name) if name == type_name.name && self.peek_nth(1).kind == TokenKind::LParen => {
                return self.parse_constructor(modifiers, start);
            }
            TokenKind::Ident(_) => {}
            _ => return Err(ParseError::InvalidMemberToken(self.peek().clone())),
        }

        let ty = self.parse_type_ref()?;
        let name = self.expect_ident()?;

        match self.peek_kind() {
            TokenKind::LParen => {
                let params = self.parse_params()?;
                let body = self.parse_body()?;

                Ok(Member::Method(MethodDecl {
                    modifiers,
                    return_type: ty,
                    name,
                    params,
                    body,
                    range: self.range_from(&start),
                }))
            }
            TokenKind::LBrace => {
                let (has_getter, has_setter) = self.parse_accessors()?;

                Ok(Member::Property(PropertyDecl {
                    modifiers,
                    ty,
                    name,
                    has_getter,
                    has_setter,
                    range: self.range_from(&start),
                }))
            }
            TokenKind::Equal | TokenKind::Semicolon => {
                let initializer = if self.eat(&TokenKind::Equal) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semicolon, ";")?;

                Ok(Member::Field(FieldDecl {
                    modifiers,
                    ty,
                    name,
                    initializer,
                    range: self.range_from(&start),
                }))
            }
            _ => Err(ParseError::Expected {
                expected: ";",
                found: self.peek().clone(),
            }),
        }
    }

    fn parse_constructor(&mut self, modifiers: Modifiers, start: Range) -> Result<Member, ParseError> {
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        let body = self.parse_body()?;

        Ok(Member::Constructor(ConstructorDecl {
            modifiers,
            name,
            params,
            body,
            range: self.range_from(&start),
        }))
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LParen, "(")?;
        let mut params = Vec::new();

        if self.eat(&TokenKind::RParen) {
            return Ok(params);
        }

        loop {
            let ty = self.parse_type_ref()?;
            let name = self.expect_ident()?;
            params.push(Param { ty, name });

            if !self.eat(&TokenKind::Comma) {
                self.expect(TokenKind::RParen, ")")?;
                break;
            }
        }

        Ok(params)
    }

    fn parse_accessors(&mut self) -> Result<(bool, bool), ParseError> {
        self.expect(TokenKind::LBrace, "{")?;
        let mut has_getter = false;
        let mut has_setter = false;

        loop {
            match self.peek_kind() {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Ident(name) if name == "get" => {
                    self.advance();
                    has_getter = true;
                    self.expect(TokenKind::Semicolon, ";")?;
                }
                TokenKind::Ident(name) if name == "set" => {
                    self.advance();
                    has_setter = true;
                    self.expect(TokenKind::Semicolon, ";")?;
                }
                _ => {
                    return Err(ParseError::Expected {
                        expected: "get",
                        found: self.peek().clone(),
                    });
                }
            }
        }

        Ok((has_getter, has_setter))
    }

    fn parse_body(&mut self) -> Result<Option<Body>, ParseError> {
        match self.peek_kind() {
            TokenKind::Arrow => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, ";")?;
                Ok(Some(Body::Expression(expr)))
            }
            TokenKind::LBrace => {
                self.advance();
                Ok(Some(Body::Block(self.parse_block())))
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(None)
            }
            _ => Err(ParseError::Expected {
                expected: "{",
                found: self.peek().clone(),
            }),
        }
    }

    fn parse_block(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();

        loop {
            match self.peek_kind() {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => {
                    self.errors.report(ParseError::Expected {
                        expected: "}",
                        found: self.peek().clone(),
                    });
                    break;
                }
                TokenKind::Keyword(Keyword::Return) => match self.parse_return() {
                    Ok(stmt) => stmts.push(stmt),
                    Err(e) => {
                        self.errors.report(e);
                        self.synchronize(false);
                    }
                },
                _ => {
                    self.errors
                        .report(ParseError::UnsupportedStatement(self.peek().clone()));
                    self.synchronize(false);
                }
            }
        }

        stmts
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon, ";")?;

        Ok(Stmt::Return {
            value,
            range: self.range_from(&keyword.range),
        })
    }

    fn parse_enum_members(&mut self) -> Vec<Member> {
        let mut members = Vec::new();

        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            match self.parse_enum_member() {
                Ok(member) => {
                    members.push(Member::EnumMember(member));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                Err(e) => {
                    self.errors.report(e);
                    while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
                        if self.advance().kind == TokenKind::Comma {
                            break;
                        }
                    }
                }
            }
        }

        members
    }

    fn parse_enum_member(&mut self) -> Result<EnumMemberDecl, ParseError> {
        let name = self.expect_ident()?;
        let value = if self.eat(&TokenKind::Equal) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(EnumMemberDecl { name, value })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_nested().map(|(expr, _)| expr)
    }

    /// Parses an expression and returns it with the depth of its tree.
    fn parse_nested(&mut self) -> Result<(Expr, usize), ParseError> {
        if self.nesting >= MAX_EXPRESSION_DEPTH {
            return Err(ParseError::ExpressionTooComplex(self.peek().clone()));
        }

        self.nesting += 1;
        let result = self
            .parse_unary()
            .and_then(|(lhs, depth)| self.parse_binary(1, lhs, depth));
        self.nesting -= 1;

        result
    }

    fn deeper(&self, depth: usize) -> Result<usize, ParseError> {
        let depth = depth + 1;
        if depth > MAX_EXPRESSION_DEPTH {
            Err(ParseError::ExpressionTooComplex(self.peek().clone()))
        } else {
            Ok(depth)
        }
    }

    fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
        match kind {
            TokenKind::OrOr => Some(BinaryOp::Or),
            TokenKind::AndAnd => Some(BinaryOp::And),
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::NeEq => Some(BinaryOp::Ne),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Lte => Some(BinaryOp::Lte),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Gte => Some(BinaryOp::Gte),
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            TokenKind::Asterisk => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Rem),
            _ => None,
        }
    }

    fn parse_binary(&mut self, min_prec: u8, mut lhs: Expr, mut depth: usize) -> Result<(Expr, usize), ParseError> {
        while let Some(op) = Self::binary_op(&self.peek().kind) {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }

            self.advance();
            let (mut rhs, mut rhs_depth) = self.parse_unary()?;

            while let Some(next) = Self::binary_op(&self.peek().kind) {
                if next.precedence() <= prec {
                    break;
                }
                (rhs, rhs_depth) = self.parse_binary(next.precedence(), rhs, rhs_depth)?;
            }

            depth = self.deeper(depth.max(rhs_depth))?;
            let range = lhs.range.to(&rhs.range);
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                range,
            };
        }

        Ok((lhs, depth))
    }

    fn parse_unary(&mut self) -> Result<(Expr, usize), ParseError> {
        let mut ops = Vec::new();
        loop {
            let op = match self.peek().kind {
                TokenKind::Bang => UnaryOp::Not,
                TokenKind::Minus => UnaryOp::Negate,
                _ => break,
            };
            ops.push((op, self.advance()));
        }

        let (mut expr, mut depth) = self.parse_postfix()?;

        for (op, token) in ops.into_iter().rev() {
            depth = self.deeper(depth)?;
            let range = token.range.to(&expr.range);
            expr = Expr {
                kind: ExprKind::Unary(op, Box::new(expr)),
                range,
            };
        }

        Ok((expr, depth))
    }

    fn parse_postfix(&mut self) -> Result<(Expr, usize), ParseError> {
        let (mut expr, mut depth) = self.parse_primary()?;

        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    depth = self.deeper(depth)?;
                    let range = expr.range.to(&name.range);
                    expr = Expr {
                        kind: ExprKind::Member(Box::new(expr), name),
                        range,
                    };
                }
                TokenKind::LParen => {
                    self.advance();
                    let (args, args_depth) = self.parse_args()?;
                    depth = self.deeper(depth.max(args_depth))?;
                    let range = self.range_from(&expr.range);
                    expr = Expr {
                        kind: ExprKind::Call(Box::new(expr), args),
                        range,
                    };
                }
                _ => break,
            }
        }

        Ok((expr, depth))
    }

    fn parse_args(&mut self) -> Result<(Vec<Expr>, usize), ParseError> {
        let mut args = Vec::new();
        let mut depth = 0;

        if self.eat(&TokenKind::RParen) {
            return Ok((args, depth));
        }

        loop {
            let (arg, arg_depth) = self.parse_nested()?;
            args.push(arg);
            depth = depth.max(arg_depth);

            if !self.eat(&TokenKind::Comma) {
                self.expect(TokenKind::RParen, ")")?;
                break;
            }
        }

        Ok((args, depth))
    }

    fn parse_primary(&mut self) -> Result<(Expr, usize), ParseError> {
        let token = self.peek().clone();

        let kind = match &token.kind {
            TokenKind::NumberLiteral(text) => ExprKind::Literal(Self::parse_number(&token, text)?),
            TokenKind::StringLiteral(s) => ExprKind::Literal(Literal::String(s.clone())),
            TokenKind::BoolLiteral(b) => ExprKind::Literal(Literal::Bool(*b)),
            TokenKind::Null => ExprKind::Literal(Literal::Null),
            TokenKind::Ident(name) => ExprKind::Name(Ident {
                name: name.clone(),
                range: token.range.clone(),
            }),
            TokenKind::LParen => {
                self.advance();
                let (inner, depth) = self.parse_nested()?;
                self.expect(TokenKind::RParen, ")")?;

                let expr = Expr {
                    kind: inner.kind,
                    range: self.range_from(&token.range),
                };
                return Ok((expr, depth));
            }
            _ => return Err(ParseError::InvalidExpressionTerm(token)),
        };

        self.advance();
        let expr = Expr {
            kind,
            range: token.range,
        };
        Ok((expr, 1))
    }

    fn parse_number(token: &Token, text: &str) -> Result<Literal, ParseError> {
        if text.contains('.') {
            text.parse::<f64>()
                .map(Literal::Double)
                .map_err(|_| ParseError::InvalidExpressionTerm(token.clone()))
        } else {
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| ParseError::IntegralConstantTooLarge(token.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::lexer::Lexer;
    use crate::source::SourceId;

    fn parse(input: &str) -> (CompilationUnit, Vec<ParseError>) {
        let (tokens, lexer_errors) = Lexer::new().tokenize(input, SourceId::default());
        assert!(lexer_errors.is_empty(), "{:?}", lexer_errors);
        Parser::new(tokens).parse()
    }

    fn only_type(unit: &CompilationUnit) -> &TypeDecl {
        match unit.items.as_slice() {
            [Item::Type(decl)] => decl,
            items => panic!("expected a single type, got {:?}", items),
        }
    }

    fn codes(errors: &[ParseError]) -> Vec<&'static str> {
        errors.iter().map(ParseError::code).collect()
    }

    #[test]
    fn test_parse_greeter() {
        let (unit, errors) = parse("class Greeter { public static string Hello() => \"hi\"; }");
        assert!(errors.is_empty());

        let decl = only_type(&unit);
        assert_eq!(decl.name.name, "Greeter");
        assert_eq!(decl.kind, TypeKind::Class);

        match decl.members.as_slice() {
            [Member::Method(method)] => {
                assert_eq!(method.name.name, "Hello");
                assert_eq!(method.return_type.to_string(), "string");
                assert!(method.modifiers.has(crate::lexer::token::Modifier::Static));
                assert_eq!(
                    method.body,
                    Some(Body::Expression(Expr {
                        kind: ExprKind::Literal(Literal::String("hi".to_string())),
                        range: Range::new(Position::new(1, 49), Position::new(1, 53)),
                    }))
                );
            }
            members => panic!("unexpected members {:?}", members),
        }
    }

    #[test]
    fn test_parse_namespaces_and_usings() {
        let (unit, errors) = parse(
            "using System;\nnamespace Acme.Tools { using Acme.Core; struct Point { } interface IShape { } }\nnamespace Other;\nenum Color { Red, Green = 5, }",
        );
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(unit.usings.len(), 1);
        assert_eq!(unit.usings[0].name.to_string(), "System");

        match unit.items.as_slice() {
            [Item::Namespace(block), Item::Namespace(file_scoped)] => {
                assert_eq!(block.name.to_string(), "Acme.Tools");
                assert!(!block.file_scoped);
                assert_eq!(block.usings[0].name.to_string(), "Acme.Core");
                assert_eq!(block.items.len(), 2);

                assert!(file_scoped.file_scoped);
                match file_scoped.items.as_slice() {
                    [Item::Type(decl)] => {
                        assert_eq!(decl.kind, TypeKind::Enum);
                        assert_eq!(decl.members.len(), 2);
                    }
                    items => panic!("unexpected items {:?}", items),
                }
            }
            items => panic!("unexpected items {:?}", items),
        }
    }

    #[test]
    fn test_parse_members() {
        let (unit, errors) = parse(
            "public sealed class Shape : Base, IShape {
                private readonly int count = 1;
                public string Name { get; set; }
                public Shape(int count) { }
                public abstract double Area();
                static int Twice(int x) { return x * 2; }
                class Inner { }
            }",
        );
        assert!(errors.is_empty(), "{:?}", errors);

        let decl = only_type(&unit);
        assert_eq!(
            decl.bases.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["Base", "IShape"]
        );
        assert!(matches!(&decl.members[0], Member::Field(f) if f.initializer.is_some()));
        assert!(matches!(&decl.members[1], Member::Property(p) if p.has_getter && p.has_setter));
        assert!(matches!(&decl.members[2], Member::Constructor(c) if c.params.len() == 1));
        assert!(matches!(&decl.members[3], Member::Method(m) if m.body.is_none()));
        assert!(matches!(&decl.members[4], Member::Method(m) if matches!(m.body, Some(Body::Block(ref stmts)) if stmts.len() == 1)));
        assert!(matches!(&decl.members[5], Member::NestedType(t) if t.name.name == "Inner"));
    }

    #[test]
    fn test_binary_precedence() {
        let (tokens, _) = Lexer::new().tokenize("1 + 2 * 3 == 7 && !f", SourceId::default());
        let expr = Parser::new(tokens).parse_expr().unwrap();

        let ExprKind::Binary(BinaryOp::And, lhs, rhs) = expr.kind else {
            panic!("expected &&");
        };
        assert!(matches!(rhs.kind, ExprKind::Unary(UnaryOp::Not, _)));

        let ExprKind::Binary(BinaryOp::Eq, sum, _) = lhs.kind else {
            panic!("expected ==");
        };
        let ExprKind::Binary(BinaryOp::Add, _, product) = sum.kind else {
            panic!("expected +");
        };
        assert!(matches!(product.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_left_associative_subtraction() {
        let (tokens, _) = Lexer::new().tokenize("10 - 4 - 3", SourceId::default());
        let expr = Parser::new(tokens).parse_expr().unwrap();

        let ExprKind::Binary(BinaryOp::Sub, lhs, rhs) = expr.kind else {
            panic!("expected -");
        };
        assert!(matches!(lhs.kind, ExprKind::Binary(BinaryOp::Sub, _, _)));
        assert_eq!(rhs.kind, ExprKind::Literal(Literal::Int(3)));
    }

    #[test]
    fn test_qualified_call() {
        let (tokens, _) = Lexer::new().tokenize("Acme.Math.Max(a, 2)", SourceId::default());
        let expr = Parser::new(tokens).parse_expr().unwrap();

        let ExprKind::Call(callee, args) = expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        let names: Vec<String> = callee
            .as_dotted_name()
            .unwrap()
            .into_iter()
            .map(|i| i.name.to_string())
            .collect();
        assert_eq!(names, vec!["Acme", "Math", "Max"]);
    }

    #[rstest]
    #[case::unclosed_class("class Broken {", vec!["EM1513"])]
    #[case::missing_semicolon("class A { int x }", vec!["EM1002"])]
    #[case::missing_identifier("class A { int = 5; static int M() => 1; }", vec!["EM1001"])]
    #[case::invalid_expression_term("class A { static int M() => ; }", vec!["EM1525"])]
    #[case::missing_close_paren("class A { static int M() => (1 + 2; }", vec!["EM1026"])]
    #[case::missing_open_brace("class A int x; }", vec!["EM1514", "EM1022"])]
    #[case::unsupported_statement("class A { static int M() { x = 1; return 2; } }", vec!["EM8002"])]
    #[case::stray_top_level_token("int x; class A { }", vec!["EM1022"])]
    #[case::using_after_declaration("class A { } using System;", vec!["EM1529"])]
    #[case::integer_too_large("class A { static int M() => 99999999999999999999; }", vec!["EM1021"])]
    fn test_parse_errors(#[case] input: &str, #[case] expected: Vec<&str>) {
        let (_, errors) = parse(input);
        assert_eq!(codes(&errors), expected);
    }

    fn long_sum(terms: usize) -> String {
        format!("class A {{ static int M() => 1{}; static int N() => 2; }}", " + 1".repeat(terms - 1))
    }

    #[test]
    fn test_expression_at_depth_limit() {
        let (unit, errors) = parse(&long_sum(MAX_EXPRESSION_DEPTH));
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(only_type(&unit).members.len(), 2);
    }

    #[rstest]
    #[case::long_sum(long_sum(MAX_EXPRESSION_DEPTH + 1))]
    #[case::very_long_sum(long_sum(20_000))]
    #[case::nested_parens(format!("class A {{ static int M() => {}1{}; }}", "(".repeat(5000), ")".repeat(5000)))]
    #[case::unary_chain(format!("class A {{ static bool M() => {}true; }}", "!".repeat(5000)))]
    #[case::member_chain(format!("class A {{ static int M() => A{}; }}", ".B".repeat(5000)))]
    #[case::nested_calls(format!("class A {{ static int M() => {}1{}; }}", "F(".repeat(5000), ")".repeat(5000)))]
    fn test_expression_too_complex(#[case] input: String) {
        let (unit, errors) = parse(&input);
        assert_eq!(codes(&errors), vec!["EM8078"]);
        assert_eq!(only_type(&unit).name.name, "A");
    }

    #[test]
    fn test_deep_expression_keeps_following_members() {
        let (unit, errors) = parse(&long_sum(1000));
        assert_eq!(codes(&errors), vec!["EM8078"]);
        assert!(matches!(only_type(&unit).members.as_slice(), [Member::Method(m)] if m.name.name == "N"));
    }

    #[test]
    fn test_recovery_keeps_following_members() {
        let (unit, errors) = parse("class A { int = 5; public static int M() => 1; }");
        assert_eq!(errors.len(), 1);

        let decl = only_type(&unit);
        assert!(matches!(decl.members.as_slice(), [Member::Method(m)] if m.name.name == "M"));
    }

    #[test]
    fn test_recovery_keeps_following_types() {
        let (unit, errors) = parse("class { int x; } class B { }");
        assert_eq!(codes(&errors), vec!["EM1001"]);
        assert_eq!(only_type(&unit).name.name, "B");
    }

    #[test]
    fn test_unclosed_class_keeps_declaration() {
        let (unit, errors) = parse("class Broken {");
        assert_eq!(errors.len(), 1);
        assert_eq!(only_type(&unit).name.name, "Broken");
    }

    #[test]
    fn test_error_reporter_skips_same_position() {
        let token = Token {
            range: Range::default(),
            kind: TokenKind::Eof,
            source_id: SourceId::default(),
        };
        let mut reporter = ErrorReporter::new(10);
        reporter.report(ParseError::IdentifierExpected(token.clone()));
        reporter.report(ParseError::InvalidExpressionTerm(token));
        assert_eq!(reporter.to_vec().len(), 1);
    }
}
