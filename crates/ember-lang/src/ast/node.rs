use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::lexer::token::Modifier;
use crate::range::Range;
use crate::source::SourceId;
use crate::{Diagnostic, IdentName};

/// The parse result of one source unit. Parsing never fails: syntax errors
/// are carried alongside whatever part of the declaration tree could be built.
#[derive(PartialEq, Debug, Clone)]
pub struct SyntaxTree {
    pub source_id: SourceId,
    pub root: CompilationUnit,
    pub diagnostics: Vec<Diagnostic>,
}

impl SyntaxTree {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct CompilationUnit {
    pub usings: Vec<UsingDirective>,
    pub items: Vec<Item>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct UsingDirective {
    pub name: QualifiedName,
    pub range: Range,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Item {
    Namespace(NamespaceDecl),
    Type(TypeDecl),
}

#[derive(PartialEq, Debug, Clone)]
pub struct NamespaceDecl {
    pub name: QualifiedName,
    pub usings: Vec<UsingDirective>,
    pub items: Vec<Item>,
    pub file_scoped: bool,
    pub range: Range,
}

#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct Ident {
    pub name: IdentName,
    pub range: Range,
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A dotted name such as `Acme.Tools.Greeter`.
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct QualifiedName {
    pub segments: Vec<Ident>,
    pub range: Range,
}

impl QualifiedName {
    pub fn last(&self) -> Option<&Ident> {
        self.segments.last()
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.iter().map(|s| s.name.as_str()).join("."))
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum,
}

impl Display for TypeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Class => write!(f, "class"),
            TypeKind::Struct => write!(f, "struct"),
            TypeKind::Interface => write!(f, "interface"),
            TypeKind::Enum => write!(f, "enum"),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Modifiers(pub Vec<(Modifier, Range)>);

impl Modifiers {
    pub fn has(&self, modifier: Modifier) -> bool {
        self.0.iter().any(|(m, _)| *m == modifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Modifier, Range)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct TypeDecl {
    pub modifiers: Modifiers,
    pub kind: TypeKind,
    pub name: Ident,
    pub bases: Vec<TypeRef>,
    pub members: Vec<Member>,
    pub range: Range,
}

#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct TypeRef {
    pub name: QualifiedName,
}

impl TypeRef {
    pub fn range(&self) -> &Range {
        &self.name.range
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Member {
    Field(FieldDecl),
    Property(PropertyDecl),
    Method(MethodDecl),
    Constructor(ConstructorDecl),
    EnumMember(EnumMemberDecl),
    NestedType(TypeDecl),
}

impl Member {
    pub fn name(&self) -> &Ident {
        match self {
            Member::Field(field) => &field.name,
            Member::Property(property) => &property.name,
            Member::Method(method) => &method.name,
            Member::Constructor(ctor) => &ctor.name,
            Member::EnumMember(member) => &member.name,
            Member::NestedType(decl) => &decl.name,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct FieldDecl {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub name: Ident,
    pub initializer: Option<Expr>,
    pub range: Range,
}

#[derive(PartialEq, Debug, Clone)]
pub struct PropertyDecl {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub name: Ident,
    pub has_getter: bool,
    pub has_setter: bool,
    pub range: Range,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    pub return_type: TypeRef,
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Option<Body>,
    pub range: Range,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ConstructorDecl {
    pub modifiers: Modifiers,
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Option<Body>,
    pub range: Range,
}

#[derive(PartialEq, Debug, Clone)]
pub struct EnumMemberDecl {
    pub name: Ident,
    pub value: Option<Expr>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Param {
    pub ty: TypeRef,
    pub name: Ident,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Body {
    Expression(Expr),
    Block(Vec<Stmt>),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Stmt {
    Return { value: Option<Expr>, range: Range },
}

impl Stmt {
    pub fn range(&self) -> &Range {
        match self {
            Stmt::Return { range, .. } => range,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: Range,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Name(Ident),
    Member(Box<Expr>, Ident),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Flattens `A.B.C` into its segments when the expression is a plain dotted name.
    pub fn as_dotted_name(&self) -> Option<Vec<&Ident>> {
        match &self.kind {
            ExprKind::Name(ident) => Some(vec![ident]),
            ExprKind::Member(target, ident) => {
                let mut segments = target.as_dotted_name()?;
                segments.push(ident);
                Some(segments)
            }
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    Int(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Negate => write!(f, "-"),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinaryOp {
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(s)
    }
}
