//! In-memory form of an Ember module: the output of lowering and the
//! content of a binary module image.

use std::fmt::{self, Display, Formatter};

pub use crate::ast::TypeKind;
use crate::value::Value;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum Accessibility {
    Public,
    Internal,
    Protected,
    Private,
}

impl Display for Accessibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Accessibility::Public => write!(f, "public"),
            Accessibility::Internal => write!(f, "internal"),
            Accessibility::Protected => write!(f, "protected"),
            Accessibility::Private => write!(f, "private"),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum MemberKind {
    Field,
    Property,
    Constructor,
    Method,
    EnumMember,
}

impl Display for MemberKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Field => write!(f, "field"),
            MemberKind::Property => write!(f, "property"),
            MemberKind::Constructor => write!(f, "constructor"),
            MemberKind::Method => write!(f, "method"),
            MemberKind::EnumMember => write!(f, "enum member"),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub types: Vec<TypeDef>,
    /// Names of the modules this one was compiled against.
    pub references: Vec<String>,
}

impl Module {
    pub fn find_type(&self, full_name: &str) -> Option<(usize, &TypeDef)> {
        self.types.iter().enumerate().find(|(_, t)| t.full_name == full_name)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct TypeDef {
    /// `Namespace.Outer+Inner`
    pub full_name: String,
    pub kind: TypeKind,
    pub accessibility: Accessibility,
    pub is_static: bool,
    pub is_sealed: bool,
    pub is_abstract: bool,
    pub declaring_type: Option<u32>,
    pub bases: Vec<String>,
    pub members: Vec<MemberDef>,
}

impl TypeDef {
    pub fn namespace(&self) -> Option<&str> {
        let outermost = self.full_name.split('+').next().unwrap_or(&self.full_name);
        outermost.rsplit_once('.').map(|(ns, _)| ns)
    }

    pub fn name(&self) -> &str {
        let innermost = self.full_name.rsplit('+').next().unwrap_or(&self.full_name);
        innermost.rsplit('.').next().unwrap_or(innermost)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct MemberDef {
    pub name: String,
    pub kind: MemberKind,
    pub accessibility: Accessibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_readonly: bool,
    /// Field or property type, method return type, or the enum for enum members.
    pub ty: String,
    pub params: Vec<ParamDef>,
    /// Method body or field initializer.
    pub body: Option<Expr>,
    pub constant: Option<Value>,
}

#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct ParamDef {
    pub name: String,
    pub ty: String,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    Const(Value),
    Param(u16),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    ToDouble(Box<Expr>),
    Call {
        type_index: u32,
        member_index: u32,
        args: Vec<Expr>,
    },
    LoadStatic {
        type_index: u32,
        member_index: u32,
    },
    /// Evaluates the operand and yields `void`.
    Discard(Box<Expr>),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add | BinaryOp::Concat => "+",
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
