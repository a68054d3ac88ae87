//! Tree-walking interpreter for the static members of a loaded module.

use thiserror::Error;

use crate::ir::{BinaryOp, Expr, MemberDef, Module, TypeKind, UnaryOp};
use crate::value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Attempted to divide by zero")]
    DivideByZero,
    #[error("Maximum call depth exceeded ({0})")]
    StackOverflow(u32),
    #[error("Member \"{0}\" has no executable body")]
    NotExecutable(String),
    #[error("Invalid member reference {0}:{1}")]
    InvalidTarget(u32, u32),
    #[error("Invalid number of arguments for \"{name}\", expected {expected}, got {got}")]
    ArityMismatch { name: String, expected: usize, got: usize },
    #[error("Invalid operands for \"{op}\": {left}, {right}")]
    InvalidOperands {
        op: String,
        left: &'static str,
        right: &'static str,
    },
    #[error("Parameter {0} is out of range")]
    InvalidParameter(u16),
}

#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    pub max_call_depth: u32,
}

impl Default for RuntimeOptions {
    #[cfg(debug_assertions)]
    fn default() -> Self {
        Self { max_call_depth: 64 }
    }

    #[cfg(not(debug_assertions))]
    fn default() -> Self {
        Self { max_call_depth: 256 }
    }
}

/// Runs code of one module. Holds no mutable state, so a runtime can be
/// shared between threads.
#[derive(Debug, Clone, Copy)]
pub struct Runtime<'m> {
    module: &'m Module,
    options: RuntimeOptions,
}

impl<'m> Runtime<'m> {
    pub fn new(module: &'m Module, options: RuntimeOptions) -> Self {
        Self { module, options }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    /// Calls the static method `member_index` of type `type_index`.
    pub fn call(&self, type_index: u32, member_index: u32, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.call_at(type_index, member_index, args, 0)
    }

    fn member(&self, type_index: u32, member_index: u32) -> Result<&'m MemberDef, RuntimeError> {
        self.module
            .types
            .get(type_index as usize)
            .and_then(|t| t.members.get(member_index as usize))
            .ok_or(RuntimeError::InvalidTarget(type_index, member_index))
    }

    fn enter(&self, depth: u32) -> Result<u32, RuntimeError> {
        if depth >= self.options.max_call_depth {
            return Err(RuntimeError::StackOverflow(self.options.max_call_depth));
        }
        Ok(depth + 1)
    }

    fn call_at(&self, type_index: u32, member_index: u32, args: Vec<Value>, depth: u32) -> Result<Value, RuntimeError> {
        let member = self.member(type_index, member_index)?;
        let body = member
            .body
            .as_ref()
            .ok_or_else(|| RuntimeError::NotExecutable(member.name.clone()))?;

        if args.len() != member.params.len() {
            return Err(RuntimeError::ArityMismatch {
                name: member.name.clone(),
                expected: member.params.len(),
                got: args.len(),
            });
        }

        let depth = self.enter(depth)?;
        self.eval(body, &args, depth)
    }

    fn load_static(&self, type_index: u32, member_index: u32, depth: u32) -> Result<Value, RuntimeError> {
        let member = self.member(type_index, member_index)?;

        match (&member.body, &member.constant) {
            (Some(init), _) => {
                let depth = self.enter(depth)?;
                self.eval(init, &[], depth)
            }
            (None, Some(constant)) => Ok(constant.clone()),
            (None, None) => Ok(self.default_for(&member.ty)),
        }
    }

    fn default_for(&self, type_name: &str) -> Value {
        match self.module.find_type(type_name) {
            Some((_, def)) if def.kind == TypeKind::Enum => Value::Int(0),
            _ => Value::default_for(type_name),
        }
    }

    fn eval(&self, expr: &Expr, args: &[Value], depth: u32) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Param(index) => args
                .get(*index as usize)
                .cloned()
                .ok_or(RuntimeError::InvalidParameter(*index)),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, args, depth)?;
                eval_unary(*op, value)
            }
            Expr::Binary(BinaryOp::And, left, right) => match self.eval(left, args, depth)? {
                Value::Bool(false) => Ok(Value::Bool(false)),
                Value::Bool(true) => self.eval_bool(BinaryOp::And, right, args, depth),
                other => Err(invalid_operands(BinaryOp::And, &other, &Value::Void)),
            },
            Expr::Binary(BinaryOp::Or, left, right) => match self.eval(left, args, depth)? {
                Value::Bool(true) => Ok(Value::Bool(true)),
                Value::Bool(false) => self.eval_bool(BinaryOp::Or, right, args, depth),
                other => Err(invalid_operands(BinaryOp::Or, &other, &Value::Void)),
            },
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, args, depth)?;
                let right = self.eval(right, args, depth)?;
                eval_binary(*op, left, right)
            }
            Expr::ToDouble(operand) => match self.eval(operand, args, depth)? {
                Value::Int(n) => Ok(Value::Double(n as f64)),
                value => Ok(value),
            },
            Expr::Call {
                type_index,
                member_index,
                args: call_args,
            } => {
                let values = call_args
                    .iter()
                    .map(|arg| self.eval(arg, args, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call_at(*type_index, *member_index, values, depth)
            }
            Expr::LoadStatic {
                type_index,
                member_index,
            } => self.load_static(*type_index, *member_index, depth),
            Expr::Discard(operand) => {
                self.eval(operand, args, depth)?;
                Ok(Value::Void)
            }
        }
    }

    fn eval_bool(&self, op: BinaryOp, expr: &Expr, args: &[Value], depth: u32) -> Result<Value, RuntimeError> {
        match self.eval(expr, args, depth)? {
            Value::Bool(b) => Ok(Value::Bool(b)),
            other => Err(invalid_operands(op, &Value::Bool(true), &other)),
        }
    }
}

#[cold]
fn invalid_operands(op: BinaryOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::InvalidOperands {
        op: op.to_string(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, RuntimeError> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnaryOp::Negate, Value::Double(d)) => Ok(Value::Double(-d)),
        (op, value) => Err(RuntimeError::InvalidOperands {
            op: match op {
                UnaryOp::Not => "!".to_string(),
                UnaryOp::Negate => "-".to_string(),
            },
            left: value.type_name(),
            right: "void",
        }),
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use BinaryOp::*;

    match (op, &left, &right) {
        (Concat, l, r) => Ok(Value::String(format!("{}{}", l.to_concat_string(), r.to_concat_string()))),
        (Eq, l, r) => Ok(Value::Bool(values_equal(l, r))),
        (Ne, l, r) => Ok(Value::Bool(!values_equal(l, r))),
        (_, Value::Int(l), Value::Int(r)) => eval_int(op, *l, *r).ok_or_else(|| invalid_operands(op, &left, &right))?,
        (_, Value::Int(_) | Value::Double(_), Value::Int(_) | Value::Double(_)) => {
            let (l, r) = (as_double(&left), as_double(&right));
            eval_double(op, l, r).ok_or_else(|| invalid_operands(op, &left, &right))
        }
        _ => Err(invalid_operands(op, &left, &right)),
    }
}

fn eval_int(op: BinaryOp, l: i64, r: i64) -> Option<Result<Value, RuntimeError>> {
    let value = match op {
        BinaryOp::Add => Value::Int(l.wrapping_add(r)),
        BinaryOp::Sub => Value::Int(l.wrapping_sub(r)),
        BinaryOp::Mul => Value::Int(l.wrapping_mul(r)),
        BinaryOp::Div | BinaryOp::Rem if r == 0 => return Some(Err(RuntimeError::DivideByZero)),
        BinaryOp::Div => Value::Int(l.wrapping_div(r)),
        BinaryOp::Rem => Value::Int(l.wrapping_rem(r)),
        BinaryOp::Lt => Value::Bool(l < r),
        BinaryOp::Lte => Value::Bool(l <= r),
        BinaryOp::Gt => Value::Bool(l > r),
        BinaryOp::Gte => Value::Bool(l >= r),
        _ => return None,
    };
    Some(Ok(value))
}

fn eval_double(op: BinaryOp, l: f64, r: f64) -> Option<Value> {
    match op {
        BinaryOp::Add => Some(Value::Double(l + r)),
        BinaryOp::Sub => Some(Value::Double(l - r)),
        BinaryOp::Mul => Some(Value::Double(l * r)),
        BinaryOp::Div => Some(Value::Double(l / r)),
        BinaryOp::Rem => Some(Value::Double(l % r)),
        BinaryOp::Lt => Some(Value::Bool(l < r)),
        BinaryOp::Lte => Some(Value::Bool(l <= r)),
        BinaryOp::Gt => Some(Value::Bool(l > r)),
        BinaryOp::Gte => Some(Value::Bool(l >= r)),
        _ => None,
    }
}

#[inline(always)]
fn as_double(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Double(d) => *d,
        _ => f64::NAN,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(l), Value::Double(r)) | (Value::Double(r), Value::Int(l)) => (*l as f64) == *r,
        (l, r) => l == r,
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::ir::{Accessibility, MemberKind, ParamDef, TypeDef};

    fn method(name: &str, params: &[&str], body: Expr) -> MemberDef {
        MemberDef {
            name: name.to_string(),
            kind: MemberKind::Method,
            accessibility: Accessibility::Public,
            is_static: true,
            is_abstract: false,
            is_readonly: false,
            ty: "int".to_string(),
            params: params
                .iter()
                .map(|p| ParamDef {
                    name: p.to_string(),
                    ty: "int".to_string(),
                })
                .collect(),
            body: Some(body),
            constant: None,
        }
    }

    fn field(name: &str, ty: &str, body: Option<Expr>, constant: Option<Value>) -> MemberDef {
        MemberDef {
            name: name.to_string(),
            kind: MemberKind::Field,
            accessibility: Accessibility::Public,
            is_static: true,
            is_abstract: false,
            is_readonly: true,
            ty: ty.to_string(),
            params: Vec::new(),
            body,
            constant,
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    fn int(n: i64) -> Expr {
        Expr::Const(Value::Int(n))
    }

    fn call(member_index: u32, args: Vec<Expr>) -> Expr {
        Expr::Call {
            type_index: 0,
            member_index,
            args,
        }
    }

    #[fixture]
    fn module() -> Module {
        let members = vec![
            method("Div", &["a", "b"], binary(BinaryOp::Div, Expr::Param(0), Expr::Param(1))),
            method("Loop", &["n"], call(1, vec![Expr::Param(0)])),
            method("Twice", &["n"], binary(BinaryOp::Add, call(3, vec![Expr::Param(0)]), Expr::Param(0))),
            method("Id", &["n"], Expr::Param(0)),
            field("Answer", "int", Some(binary(BinaryOp::Mul, int(6), int(7))), None),
            field("Unset", "int", None, None),
            field("Name", "string", None, None),
            field("Color", "Palette", None, None),
            MemberDef {
                body: None,
                ..method("Abstract", &[], int(0))
            },
            method(
                "Short",
                &[],
                binary(BinaryOp::Or, Expr::Const(Value::Bool(true)), call(0, vec![int(1), int(0)])),
            ),
            method(
                "Field",
                &[],
                binary(
                    BinaryOp::Add,
                    Expr::LoadStatic {
                        type_index: 0,
                        member_index: 4,
                    },
                    Expr::LoadStatic {
                        type_index: 0,
                        member_index: 7,
                    },
                ),
            ),
        ];

        Module {
            name: "test".to_string(),
            types: vec![
                TypeDef {
                    full_name: "Calc".to_string(),
                    kind: TypeKind::Class,
                    accessibility: Accessibility::Public,
                    is_static: true,
                    is_sealed: false,
                    is_abstract: false,
                    declaring_type: None,
                    bases: Vec::new(),
                    members,
                },
                TypeDef {
                    full_name: "Palette".to_string(),
                    kind: TypeKind::Enum,
                    accessibility: Accessibility::Public,
                    is_static: false,
                    is_sealed: true,
                    is_abstract: false,
                    declaring_type: None,
                    bases: Vec::new(),
                    members: Vec::new(),
                },
            ],
            references: Vec::new(),
        }
    }

    #[rstest]
    fn test_call(module: Module) {
        let runtime = Runtime::new(&module, RuntimeOptions::default());

        assert_eq!(runtime.call(0, 0, vec![Value::Int(7), Value::Int(2)]), Ok(Value::Int(3)));
        assert_eq!(runtime.call(0, 2, vec![Value::Int(21)]), Ok(Value::Int(42)));
        assert_eq!(runtime.call(0, 9, vec![]), Ok(Value::Bool(true)));
        assert_eq!(runtime.call(0, 10, vec![]), Ok(Value::Int(42)));
    }

    #[rstest]
    fn test_call_errors(module: Module) {
        let runtime = Runtime::new(&module, RuntimeOptions { max_call_depth: 16 });

        assert_eq!(
            runtime.call(0, 0, vec![Value::Int(1), Value::Int(0)]),
            Err(RuntimeError::DivideByZero)
        );
        assert_eq!(
            runtime.call(0, 1, vec![Value::Int(1)]),
            Err(RuntimeError::StackOverflow(16))
        );
        assert_eq!(
            runtime.call(0, 8, vec![]),
            Err(RuntimeError::NotExecutable("Abstract".to_string()))
        );
        assert_eq!(
            runtime.call(0, 3, vec![]),
            Err(RuntimeError::ArityMismatch {
                name: "Id".to_string(),
                expected: 1,
                got: 0
            })
        );
        assert_eq!(runtime.call(5, 0, vec![]), Err(RuntimeError::InvalidTarget(5, 0)));
    }

    #[rstest]
    #[case::answer(4, Value::Int(42))]
    #[case::int_default(5, Value::Int(0))]
    #[case::string_default(6, Value::Null)]
    #[case::enum_default(7, Value::Int(0))]
    fn test_load_static(module: Module, #[case] member_index: u32, #[case] expected: Value) {
        let runtime = Runtime::new(&module, RuntimeOptions::default());
        assert_eq!(runtime.load_static(0, member_index, 0), Ok(expected));
    }

    #[rstest]
    #[case::wrapping_add(BinaryOp::Add, Value::Int(i64::MAX), Value::Int(1), Value::Int(i64::MIN))]
    #[case::int_rem(BinaryOp::Rem, Value::Int(-7), Value::Int(3), Value::Int(-1))]
    #[case::min_div(BinaryOp::Div, Value::Int(i64::MIN), Value::Int(-1), Value::Int(i64::MIN))]
    #[case::double_div(BinaryOp::Div, Value::Double(1.0), Value::Double(0.0), Value::Double(f64::INFINITY))]
    #[case::mixed_lt(BinaryOp::Lt, Value::Int(1), Value::Double(1.5), Value::Bool(true))]
    #[case::concat(BinaryOp::Concat, Value::from("n="), Value::Int(3), Value::from("n=3"))]
    #[case::concat_null(BinaryOp::Concat, Value::Null, Value::Bool(false), Value::from("False"))]
    #[case::string_eq(BinaryOp::Eq, Value::from("a"), Value::from("a"), Value::Bool(true))]
    #[case::numeric_eq(BinaryOp::Eq, Value::Int(2), Value::Double(2.0), Value::Bool(true))]
    #[case::null_ne(BinaryOp::Ne, Value::Null, Value::from("x"), Value::Bool(true))]
    fn test_eval_binary(#[case] op: BinaryOp, #[case] left: Value, #[case] right: Value, #[case] expected: Value) {
        assert_eq!(eval_binary(op, left, right), Ok(expected));
    }

    #[test]
    fn test_invalid_operands() {
        assert_eq!(
            eval_binary(BinaryOp::Sub, Value::from("a"), Value::Int(1)),
            Err(RuntimeError::InvalidOperands {
                op: "-".to_string(),
                left: "string",
                right: "int",
            })
        );
        assert_eq!(eval_unary(UnaryOp::Negate, Value::Int(i64::MIN)), Ok(Value::Int(i64::MIN)));
        assert!(eval_unary(UnaryOp::Not, Value::Int(1)).is_err());
    }
}
