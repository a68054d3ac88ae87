use smol_str::SmolStr;

use super::Analyzer;
use super::resolve::{Context, Lookup};
use super::symbols::TypeId;
use super::types::{Conversion, Ty};
use crate::ast::{self, Body, Expr, ExprKind, Ident, Literal, Member, Stmt};
use crate::diagnostic::codes;
use crate::ir::{self, MemberKind};
use crate::range::Range;
use crate::value::Value;

/// What an expression denotes before it is required to be a value.
#[derive(Debug, Clone)]
enum Bound {
    Value(Ty, ir::Expr),
    Type(Ty),
    Namespace(String),
    MethodGroup { type_index: usize, name: SmolStr },
}

/// Names visible inside one member body.
struct BodyScope<'p> {
    ctx: Context,
    params: &'p [(SmolStr, Ty)],
    is_static: bool,
}

type Typed = (Ty, ir::Expr);

fn error_value() -> Typed {
    (Ty::Error, ir::Expr::Const(Value::Void))
}

fn lower_binary_op(op: ast::BinaryOp) -> ir::BinaryOp {
    match op {
        ast::BinaryOp::Add => ir::BinaryOp::Add,
        ast::BinaryOp::Sub => ir::BinaryOp::Sub,
        ast::BinaryOp::Mul => ir::BinaryOp::Mul,
        ast::BinaryOp::Div => ir::BinaryOp::Div,
        ast::BinaryOp::Rem => ir::BinaryOp::Rem,
        ast::BinaryOp::Eq => ir::BinaryOp::Eq,
        ast::BinaryOp::Ne => ir::BinaryOp::Ne,
        ast::BinaryOp::Lt => ir::BinaryOp::Lt,
        ast::BinaryOp::Lte => ir::BinaryOp::Lte,
        ast::BinaryOp::Gt => ir::BinaryOp::Gt,
        ast::BinaryOp::Gte => ir::BinaryOp::Gte,
        ast::BinaryOp::And => ir::BinaryOp::And,
        ast::BinaryOp::Or => ir::BinaryOp::Or,
    }
}

fn promote((ty, expr): Typed, target: Ty) -> ir::Expr {
    if ty == Ty::Int && target == Ty::Double {
        ir::Expr::ToDouble(Box::new(expr))
    } else {
        expr
    }
}

impl Analyzer<'_> {
    /// Checks every member body and initializer. Static methods and static
    /// field initializers are lowered; instance bodies are only checked.
    pub(super) fn bind_bodies(&mut self) {
        for index in 0..self.declared.len() {
            for member_index in 0..self.declared[index].members.len() {
                let body = self.bind_member_body(index, member_index);
                self.declared[index].members[member_index].body = body;
            }
        }
    }

    fn bind_member_body(&mut self, index: usize, member_index: usize) -> Option<ir::Expr> {
        let declared = &self.declared[index];
        let ctx = Context {
            scope: declared.scope,
            enclosing: Some(index),
            source: declared.source,
        };
        let symbol = &declared.members[member_index];
        let member = symbol.member;
        let (ty, is_static, params) = (symbol.ty, symbol.is_static, symbol.params.clone());
        let scope = BodyScope {
            ctx,
            params: &params,
            is_static,
        };

        match member {
            Member::Field(field) => {
                let initializer = field.initializer.as_ref()?;
                let scope = BodyScope {
                    is_static: true,
                    ..scope
                };
                let value = self.bind_value(initializer, &scope);
                let expr = self.coerce(value, ty, &scope, &initializer.range);
                is_static.then_some(expr)
            }
            Member::Method(method) => {
                let body = method.body.as_ref()?;
                let expr = self.bind_body(body, ty, &scope, &method.name);
                is_static.then_some(expr)
            }
            Member::Constructor(ctor) => {
                let body = ctor.body.as_ref()?;
                self.bind_body(body, Ty::Void, &scope, &ctor.name);
                None
            }
            _ => None,
        }
    }

    fn qualified_member_name(&self, scope: &BodyScope<'_>, name: &Ident) -> String {
        match scope.ctx.enclosing {
            Some(index) => format!("{}.{}", self.declared[index].dotted_name, name),
            None => name.to_string(),
        }
    }

    fn bind_body(&mut self, body: &Body, ret: Ty, scope: &BodyScope<'_>, name: &Ident) -> ir::Expr {
        let source = scope.ctx.source;

        match body {
            Body::Expression(expr) if ret == Ty::Void => {
                if !matches!(expr.kind, ExprKind::Call(..)) {
                    self.error(
                        codes::INVALID_STATEMENT_EXPRESSION,
                        "Only call expressions can be used as a statement",
                        source,
                        &expr.range,
                    );
                }
                let (_, expr) = self.bind_value(expr, scope);
                ir::Expr::Discard(Box::new(expr))
            }
            Body::Expression(expr) => {
                let value = self.bind_value(expr, scope);
                self.coerce(value, ret, scope, &expr.range)
            }
            Body::Block(stmts) => {
                if let Some(unreachable) = stmts.get(1) {
                    self.warning(codes::UNREACHABLE_CODE, "Unreachable code detected", source, unreachable.range());
                }

                match stmts.first() {
                    None if ret == Ty::Void || ret == Ty::Error => ir::Expr::Const(Value::Void),
                    None => {
                        let member = self.qualified_member_name(scope, name);
                        self.error(
                            codes::NOT_ALL_PATHS_RETURN,
                            format!("'{}': not all code paths return a value", member),
                            source,
                            &name.range,
                        );
                        ir::Expr::Const(Value::Void)
                    }
                    Some(Stmt::Return { value: Some(expr), range }) if ret == Ty::Void => {
                        let member = self.qualified_member_name(scope, name);
                        self.error(
                            codes::RETURN_VALUE_IN_VOID,
                            format!(
                                "Since '{}' returns void, a return keyword must not be followed by an object expression",
                                member
                            ),
                            source,
                            range,
                        );
                        self.bind_value(expr, scope);
                        ir::Expr::Const(Value::Void)
                    }
                    Some(Stmt::Return { value: Some(expr), .. }) => {
                        let value = self.bind_value(expr, scope);
                        self.coerce(value, ret, scope, &expr.range)
                    }
                    Some(Stmt::Return { value: None, .. }) if ret == Ty::Void || ret == Ty::Error => {
                        ir::Expr::Const(Value::Void)
                    }
                    Some(Stmt::Return { value: None, range }) => {
                        let expected = self.ty_name(ret);
                        self.error(
                            codes::RETURN_VALUE_EXPECTED,
                            format!("An object of a type convertible to '{}' is required", expected),
                            source,
                            range,
                        );
                        ir::Expr::Const(Value::Void)
                    }
                }
            }
        }
    }

    /// Applies the implicit conversion to `target`, reporting when there is none.
    fn coerce(&mut self, (ty, expr): Typed, target: Ty, scope: &BodyScope<'_>, range: &Range) -> ir::Expr {
        match self.conversion(ty, target) {
            Some(Conversion::Identity) => expr,
            Some(Conversion::ToDouble) => ir::Expr::ToDouble(Box::new(expr)),
            None => {
                let (from, to) = (self.ty_name(ty), self.ty_name(target));
                self.error(
                    codes::IMPLICIT_CONVERSION,
                    format!("Cannot implicitly convert type '{}' to '{}'", from, to),
                    scope.ctx.source,
                    range,
                );
                expr
            }
        }
    }

    fn bind_value(&mut self, expr: &Expr, scope: &BodyScope<'_>) -> Typed {
        let source = scope.ctx.source;

        match self.bind(expr, scope) {
            Bound::Value(ty, expr) => (ty, expr),
            Bound::Type(ty) => {
                let name = self.ty_name(ty);
                self.error(
                    codes::TYPE_USED_AS_VALUE,
                    format!("'{}' is a type, which is not valid in the given context", name),
                    source,
                    &expr.range,
                );
                error_value()
            }
            Bound::Namespace(namespace) => {
                self.error(
                    codes::TYPE_USED_AS_VALUE,
                    format!("'{}' is a namespace, which is not valid in the given context", namespace),
                    source,
                    &expr.range,
                );
                error_value()
            }
            Bound::MethodGroup { name, .. } => {
                self.error(
                    codes::METHOD_GROUP_AS_VALUE,
                    format!("Cannot convert method group '{}' to non-delegate type", name),
                    source,
                    &expr.range,
                );
                error_value()
            }
        }
    }

    fn bind(&mut self, expr: &Expr, scope: &BodyScope<'_>) -> Bound {
        match &expr.kind {
            ExprKind::Literal(literal) => {
                let (ty, value) = match literal {
                    Literal::Int(n) => (Ty::Int, Value::Int(*n)),
                    Literal::Double(d) => (Ty::Double, Value::Double(*d)),
                    Literal::String(s) => (Ty::String, Value::String(s.clone())),
                    Literal::Bool(b) => (Ty::Bool, Value::Bool(*b)),
                    Literal::Null => (Ty::Null, Value::Null),
                };
                Bound::Value(ty, ir::Expr::Const(value))
            }
            ExprKind::Name(ident) => self.bind_name(ident, scope),
            ExprKind::Member(target, ident) => self.bind_member_access(target, ident, scope),
            ExprKind::Call(callee, args) => self.bind_call(callee, args, scope),
            ExprKind::Unary(op, operand) => {
                let (ty, expr) = self.bind_unary(*op, operand, &expr.range, scope);
                Bound::Value(ty, expr)
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let (ty, expr) = self.bind_binary(*op, lhs, rhs, &expr.range, scope);
                Bound::Value(ty, expr)
            }
        }
    }

    fn bind_name(&mut self, ident: &Ident, scope: &BodyScope<'_>) -> Bound {
        if let Some(position) = scope.params.iter().position(|(name, _)| *name == ident.name) {
            return Bound::Value(scope.params[position].1, ir::Expr::Param(position as u16));
        }

        let mut enclosing = scope.ctx.enclosing;
        while let Some(index) = enclosing {
            if let Some(bound) = self.bind_type_member(index, ident, scope, false) {
                return bound;
            }
            enclosing = self.declared[index].declaring;
        }

        match self.lookup_type(&ident.name, &scope.ctx) {
            Lookup::Found(ty) => return Bound::Type(ty),
            lookup @ Lookup::Ambiguous(_) => {
                self.report_lookup(&ident.name, lookup, scope.ctx.source, &ident.range);
                let (ty, expr) = error_value();
                return Bound::Value(ty, expr);
            }
            Lookup::NotFound => {}
        }

        if let Some(namespace) = self.lookup_namespace(&ident.name, &scope.ctx) {
            return Bound::Namespace(namespace);
        }

        self.error(
            codes::NAME_NOT_FOUND,
            format!("The name '{}' does not exist in the current context", ident),
            scope.ctx.source,
            &ident.range,
        );
        let (ty, expr) = error_value();
        Bound::Value(ty, expr)
    }

    /// A member or nested type of a declared type. `qualified` is set for
    /// `Type.Name`, which never has an implicit instance.
    fn bind_type_member(
        &mut self,
        index: usize,
        ident: &Ident,
        scope: &BodyScope<'_>,
        qualified: bool,
    ) -> Option<Bound> {
        let declared = &self.declared[index];
        let Some((member_index, symbol)) = declared
            .members
            .iter()
            .enumerate()
            .find(|(_, symbol)| symbol.name == ident.name)
        else {
            let nested = format!("{}.{}", declared.dotted_name, ident.name);
            return self.by_dotted.get(&nested).map(|id| Bound::Type(Ty::Type(*id)));
        };

        let bound = match symbol.kind {
            MemberKind::Method | MemberKind::Constructor => Bound::MethodGroup {
                type_index: index,
                name: ident.name.clone(),
            },
            MemberKind::EnumMember => Bound::Value(
                symbol.ty,
                ir::Expr::Const(symbol.constant.clone().unwrap_or_default()),
            ),
            MemberKind::Field | MemberKind::Property if symbol.is_static => Bound::Value(
                symbol.ty,
                ir::Expr::LoadStatic {
                    type_index: index as u32,
                    member_index: member_index as u32,
                },
            ),
            MemberKind::Field | MemberKind::Property if qualified || scope.is_static => {
                let name = format!("{}.{}", declared.dotted_name, ident.name);
                self.object_reference_required(&name, scope, &ident.range);
                let (ty, expr) = error_value();
                Bound::Value(ty, expr)
            }
            MemberKind::Field | MemberKind::Property => Bound::Value(symbol.ty, ir::Expr::Const(Value::Void)),
        };

        Some(bound)
    }

    fn object_reference_required(&mut self, name: &str, scope: &BodyScope<'_>, range: &Range) {
        self.error(
            codes::OBJECT_REFERENCE_REQUIRED,
            format!(
                "An object reference is required for the non-static field, method, or property '{}'",
                name
            ),
            scope.ctx.source,
            range,
        );
    }

    fn bind_member_access(&mut self, target: &Expr, ident: &Ident, scope: &BodyScope<'_>) -> Bound {
        let source = scope.ctx.source;

        let message = match self.bind(target, scope) {
            Bound::Namespace(namespace) => {
                let dotted = format!("{}.{}", namespace, ident.name);
                if let Some(id) = self.by_dotted.get(&dotted) {
                    return Bound::Type(Ty::Type(*id));
                }
                if self.namespaces.contains(&dotted) {
                    return Bound::Namespace(dotted);
                }
                self.error(
                    codes::NAMESPACE_MEMBER_NOT_FOUND,
                    format!(
                        "The type or namespace name '{}' does not exist in the namespace '{}'",
                        ident, namespace
                    ),
                    source,
                    &ident.range,
                );
                None
            }
            Bound::Type(Ty::Type(TypeId::Declared(index))) => {
                if let Some(bound) = self.bind_type_member(index, ident, scope, true) {
                    return bound;
                }
                Some(format!(
                    "'{}' does not contain a definition for '{}'",
                    self.declared[index].dotted_name, ident
                ))
            }
            Bound::Type(Ty::Type(TypeId::External(index))) => {
                let external = &self.external[index];
                let nested = format!("{}.{}", external.dotted_name, ident.name);
                if let Some(id) = self.by_dotted.get(&nested) {
                    return Bound::Type(Ty::Type(*id));
                }

                if external.def.members.iter().any(|member| member.name == ident.name) {
                    let message = format!(
                        "'{}.{}' belongs to the referenced module '{}' and cannot be accessed from this module",
                        external.dotted_name, ident, external.module
                    );
                    self.error(codes::CROSS_MODULE_CALL, message, source, &ident.range);
                    None
                } else {
                    Some(format!(
                        "'{}' does not contain a definition for '{}'",
                        external.dotted_name, ident
                    ))
                }
            }
            Bound::Type(ty) => Some(format!(
                "'{}' does not contain a definition for '{}'",
                self.ty_name(ty),
                ident
            )),
            Bound::MethodGroup { name, .. } => Some(format!("'{}' does not contain a definition for '{}'", name, ident)),
            Bound::Value(Ty::Error, _) => None,
            Bound::Value(ty, _) => Some(format!(
                "'{}' does not contain a definition for '{}'",
                self.ty_name(ty),
                ident
            )),
        };

        if let Some(message) = message {
            self.error(codes::MEMBER_NOT_FOUND, message, source, &ident.range);
        }
        let (ty, expr) = error_value();
        Bound::Value(ty, expr)
    }

    fn bind_call(&mut self, callee: &Expr, args: &[Expr], scope: &BodyScope<'_>) -> Bound {
        let source = scope.ctx.source;
        let args = args.iter().map(|arg| self.bind_value(arg, scope)).collect::<Vec<_>>();

        let (ty, expr) = match self.bind(callee, scope) {
            Bound::MethodGroup { type_index, name } => {
                let qualified = matches!(callee.kind, ExprKind::Member(..));
                self.resolve_overload(type_index, &name, args, qualified || scope.is_static, scope, &callee.range)
            }
            Bound::Value(Ty::Error, _) => error_value(),
            Bound::Value(..) => {
                match &callee.kind {
                    ExprKind::Name(ident) | ExprKind::Member(_, ident) => self.error(
                        codes::NON_INVOCABLE_MEMBER,
                        format!("Non-invocable member '{}' cannot be used like a method", ident),
                        source,
                        &callee.range,
                    ),
                    _ => self.error(codes::METHOD_NAME_EXPECTED, "Method name expected", source, &callee.range),
                }
                error_value()
            }
            Bound::Type(ty) => {
                let name = self.ty_name(ty);
                self.error(
                    codes::TYPE_USED_AS_VALUE,
                    format!("'{}' is a type, which is not valid in the given context", name),
                    source,
                    &callee.range,
                );
                error_value()
            }
            Bound::Namespace(namespace) => {
                self.error(
                    codes::TYPE_USED_AS_VALUE,
                    format!("'{}' is a namespace, which is not valid in the given context", namespace),
                    source,
                    &callee.range,
                );
                error_value()
            }
        };

        Bound::Value(ty, expr)
    }

    /// Picks the first method with a matching parameter count whose
    /// parameters accept every argument.
    fn resolve_overload(
        &mut self,
        type_index: usize,
        name: &SmolStr,
        args: Vec<Typed>,
        require_static: bool,
        scope: &BodyScope<'_>,
        range: &Range,
    ) -> Typed {
        let source = scope.ctx.source;
        let candidates = self.declared[type_index]
            .members
            .iter()
            .enumerate()
            .filter(|(_, symbol)| symbol.kind == MemberKind::Method && symbol.name == *name)
            .filter(|(_, symbol)| symbol.params.len() == args.len())
            .map(|(member_index, symbol)| {
                (
                    member_index,
                    symbol.params.iter().map(|(_, ty)| *ty).collect::<Vec<_>>(),
                    symbol.ty,
                    symbol.is_static,
                )
            })
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            self.error(
                codes::NO_OVERLOAD_FOR_ARITY,
                format!("No overload for method '{}' takes {} arguments", name, args.len()),
                source,
                range,
            );
            return error_value();
        }

        let chosen = candidates.iter().find(|(_, params, ..)| {
            params
                .iter()
                .zip(&args)
                .all(|(param, (arg, _))| self.conversion(*arg, *param).is_some())
        });

        let Some((member_index, params, ret, is_static)) = chosen.cloned() else {
            let (_, params, ..) = &candidates[0];
            if let Some((position, (arg, param))) = args
                .iter()
                .map(|(ty, _)| *ty)
                .zip(params.iter().copied())
                .enumerate()
                .find(|(_, (arg, param))| self.conversion(*arg, *param).is_none())
            {
                let (arg, param) = (self.ty_name(arg), self.ty_name(param));
                self.error(
                    codes::ARGUMENT_CONVERSION,
                    format!("Argument {}: cannot convert from '{}' to '{}'", position + 1, arg, param),
                    source,
                    range,
                );
            }
            return error_value();
        };

        if !is_static {
            if require_static {
                let name = format!("{}.{}", self.declared[type_index].dotted_name, name);
                self.object_reference_required(&name, scope, range);
                return error_value();
            }
            return (ret, ir::Expr::Const(Value::Void));
        }

        let args = args
            .into_iter()
            .zip(params)
            .map(|(arg, param)| promote(arg, param))
            .collect();

        (
            ret,
            ir::Expr::Call {
                type_index: type_index as u32,
                member_index: member_index as u32,
                args,
            },
        )
    }

    fn bind_unary(&mut self, op: ast::UnaryOp, operand: &Expr, range: &Range, scope: &BodyScope<'_>) -> Typed {
        let (ty, expr) = self.bind_value(operand, scope);

        match (op, ty) {
            (_, Ty::Error) => error_value(),
            (ast::UnaryOp::Not, Ty::Bool) => (Ty::Bool, ir::Expr::Unary(ir::UnaryOp::Not, Box::new(expr))),
            (ast::UnaryOp::Negate, Ty::Int | Ty::Double) => (ty, ir::Expr::Unary(ir::UnaryOp::Negate, Box::new(expr))),
            _ => {
                let name = self.ty_name(ty);
                self.error(
                    codes::UNARY_OPERATOR_MISMATCH,
                    format!("Operator '{}' cannot be applied to operand of type '{}'", op, name),
                    scope.ctx.source,
                    range,
                );
                error_value()
            }
        }
    }

    fn bind_binary(
        &mut self,
        op: ast::BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        range: &Range,
        scope: &BodyScope<'_>,
    ) -> Typed {
        use ast::BinaryOp::*;

        let left = self.bind_value(lhs, scope);
        let right = self.bind_value(rhs, scope);
        let (lt, rt) = (left.0, right.0);

        if lt == Ty::Error || rt == Ty::Error {
            return error_value();
        }

        let numeric = lt.is_numeric() && rt.is_numeric();
        let widened = if lt == Ty::Double || rt == Ty::Double {
            Ty::Double
        } else {
            Ty::Int
        };
        let same_enum = lt == rt && self.is_enum(lt);

        let result = match op {
            Add if (lt == Ty::String || rt == Ty::String) && lt != Ty::Void && rt != Ty::Void => {
                Some((Ty::String, ir::BinaryOp::Concat, false))
            }
            Add | Sub | Mul | Div | Rem if numeric => Some((widened, lower_binary_op(op), true)),
            Lt | Lte | Gt | Gte if numeric => Some((Ty::Bool, lower_binary_op(op), true)),
            Lt | Lte | Gt | Gte if same_enum => Some((Ty::Bool, lower_binary_op(op), false)),
            Eq | Ne if numeric => Some((Ty::Bool, lower_binary_op(op), true)),
            Eq | Ne if (lt == rt && lt == Ty::Bool) || same_enum => Some((Ty::Bool, lower_binary_op(op), false)),
            Eq | Ne
                if self.is_reference(lt)
                    && self.is_reference(rt)
                    && (self.conversion(lt, rt).is_some() || self.conversion(rt, lt).is_some()) =>
            {
                Some((Ty::Bool, lower_binary_op(op), false))
            }
            And | Or if lt == Ty::Bool && rt == Ty::Bool => Some((Ty::Bool, lower_binary_op(op), false)),
            _ => None,
        };

        match result {
            Some((ty, op, widen)) => {
                let (left, right) = if widen {
                    (promote(left, widened), promote(right, widened))
                } else {
                    (left.1, right.1)
                };
                (ty, ir::Expr::Binary(op, Box::new(left), Box::new(right)))
            }
            None => {
                let (left, right) = (self.ty_name(lt), self.ty_name(rt));
                self.error(
                    codes::BINARY_OPERATOR_MISMATCH,
                    format!(
                        "Operator '{}' cannot be applied to operands of type '{}' and '{}'",
                        op, left, right
                    ),
                    scope.ctx.source,
                    range,
                );
                error_value()
            }
        }
    }
}
