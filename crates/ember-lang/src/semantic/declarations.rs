use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use super::Analyzer;
use super::resolve::Context;
use super::symbols::{MemberSymbol, TypeId};
use super::types::Ty;
use crate::ast::{Expr, ExprKind, Ident, Literal, Member, Modifiers, Param, TypeDecl, TypeKind, TypeRef, UnaryOp};
use crate::diagnostic::codes;
use crate::ir::{Accessibility, MemberKind};
use crate::lexer::token::Modifier;
use crate::source::SourceId;
use crate::value::Value;

const ACCESSIBILITY: [Modifier; 4] = [
    Modifier::Public,
    Modifier::Private,
    Modifier::Protected,
    Modifier::Internal,
];

fn accessibility_of(modifier: Modifier) -> Option<Accessibility> {
    match modifier {
        Modifier::Public => Some(Accessibility::Public),
        Modifier::Private => Some(Accessibility::Private),
        Modifier::Protected => Some(Accessibility::Protected),
        Modifier::Internal => Some(Accessibility::Internal),
        _ => None,
    }
}

/// `5`, `-5`, or nothing.
fn enum_constant(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(n)) => Some(*n),
        ExprKind::Unary(UnaryOp::Negate, operand) => match &operand.kind {
            ExprKind::Literal(Literal::Int(n)) => Some(n.wrapping_neg()),
            _ => None,
        },
        _ => None,
    }
}

/// What the member checks need to know about the declaring type.
struct Owner<'d> {
    decl: &'d TypeDecl,
    index: usize,
    dotted_name: String,
    ctx: Context,
}

impl Owner<'_> {
    fn has(&self, modifier: Modifier) -> bool {
        self.decl.modifiers.has(modifier)
    }

    fn default_accessibility(&self) -> Accessibility {
        match self.decl.kind {
            TypeKind::Interface | TypeKind::Enum => Accessibility::Public,
            TypeKind::Class | TypeKind::Struct => Accessibility::Private,
        }
    }

    fn member_modifiers(&self, extra: &[Modifier]) -> Vec<Modifier> {
        let mut allowed = ACCESSIBILITY.to_vec();
        allowed.extend(
            extra
                .iter()
                .filter(|m| !(self.decl.kind == TypeKind::Struct && **m == Modifier::Abstract)),
        );
        allowed
    }
}

impl<'a> Analyzer<'a> {
    pub(super) fn bind_declarations(&mut self) {
        for index in 0..self.declared.len() {
            let declared = &self.declared[index];
            let decl = declared.decl;
            let base_ctx = Context {
                scope: declared.scope,
                enclosing: declared.declaring,
                source: declared.source,
            };
            let owner = Owner {
                decl,
                index,
                dotted_name: declared.dotted_name.clone(),
                ctx: Context {
                    enclosing: Some(index),
                    ..base_ctx
                },
            };
            let nested = declared.declaring.is_some();

            let accessibility = self.check_type_modifiers(decl, nested, base_ctx.source);
            self.declared[index].accessibility = accessibility;

            let bases = self.bind_bases(&owner, &base_ctx);
            self.declared[index].bases = bases;

            let members = self.bind_members(&owner);
            self.check_duplicate_members(&owner, &members);
            self.declared[index].members = members;
        }
    }

    pub(super) fn check_base_cycles(&mut self) {
        for index in 0..self.declared.len() {
            let id = TypeId::Declared(index);
            if !self.derives_from(id, id) {
                continue;
            }

            let base = self
                .base_types(id)
                .first()
                .map(|base| self.ty_name(Ty::Type(*base)))
                .unwrap_or_default();
            let declared = &self.declared[index];
            let (name, source, range) = (
                declared.dotted_name.clone(),
                declared.source,
                declared.decl.name.range.clone(),
            );
            self.error(
                codes::CIRCULAR_BASE,
                format!("Circular base type dependency involving '{}' and '{}'", name, base),
                source,
                &range,
            );
        }
    }

    fn check_modifiers(&mut self, modifiers: &Modifiers, allowed: &[Modifier], source: SourceId) -> Option<Accessibility> {
        let mut seen = FxHashSet::default();
        let mut accessibility = None;

        for (modifier, range) in modifiers.iter() {
            if !seen.insert(*modifier) {
                self.error(
                    codes::DUPLICATE_MODIFIER,
                    format!("Duplicate '{}' modifier", modifier),
                    source,
                    range,
                );
                continue;
            }

            if !allowed.contains(modifier) {
                self.error(
                    codes::INVALID_MODIFIER,
                    format!("The modifier '{}' is not valid for this item", modifier),
                    source,
                    range,
                );
                continue;
            }

            if let Some(current) = accessibility_of(*modifier) {
                if accessibility.is_some() {
                    self.error(
                        codes::MULTIPLE_PROTECTION_MODIFIERS,
                        "More than one protection modifier",
                        source,
                        range,
                    );
                } else {
                    accessibility = Some(current);
                }
            }
        }

        accessibility
    }

    fn check_type_modifiers(&mut self, decl: &TypeDecl, nested: bool, source: SourceId) -> Accessibility {
        let mut allowed = ACCESSIBILITY.to_vec();
        if decl.kind == TypeKind::Class {
            allowed.extend([Modifier::Static, Modifier::Sealed, Modifier::Abstract]);
        }

        let accessibility = self.check_modifiers(&decl.modifiers, &allowed, source);
        if !nested && matches!(accessibility, Some(Accessibility::Private | Accessibility::Protected)) {
            self.error(
                codes::PRIVATE_NAMESPACE_MEMBER,
                "Elements defined in a namespace cannot be explicitly declared as private or protected",
                source,
                &decl.name.range,
            );
        }

        let modifiers = &decl.modifiers;
        if modifiers.has(Modifier::Abstract) && (modifiers.has(Modifier::Sealed) || modifiers.has(Modifier::Static)) {
            self.error(
                codes::ABSTRACT_SEALED_TYPE,
                format!("'{}': an abstract type cannot be sealed or static", decl.name),
                source,
                &decl.name.range,
            );
        } else if modifiers.has(Modifier::Static) && modifiers.has(Modifier::Sealed) {
            self.error(
                codes::ABSTRACT_SEALED_TYPE,
                format!("'{}': a type cannot be both static and sealed", decl.name),
                source,
                &decl.name.range,
            );
        }

        accessibility.unwrap_or(if nested {
            Accessibility::Private
        } else {
            Accessibility::Internal
        })
    }

    fn bind_bases(&mut self, owner: &Owner<'_>, ctx: &Context) -> Vec<Ty> {
        let decl = owner.decl;
        let source = ctx.source;
        let mut bases = Vec::new();

        for (position, base) in decl.bases.iter().enumerate() {
            let ty = self.resolve_type_ref(base, ctx);
            let range = base.range();

            if decl.kind == TypeKind::Enum {
                self.error(
                    codes::INVALID_ENUM_BASE,
                    "Type byte, sbyte, short, ushort, int, uint, long, or ulong expected",
                    source,
                    range,
                );
                continue;
            }

            let base_class_position = decl.kind == TypeKind::Class && position == 0;
            match ty {
                Ty::Error => {}
                Ty::Object if base_class_position => {}
                Ty::Type(id) if self.type_kind(id) == TypeKind::Interface => bases.push(ty),
                Ty::Type(id) if base_class_position && self.is_static_type(id) => {
                    self.error(
                        codes::STATIC_BASE,
                        format!(
                            "'{}': cannot derive from static class '{}'",
                            owner.dotted_name,
                            self.ty_name(ty)
                        ),
                        source,
                        range,
                    );
                }
                Ty::Type(id) if base_class_position && !self.is_sealed_type(id) => bases.push(ty),
                _ if base_class_position => {
                    self.error(
                        codes::SEALED_BASE,
                        format!(
                            "'{}': cannot derive from sealed type '{}'",
                            owner.dotted_name,
                            self.ty_name(ty)
                        ),
                        source,
                        range,
                    );
                }
                _ => {
                    self.error(
                        codes::NOT_AN_INTERFACE,
                        format!("Type '{}' in interface list is not an interface", self.ty_name(ty)),
                        source,
                        range,
                    );
                }
            }
        }

        bases
    }

    fn bind_members(&mut self, owner: &Owner<'a>) -> Vec<MemberSymbol<'a>> {
        let decl: &'a TypeDecl = self.declared[owner.index].decl;
        let mut symbols = Vec::new();
        let mut next_enum_value = 0i64;

        for member in &decl.members {
            let symbol = match member {
                Member::NestedType(_) => continue,
                Member::Field(field) => {
                    let allowed = owner.member_modifiers(&[Modifier::Static, Modifier::Readonly]);
                    let accessibility = self.check_modifiers(&field.modifiers, &allowed, owner.ctx.source);
                    let ty = self.resolve_value_type(&field.ty, &owner.ctx);
                    if decl.kind == TypeKind::Interface {
                        self.error(
                            codes::INTERFACE_FIELD,
                            "Interfaces cannot contain instance fields",
                            owner.ctx.source,
                            &field.name.range,
                        );
                    }

                    MemberSymbol {
                        member,
                        name: field.name.name.clone(),
                        name_range: field.name.range.clone(),
                        kind: MemberKind::Field,
                        accessibility: accessibility.unwrap_or(owner.default_accessibility()),
                        is_static: field.modifiers.has(Modifier::Static),
                        is_abstract: false,
                        is_readonly: field.modifiers.has(Modifier::Readonly),
                        ty,
                        params: Vec::new(),
                        constant: None,
                        body: None,
                    }
                }
                Member::Property(property) => {
                    let allowed = owner.member_modifiers(&[Modifier::Static, Modifier::Abstract]);
                    let accessibility = self.check_modifiers(&property.modifiers, &allowed, owner.ctx.source);
                    let ty = self.resolve_value_type(&property.ty, &owner.ctx);
                    if !property.has_getter {
                        self.error(
                            codes::AUTO_PROPERTY_WITHOUT_GETTER,
                            "Auto-implemented properties must have get accessors",
                            owner.ctx.source,
                            &property.name.range,
                        );
                    }
                    let is_static = property.modifiers.has(Modifier::Static);
                    self.check_abstract(owner, &property.modifiers, is_static, &property.name);

                    MemberSymbol {
                        member,
                        name: property.name.name.clone(),
                        name_range: property.name.range.clone(),
                        kind: MemberKind::Property,
                        accessibility: accessibility.unwrap_or(owner.default_accessibility()),
                        is_static,
                        is_abstract: property.modifiers.has(Modifier::Abstract) || decl.kind == TypeKind::Interface,
                        is_readonly: !property.has_setter,
                        ty,
                        params: Vec::new(),
                        constant: None,
                        body: None,
                    }
                }
                Member::Method(method) => {
                    let allowed = owner.member_modifiers(&[Modifier::Static, Modifier::Abstract]);
                    let accessibility = self.check_modifiers(&method.modifiers, &allowed, owner.ctx.source);
                    let ty = self.resolve_type_ref(&method.return_type, &owner.ctx);
                    let params = self.bind_params(&method.params, &owner.ctx);
                    let is_static = method.modifiers.has(Modifier::Static);
                    let marked_abstract = method.modifiers.has(Modifier::Abstract);
                    self.check_abstract(owner, &method.modifiers, is_static, &method.name);

                    let is_abstract = marked_abstract || (decl.kind == TypeKind::Interface && method.body.is_none());
                    if marked_abstract && method.body.is_some() {
                        self.error(
                            codes::ABSTRACT_WITH_BODY,
                            format!(
                                "'{}.{}' cannot declare a body because it is marked abstract",
                                owner.dotted_name, method.name
                            ),
                            owner.ctx.source,
                            &method.name.range,
                        );
                    } else if !is_abstract && method.body.is_none() {
                        self.missing_body(owner, &method.name);
                    }

                    MemberSymbol {
                        member,
                        name: method.name.name.clone(),
                        name_range: method.name.range.clone(),
                        kind: MemberKind::Method,
                        accessibility: accessibility.unwrap_or(owner.default_accessibility()),
                        is_static,
                        is_abstract,
                        is_readonly: false,
                        ty,
                        params,
                        constant: None,
                        body: None,
                    }
                }
                Member::Constructor(ctor) => {
                    let allowed = owner.member_modifiers(&[Modifier::Static]);
                    let accessibility = self.check_modifiers(&ctor.modifiers, &allowed, owner.ctx.source);
                    let params = self.bind_params(&ctor.params, &owner.ctx);
                    if decl.kind == TypeKind::Interface {
                        self.error(
                            codes::INTERFACE_CONSTRUCTOR,
                            "Interfaces cannot contain constructors",
                            owner.ctx.source,
                            &ctor.name.range,
                        );
                    } else if ctor.body.is_none() {
                        self.missing_body(owner, &ctor.name);
                    }

                    MemberSymbol {
                        member,
                        name: SmolStr::new_static(".ctor"),
                        name_range: ctor.name.range.clone(),
                        kind: MemberKind::Constructor,
                        accessibility: accessibility.unwrap_or(owner.default_accessibility()),
                        is_static: ctor.modifiers.has(Modifier::Static),
                        is_abstract: false,
                        is_readonly: false,
                        ty: Ty::Void,
                        params,
                        constant: None,
                        body: None,
                    }
                }
                Member::EnumMember(enum_member) => {
                    let value = match &enum_member.value {
                        Some(expr) => match enum_constant(expr) {
                            Some(value) => value,
                            None => {
                                self.error(
                                    codes::CONSTANT_EXPECTED,
                                    format!(
                                        "The expression being assigned to '{}.{}' must be constant",
                                        owner.dotted_name, enum_member.name
                                    ),
                                    owner.ctx.source,
                                    &expr.range,
                                );
                                next_enum_value
                            }
                        },
                        None => next_enum_value,
                    };
                    next_enum_value = value.wrapping_add(1);

                    MemberSymbol {
                        member,
                        name: enum_member.name.name.clone(),
                        name_range: enum_member.name.range.clone(),
                        kind: MemberKind::EnumMember,
                        accessibility: Accessibility::Public,
                        is_static: true,
                        is_abstract: false,
                        is_readonly: true,
                        ty: Ty::Type(TypeId::Declared(owner.index)),
                        params: Vec::new(),
                        constant: Some(Value::Int(value)),
                        body: None,
                    }
                }
            };

            self.check_member_placement(owner, &symbol);
            symbols.push(symbol);
        }

        symbols
    }

    fn bind_params(&mut self, params: &[Param], ctx: &Context) -> Vec<(SmolStr, Ty)> {
        let mut seen = FxHashSet::default();

        params
            .iter()
            .map(|param| {
                if !seen.insert(param.name.name.clone()) {
                    self.error(
                        codes::DUPLICATE_PARAMETER,
                        format!("The parameter name '{}' is a duplicate", param.name),
                        ctx.source,
                        &param.name.range,
                    );
                }
                (param.name.name.clone(), self.resolve_value_type(&param.ty, ctx))
            })
            .collect()
    }

    /// Resolves the type of a field, property or parameter, where `void` is not allowed.
    fn resolve_value_type(&mut self, ty: &TypeRef, ctx: &Context) -> Ty {
        match self.resolve_type_ref(ty, ctx) {
            Ty::Void => {
                self.error(
                    codes::VOID_NOT_ALLOWED,
                    "Keyword 'void' cannot be used in this context",
                    ctx.source,
                    ty.range(),
                );
                Ty::Error
            }
            ty => ty,
        }
    }

    fn check_abstract(&mut self, owner: &Owner<'_>, modifiers: &Modifiers, is_static: bool, name: &Ident) {
        if !modifiers.has(Modifier::Abstract) {
            return;
        }

        if is_static {
            self.error(
                codes::STATIC_ABSTRACT_MEMBER,
                format!("A static member '{}.{}' cannot be marked as abstract", owner.dotted_name, name),
                owner.ctx.source,
                &name.range,
            );
        } else if owner.decl.kind == TypeKind::Class && !owner.has(Modifier::Abstract) {
            self.error(
                codes::ABSTRACT_IN_CONCRETE_TYPE,
                format!(
                    "'{}.{}' is abstract but it is contained in non-abstract type '{}'",
                    owner.dotted_name, name, owner.dotted_name
                ),
                owner.ctx.source,
                &name.range,
            );
        }
    }

    fn missing_body(&mut self, owner: &Owner<'_>, name: &Ident) {
        self.error(
            codes::MISSING_BODY,
            format!(
                "'{}.{}' must declare a body because it is not marked abstract",
                owner.dotted_name, name
            ),
            owner.ctx.source,
            &name.range,
        );
    }

    fn check_member_placement(&mut self, owner: &Owner<'_>, symbol: &MemberSymbol<'_>) {
        let source = owner.ctx.source;

        if symbol.kind != MemberKind::Constructor && symbol.name == owner.decl.name.name {
            self.error(
                codes::MEMBER_NAMED_AFTER_TYPE,
                format!(
                    "'{}': member names cannot be the same as their enclosing type",
                    symbol.name
                ),
                source,
                &symbol.name_range,
            );
        }

        if owner.has(Modifier::Static) && !symbol.is_static {
            self.error(
                codes::INSTANCE_MEMBER_IN_STATIC_CLASS,
                format!("'{}': cannot declare instance members in a static class", symbol.name),
                source,
                &symbol.name_range,
            );
        }

        if owner.has(Modifier::Sealed) && symbol.accessibility == Accessibility::Protected {
            self.warning(
                codes::PROTECTED_IN_SEALED,
                format!(
                    "'{}.{}': new protected member declared in sealed type",
                    owner.dotted_name, symbol.name
                ),
                source,
                &symbol.name_range,
            );
        }
    }

    /// Methods and constructors overload on their parameter types; every
    /// other member needs a name of its own.
    fn check_duplicate_members(&mut self, owner: &Owner<'_>, symbols: &[MemberSymbol<'_>]) {
        let nested = owner.decl.members.iter().filter_map(|member| match member {
            Member::NestedType(decl) => Some((decl.name.name.clone(), decl.name.range.clone(), None, true)),
            _ => None,
        });
        let entries = symbols
            .iter()
            .map(|symbol| {
                let signature = matches!(symbol.kind, MemberKind::Method | MemberKind::Constructor)
                    .then(|| symbol.params.iter().map(|(_, ty)| *ty).collect::<Vec<_>>());
                (symbol.name.clone(), symbol.name_range.clone(), signature, false)
            })
            .chain(nested)
            .collect::<Vec<_>>();

        for (position, (name, range, signature, is_type)) in entries.iter().enumerate() {
            let duplicate = entries[..position]
                .iter()
                .filter(|(other, ..)| other == name)
                .any(|(_, _, other_signature, other_is_type)| match (signature, other_signature) {
                    _ if *is_type && *other_is_type => false,
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                });

            if duplicate {
                let message = if signature.is_some() && name != ".ctor" {
                    format!(
                        "Type '{}' already defines a member called '{}' with the same parameter types",
                        owner.dotted_name, name
                    )
                } else {
                    format!("The type '{}' already contains a definition for '{}'", owner.dotted_name, name)
                };
                self.error(codes::DUPLICATE_MEMBER, message, owner.ctx.source, range);
            }
        }
    }
}
