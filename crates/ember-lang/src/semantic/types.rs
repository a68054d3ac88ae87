use rustc_hash::FxHashSet;

use super::Analyzer;
use super::symbols::TypeId;
use crate::ast::TypeKind;
use crate::lexer::token::Modifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Ty {
    Void,
    Bool,
    Int,
    Double,
    String,
    Object,
    /// Type of the `null` literal.
    Null,
    Type(TypeId),
    /// Already reported; suppresses follow-up diagnostics.
    Error,
}

impl Ty {
    pub fn primitive(name: &str) -> Option<Ty> {
        match name {
            "void" => Some(Ty::Void),
            "bool" => Some(Ty::Bool),
            "int" => Some(Ty::Int),
            "double" => Some(Ty::Double),
            "string" => Some(Ty::String),
            "object" => Some(Ty::Object),
            _ => None,
        }
    }

    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Ty::Void => Some("void"),
            Ty::Bool => Some("bool"),
            Ty::Int => Some("int"),
            Ty::Double => Some("double"),
            Ty::String => Some("string"),
            Ty::Object => Some("object"),
            Ty::Null | Ty::Type(_) | Ty::Error => None,
        }
    }

    #[inline(always)]
    pub fn is_numeric(self) -> bool {
        matches!(self, Ty::Int | Ty::Double)
    }
}

/// How a value of one type is turned into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conversion {
    Identity,
    ToDouble,
}

impl Analyzer<'_> {
    /// Name of a type as shown in diagnostics.
    pub(super) fn ty_name(&self, ty: Ty) -> String {
        match ty {
            Ty::Type(TypeId::Declared(index)) => self.declared[index].dotted_name.clone(),
            Ty::Type(TypeId::External(index)) => self.external[index].dotted_name.clone(),
            Ty::Null => "<null>".to_string(),
            Ty::Error => "?".to_string(),
            ty => ty.keyword().unwrap_or_default().to_string(),
        }
    }

    /// Name of a type as recorded in the module image.
    pub(super) fn ir_type_name(&self, ty: Ty) -> String {
        match ty {
            Ty::Type(TypeId::Declared(index)) => self.declared[index].full_name.clone(),
            Ty::Type(TypeId::External(index)) => self.external[index].def.full_name.clone(),
            Ty::Null => "object".to_string(),
            Ty::Error => "?".to_string(),
            ty => ty.keyword().unwrap_or_default().to_string(),
        }
    }

    pub(super) fn type_kind(&self, id: TypeId) -> TypeKind {
        match id {
            TypeId::Declared(index) => self.declared[index].decl.kind,
            TypeId::External(index) => self.external[index].def.kind,
        }
    }

    pub(super) fn is_static_type(&self, id: TypeId) -> bool {
        match id {
            TypeId::Declared(index) => self.declared[index].decl.modifiers.has(Modifier::Static),
            TypeId::External(index) => self.external[index].def.is_static,
        }
    }

    /// Sealed classes, and every struct and enum.
    pub(super) fn is_sealed_type(&self, id: TypeId) -> bool {
        match id {
            TypeId::Declared(index) => {
                let decl = self.declared[index].decl;
                decl.modifiers.has(Modifier::Sealed) || matches!(decl.kind, TypeKind::Struct | TypeKind::Enum)
            }
            TypeId::External(index) => {
                let def = self.external[index].def;
                def.is_sealed || matches!(def.kind, TypeKind::Struct | TypeKind::Enum)
            }
        }
    }

    pub(super) fn is_enum(&self, ty: Ty) -> bool {
        matches!(ty, Ty::Type(id) if self.type_kind(id) == TypeKind::Enum)
    }

    /// Types that admit `null`.
    pub(super) fn is_reference(&self, ty: Ty) -> bool {
        match ty {
            Ty::String | Ty::Object | Ty::Null => true,
            Ty::Type(id) => matches!(self.type_kind(id), TypeKind::Class | TypeKind::Interface),
            _ => false,
        }
    }

    pub(super) fn base_types(&self, id: TypeId) -> Vec<TypeId> {
        match id {
            TypeId::Declared(index) => self.declared[index]
                .bases
                .iter()
                .filter_map(|ty| match ty {
                    Ty::Type(base) => Some(*base),
                    _ => None,
                })
                .collect(),
            TypeId::External(index) => self.external[index]
                .def
                .bases
                .iter()
                .filter_map(|base| self.by_dotted.get(&base.replace('+', ".")).copied())
                .collect(),
        }
    }

    pub(super) fn derives_from(&self, from: TypeId, to: TypeId) -> bool {
        let mut visited = FxHashSet::default();
        let mut pending = self.base_types(from);

        while let Some(id) = pending.pop() {
            if id == to {
                return true;
            }
            if visited.insert(id) {
                pending.extend(self.base_types(id));
            }
        }

        false
    }

    /// The implicit conversion from `from` to `to`, if one exists.
    pub(super) fn conversion(&self, from: Ty, to: Ty) -> Option<Conversion> {
        match (from, to) {
            (Ty::Error, _) | (_, Ty::Error) => Some(Conversion::Identity),
            (from, to) if from == to => Some(Conversion::Identity),
            (Ty::Int, Ty::Double) => Some(Conversion::ToDouble),
            (Ty::Void, _) => None,
            (_, Ty::Object) => Some(Conversion::Identity),
            (Ty::Null, to) if self.is_reference(to) => Some(Conversion::Identity),
            (Ty::Type(from), Ty::Type(to)) if self.derives_from(from, to) => Some(Conversion::Identity),
            _ => None,
        }
    }
}
