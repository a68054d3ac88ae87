use itertools::Itertools;
use rustc_hash::FxHashSet;

use super::Analyzer;
use super::symbols::{ScopeId, TypeId, qualify};
use super::types::Ty;
use crate::ast::TypeRef;
use crate::diagnostic::codes;
use crate::range::Range;
use crate::source::SourceId;

/// Where a name is being resolved from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Context {
    pub scope: ScopeId,
    pub enclosing: Option<usize>,
    pub source: SourceId,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lookup {
    Found(Ty),
    Ambiguous(Vec<String>),
    NotFound,
}

/// `A.B` yields `A.B`, `A` and the global namespace.
fn namespace_chain(namespace: &str) -> Vec<&str> {
    let mut chain = Vec::new();
    let mut current = namespace;

    while !current.is_empty() {
        chain.push(current);
        current = current.rsplit_once('.').map(|(parent, _)| parent).unwrap_or_default();
    }
    chain.push("");

    chain
}

impl Analyzer<'_> {
    pub(super) fn check_usings(&mut self) {
        for scope in 0..self.scopes.len() {
            let mut seen = FxHashSet::default();

            for index in 0..self.scopes[scope].usings.len() {
                let source = self.scopes[scope].source;
                let using = &self.scopes[scope].usings[index];
                let (namespace, range) = (using.namespace.clone(), using.range.clone());

                if !self.namespaces.contains(&namespace) {
                    self.error(
                        codes::TYPE_NOT_FOUND,
                        format!(
                            "The type or namespace name '{}' could not be found (are you missing a using directive or a reference?)",
                            namespace
                        ),
                        source,
                        &range,
                    );
                    self.scopes[scope].usings[index].used = true;
                } else if !seen.insert(namespace.clone()) {
                    self.warning(
                        codes::DUPLICATE_USING,
                        format!("The using directive for '{}' appeared previously in this namespace", namespace),
                        source,
                        &range,
                    );
                    self.scopes[scope].usings[index].used = true;
                }
            }
        }
    }

    pub(super) fn report_unused_usings(&mut self) {
        let unused = self
            .scopes
            .iter()
            .flat_map(|scope| {
                scope
                    .usings
                    .iter()
                    .filter(|using| !using.used)
                    .map(move |using| (scope.source, using.range.clone()))
            })
            .collect::<Vec<_>>();

        for (source, range) in unused {
            self.info(codes::UNNECESSARY_USING, "Using directive is unnecessary.", source, &range);
        }
    }

    /// Looks a (possibly dotted) type name up from `ctx`: primitives, types
    /// nested in the enclosing types, the enclosing namespaces from the
    /// innermost outwards, then the `using` directives of each scope.
    pub(super) fn lookup_type(&mut self, name: &str, ctx: &Context) -> Lookup {
        if let Some(ty) = Ty::primitive(name) {
            return Lookup::Found(ty);
        }

        let mut enclosing = ctx.enclosing;
        while let Some(index) = enclosing {
            let candidate = format!("{}.{}", self.declared[index].dotted_name, name);
            if let Some(id) = self.by_dotted.get(&candidate) {
                return Lookup::Found(Ty::Type(*id));
            }
            enclosing = self.declared[index].declaring;
        }

        let namespace = self.scopes[ctx.scope].namespace.clone();
        for prefix in namespace_chain(&namespace) {
            if let Some(id) = self.by_dotted.get(&qualify(prefix, name)) {
                return Lookup::Found(Ty::Type(*id));
            }
        }

        let mut scope = Some(ctx.scope);
        while let Some(current) = scope {
            let matches = self.scopes[current]
                .usings
                .iter()
                .enumerate()
                .filter_map(|(index, using)| {
                    self.by_dotted
                        .get(&qualify(&using.namespace, name))
                        .map(|id| (index, *id))
                })
                .collect::<Vec<_>>();
            let candidates = matches.iter().map(|(_, id)| *id).unique().collect::<Vec<TypeId>>();

            match candidates.as_slice() {
                [] => {}
                [id] => {
                    for (index, _) in matches {
                        self.scopes[current].usings[index].used = true;
                    }
                    return Lookup::Found(Ty::Type(*id));
                }
                _ => {
                    return Lookup::Ambiguous(
                        candidates
                            .into_iter()
                            .map(|id| self.ty_name(Ty::Type(id)))
                            .collect(),
                    );
                }
            }

            scope = self.scopes[current].parent;
        }

        Lookup::NotFound
    }

    /// A namespace named `name` relative to the enclosing namespaces.
    pub(super) fn lookup_namespace(&self, name: &str, ctx: &Context) -> Option<String> {
        namespace_chain(&self.scopes[ctx.scope].namespace)
            .into_iter()
            .map(|prefix| qualify(prefix, name))
            .find(|candidate| self.namespaces.contains(candidate))
    }

    pub(super) fn report_lookup(&mut self, name: &str, lookup: Lookup, source: SourceId, range: &Range) -> Ty {
        match lookup {
            Lookup::Found(ty) => ty,
            Lookup::Ambiguous(candidates) => {
                self.error(
                    codes::AMBIGUOUS_REFERENCE,
                    format!(
                        "'{}' is an ambiguous reference between {}",
                        name,
                        candidates.iter().map(|c| format!("'{}'", c)).join(" and ")
                    ),
                    source,
                    range,
                );
                Ty::Error
            }
            Lookup::NotFound => {
                self.error(
                    codes::TYPE_NOT_FOUND,
                    format!(
                        "The type or namespace name '{}' could not be found (are you missing a using directive or a reference?)",
                        name
                    ),
                    source,
                    range,
                );
                Ty::Error
            }
        }
    }

    pub(super) fn resolve_type_ref(&mut self, ty: &TypeRef, ctx: &Context) -> Ty {
        let name = ty.name.to_string();
        let lookup = self.lookup_type(&name, ctx);
        self.report_lookup(&name, lookup, ctx.source, ty.range())
    }
}
