use smol_str::SmolStr;

use super::Analyzer;
use super::types::Ty;
use crate::ast::{Item, Member, TypeDecl, UsingDirective};
use crate::diagnostic::codes;
use crate::ir::{self, Accessibility, MemberKind, TypeDef};
use crate::range::Range;
use crate::source::SourceId;
use crate::value::Value;

pub(crate) type ScopeId = usize;

/// The `using` directives visible from one compilation unit or namespace body.
#[derive(Debug)]
pub(crate) struct UsingScope {
    pub parent: Option<ScopeId>,
    /// Dotted name of the enclosing namespace, empty for the global namespace.
    pub namespace: String,
    pub source: SourceId,
    pub usings: Vec<Using>,
}

#[derive(Debug)]
pub(crate) struct Using {
    pub namespace: String,
    pub range: Range,
    pub used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TypeId {
    Declared(usize),
    External(usize),
}

#[derive(Debug)]
pub(crate) struct DeclaredType<'a> {
    pub decl: &'a TypeDecl,
    /// `Ns.Outer+Inner`
    pub full_name: String,
    /// `Ns.Outer.Inner`
    pub dotted_name: String,
    pub source: SourceId,
    pub scope: ScopeId,
    pub declaring: Option<usize>,
    pub accessibility: Accessibility,
    pub bases: Vec<Ty>,
    pub members: Vec<MemberSymbol<'a>>,
}

#[derive(Debug)]
pub(crate) struct MemberSymbol<'a> {
    pub member: &'a Member,
    pub name: SmolStr,
    pub name_range: Range,
    pub kind: MemberKind,
    pub accessibility: Accessibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_readonly: bool,
    pub ty: Ty,
    pub params: Vec<(SmolStr, Ty)>,
    pub constant: Option<Value>,
    pub body: Option<ir::Expr>,
}

/// A public type of a referenced module.
#[derive(Debug)]
pub(crate) struct ExternalType<'a> {
    pub def: &'a TypeDef,
    pub module: &'a str,
    pub dotted_name: String,
}

pub(crate) fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

impl<'a> Analyzer<'a> {
    pub(super) fn collect_external(&mut self) {
        for module in self.references {
            for def in &module.types {
                if def.accessibility != Accessibility::Public {
                    continue;
                }

                self.add_namespace(def.namespace().unwrap_or_default());
                let dotted_name = def.full_name.replace('+', ".");
                let id = TypeId::External(self.external.len());
                self.by_dotted.entry(dotted_name.clone()).or_insert(id);
                self.external.push(ExternalType {
                    def,
                    module: &module.name,
                    dotted_name,
                });
            }
        }
    }

    pub(super) fn collect_declared(&mut self) {
        for tree in self.trees {
            let scope = self.push_scope(None, String::new(), tree.source_id, &tree.root.usings);
            self.collect_items(&tree.root.items, scope, tree.source_id);
        }
    }

    fn add_namespace(&mut self, namespace: &str) {
        let mut current = namespace;
        while !current.is_empty() && self.namespaces.insert(current.to_string()) {
            current = current.rsplit_once('.').map(|(parent, _)| parent).unwrap_or_default();
        }
    }

    fn push_scope(
        &mut self,
        parent: Option<ScopeId>,
        namespace: String,
        source: SourceId,
        usings: &[UsingDirective],
    ) -> ScopeId {
        self.scopes.push(UsingScope {
            parent,
            namespace,
            source,
            usings: usings
                .iter()
                .map(|using| Using {
                    namespace: using.name.to_string(),
                    range: using.name.range.clone(),
                    used: false,
                })
                .collect(),
        });
        self.scopes.len() - 1
    }

    fn collect_items(&mut self, items: &'a [Item], scope: ScopeId, source: SourceId) {
        for item in items {
            match item {
                Item::Namespace(namespace) => {
                    let name = qualify(&self.scopes[scope].namespace, &namespace.name.to_string());
                    self.add_namespace(&name);
                    let child = self.push_scope(Some(scope), name, source, &namespace.usings);
                    self.collect_items(&namespace.items, child, source);
                }
                Item::Type(decl) => self.collect_type(decl, scope, source, None),
            }
        }
    }

    fn collect_type(&mut self, decl: &'a TypeDecl, scope: ScopeId, source: SourceId, declaring: Option<usize>) {
        let (full_name, dotted_name) = match declaring {
            Some(outer) => (
                format!("{}+{}", self.declared[outer].full_name, decl.name),
                format!("{}.{}", self.declared[outer].dotted_name, decl.name),
            ),
            None => {
                let name = qualify(&self.scopes[scope].namespace, &decl.name.name);
                (name.clone(), name)
            }
        };

        let index = self.declared.len();
        match self.by_dotted.get(&dotted_name).copied() {
            Some(TypeId::Declared(_)) => match declaring {
                // nested duplicates are reported with the other members
                Some(_) => {}
                None => {
                    let namespace = &self.scopes[scope].namespace;
                    let namespace = if namespace.is_empty() {
                        "<global namespace>".to_string()
                    } else {
                        namespace.clone()
                    };
                    self.error(
                        codes::DUPLICATE_TYPE,
                        format!(
                            "The namespace '{}' already contains a definition for '{}'",
                            namespace, decl.name
                        ),
                        source,
                        &decl.name.range,
                    );
                }
            },
            Some(TypeId::External(external)) => {
                self.warning(
                    codes::IMPORTED_TYPE_CONFLICT,
                    format!(
                        "The type '{}' conflicts with the imported type '{}' in '{}'. Using the type defined in this module",
                        dotted_name, self.external[external].dotted_name, self.external[external].module
                    ),
                    source,
                    &decl.name.range,
                );
                self.by_dotted.insert(dotted_name.clone(), TypeId::Declared(index));
            }
            None => {
                self.by_dotted.insert(dotted_name.clone(), TypeId::Declared(index));
            }
        }

        self.declared.push(DeclaredType {
            decl,
            full_name,
            dotted_name,
            source,
            scope,
            declaring,
            accessibility: if declaring.is_some() {
                Accessibility::Private
            } else {
                Accessibility::Internal
            },
            bases: Vec::new(),
            members: Vec::new(),
        });

        for member in &decl.members {
            if let Member::NestedType(nested) = member {
                self.collect_type(nested, scope, source, Some(index));
            }
        }
    }
}
