//! Binding and checking of parsed sources, and lowering to a [`Module`].
//!
//! Analysis runs in passes over all syntax trees of a compilation:
//! collect the declared and referenced types, validate `using` directives,
//! bind declarations (modifiers, bases, member signatures), check base
//! cycles, then bind member bodies and lower the static ones.

mod declarations;
mod expr;
mod resolve;
mod symbols;
mod types;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::ast::SyntaxTree;
use crate::diagnostic::Diagnostic;
use crate::ir::{self, Module, ParamDef, TypeDef};
use crate::lexer::token::Modifier;
use crate::range::Range;
use crate::source::SourceId;
use symbols::{DeclaredType, ExternalType, TypeId, UsingScope};

/// The checked and lowered form of one compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub module: Module,
    pub diagnostics: Vec<Diagnostic>,
}

/// Analyses `trees` as one module named `module_name`, with the public types
/// of `references` in scope.
pub fn analyze(module_name: &str, trees: &[SyntaxTree], references: &[Module]) -> Analysis {
    let mut analyzer = Analyzer::new(trees, references);

    analyzer.collect_external();
    analyzer.collect_declared();
    analyzer.check_usings();
    analyzer.bind_declarations();
    analyzer.check_base_cycles();
    analyzer.bind_bodies();
    analyzer.report_unused_usings();

    let module = analyzer.build_module(module_name);
    debug!(
        module = module_name,
        types = module.types.len(),
        diagnostics = analyzer.diagnostics.len(),
        "Analyzed module"
    );

    Analysis {
        module,
        diagnostics: analyzer.diagnostics,
    }
}

pub(crate) struct Analyzer<'a> {
    trees: &'a [SyntaxTree],
    references: &'a [Module],
    scopes: Vec<UsingScope>,
    declared: Vec<DeclaredType<'a>>,
    external: Vec<ExternalType<'a>>,
    /// Every visible type by its dotted name (`Ns.Outer.Inner`).
    by_dotted: FxHashMap<String, TypeId>,
    namespaces: FxHashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Analyzer<'a> {
    fn new(trees: &'a [SyntaxTree], references: &'a [Module]) -> Self {
        Self {
            trees,
            references,
            scopes: Vec::new(),
            declared: Vec::new(),
            external: Vec::new(),
            by_dotted: FxHashMap::default(),
            namespaces: FxHashSet::default(),
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, source: SourceId, range: &Range) {
        self.diagnostics
            .push(Diagnostic::error(code, message).at(source, range.clone()));
    }

    fn warning(&mut self, code: &'static str, message: impl Into<String>, source: SourceId, range: &Range) {
        self.diagnostics
            .push(Diagnostic::warning(code, message).at(source, range.clone()));
    }

    fn info(&mut self, code: &'static str, message: impl Into<String>, source: SourceId, range: &Range) {
        self.diagnostics
            .push(Diagnostic::info(code, message).at(source, range.clone()));
    }

    fn build_module(&mut self, name: &str) -> Module {
        let mut types = Vec::with_capacity(self.declared.len());

        for index in 0..self.declared.len() {
            let declared = &self.declared[index];
            let decl = declared.decl;
            let modifiers = &decl.modifiers;

            let members = declared
                .members
                .iter()
                .map(|symbol| ir::MemberDef {
                    name: symbol.name.to_string(),
                    kind: symbol.kind,
                    accessibility: symbol.accessibility,
                    is_static: symbol.is_static,
                    is_abstract: symbol.is_abstract,
                    is_readonly: symbol.is_readonly,
                    ty: self.ir_type_name(symbol.ty),
                    params: symbol
                        .params
                        .iter()
                        .map(|(name, ty)| ParamDef {
                            name: name.to_string(),
                            ty: self.ir_type_name(*ty),
                        })
                        .collect(),
                    body: None,
                    constant: symbol.constant.clone(),
                })
                .collect::<Vec<_>>();

            types.push(TypeDef {
                full_name: declared.full_name.clone(),
                kind: decl.kind,
                accessibility: declared.accessibility,
                is_static: modifiers.has(Modifier::Static),
                is_sealed: self.is_sealed_type(TypeId::Declared(index)),
                is_abstract: modifiers.has(Modifier::Abstract) || decl.kind == ir::TypeKind::Interface,
                declaring_type: declared.declaring.map(|outer| outer as u32),
                bases: declared.bases.iter().map(|ty| self.ir_type_name(*ty)).collect(),
                members,
            });
        }

        for (def, declared) in types.iter_mut().zip(self.declared.iter_mut()) {
            for (member, symbol) in def.members.iter_mut().zip(declared.members.iter_mut()) {
                member.body = symbol.body.take();
            }
        }

        Module {
            name: name.to_string(),
            types,
            references: self.references.iter().map(|module| module.name.clone()).collect(),
        }
    }
}
