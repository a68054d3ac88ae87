use thiserror::Error;
use tracing::debug;

use crate::ast::SyntaxTree;
use crate::binary::{self, DecodeError};
use crate::diagnostic::Diagnostic;
use crate::ir::Module;
use crate::source::{SourceId, SourceText};
use crate::{parse, semantic};

/// A compiled module the sources are compiled against.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataReference {
    /// Where the module came from, used in messages.
    pub display: String,
    pub module: Module,
}

impl MetadataReference {
    pub fn from_image(display: impl Into<String>, bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            display: display.into(),
            module: binary::decode(bytes)?,
        })
    }

    pub fn from_module(display: impl Into<String>, module: Module) -> Self {
        Self {
            display: display.into(),
            module,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("Compilation has {0} error(s)")]
    HasErrors(usize),
}

/// All sources of one module, parsed and analysed together.
#[derive(Debug, Clone)]
pub struct Compilation {
    sources: Vec<SourceText>,
    trees: Vec<SyntaxTree>,
    references: Vec<MetadataReference>,
    module: Module,
    diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    pub fn create(module_name: &str, sources: Vec<SourceText>, references: Vec<MetadataReference>) -> Self {
        let trees = sources
            .iter()
            .enumerate()
            .map(|(index, source)| parse(&source.text, SourceId::new(index)))
            .collect::<Vec<_>>();
        let modules = references.iter().map(|r| r.module.clone()).collect::<Vec<_>>();
        let analysis = semantic::analyze(module_name, &trees, &modules);

        let mut diagnostics = trees
            .iter()
            .flat_map(|tree| tree.diagnostics.iter().cloned())
            .chain(analysis.diagnostics)
            .collect::<Vec<_>>();
        // Located diagnostics in source order, unlocated ones last.
        diagnostics.sort_by(|a, b| match (&a.location, &b.location) {
            (Some(a), Some(b)) => (a.source, &a.range.start).cmp(&(b.source, &b.range.start)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        debug!(
            module = module_name,
            sources = sources.len(),
            references = references.len(),
            diagnostics = diagnostics.len(),
            "Created compilation"
        );

        Self {
            sources,
            trees,
            references,
            module: analysis.module,
            diagnostics,
        }
    }

    pub fn sources(&self) -> &[SourceText] {
        &self.sources
    }

    pub fn syntax_trees(&self) -> &[SyntaxTree] {
        &self.trees
    }

    pub fn references(&self) -> &[MetadataReference] {
        &self.references
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Encodes the module image. Fails when any diagnostic is an error.
    pub fn emit(&self) -> Result<Vec<u8>, EmitError> {
        let errors = self.diagnostics.iter().filter(|d| d.is_error()).count();
        if errors > 0 {
            return Err(EmitError::HasErrors(errors));
        }
        Ok(binary::encode(&self.module))
    }
}
