use std::fmt::Display;
use std::path::PathBuf;

use ember_lang::{DecodeError, Diagnostic as EmberDiagnostic, DiagnosticReport, RuntimeError, SourceText};
use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;

use crate::module_id::ModuleId;

/// Errors of the compile-and-load pipeline.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Failed to read source file \"{}\"", path.display())]
    #[diagnostic(code(ember::source_read))]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid reference \"{}\": {reason}", path.display())]
    #[diagnostic(
        code(ember::resolution),
        help("Reference paths must point to existing Ember module images (*.emb).")
    )]
    Resolution { path: PathBuf, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compilation(#[from] CompilationError),

    #[error("Failed to load module: {0}")]
    #[diagnostic(code(ember::load))]
    Load(#[from] LoadError),

    #[error("Module \"{0}\" has been unloaded")]
    #[diagnostic(code(ember::unloaded))]
    Unloaded(ModuleId),

    #[error("Invocation failed: {0}")]
    #[diagnostic(code(ember::invoke))]
    Invoke(#[from] InvokeError),

    #[error("Invalid configuration \"{}\": {message}", path.display())]
    #[diagnostic(code(ember::config))]
    Config { path: PathBuf, message: String },
}

impl Error {
    /// Fatal diagnostics of a failed compilation; empty for other errors.
    pub fn diagnostics(&self) -> &[EmberDiagnostic] {
        match self {
            Error::Compilation(err) => &err.fatal,
            _ => &[],
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("A module named \"{0}\" is already loaded")]
    DuplicateModule(ModuleId),
    #[error("Module image is named \"{found}\", expected \"{expected}\"")]
    IdentityMismatch { expected: ModuleId, found: String },
    #[error("Failed to read \"{}\": {message}", path.display())]
    Io { path: PathBuf, message: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvokeError {
    #[error("Type \"{0}\" not found")]
    TypeNotFound(String),
    #[error("\"{type_name}\" has no static method \"{method}\"")]
    MethodNotFound { type_name: String, method: String },
    #[error("No overload of \"{type_name}.{method}\" takes {arity} argument(s)")]
    NoOverload {
        type_name: String,
        method: String,
        arity: usize,
    },
    #[error("Argument {index} of \"{method}\" expects {expected}, got {found}")]
    ArgumentType {
        method: String,
        index: usize,
        expected: String,
        found: &'static str,
    },
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// A compilation that ended with at least one fatal diagnostic.
#[derive(Debug, Error)]
#[error("Compilation failed with {} error(s): {}", fatal.len(), fatal.iter().join("; "))]
pub struct CompilationError {
    pub fatal: Vec<EmberDiagnostic>,
    pub advisory: Vec<EmberDiagnostic>,
    reports: Vec<DiagnosticReport>,
}

impl CompilationError {
    pub fn new(fatal: Vec<EmberDiagnostic>, advisory: Vec<EmberDiagnostic>, sources: &[SourceText]) -> Self {
        let reports = fatal.iter().map(|d| d.to_report(sources)).collect();
        Self {
            fatal,
            advisory,
            reports,
        }
    }

    /// `(code, message)` of each fatal diagnostic in order.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.fatal
            .iter()
            .map(|d| (d.code.to_string(), d.message.clone()))
            .collect()
    }
}

impl Diagnostic for CompilationError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new("ember::compilation"))
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        Some(Box::new(self.reports.iter().map(|r| r as &dyn Diagnostic)))
    }
}

#[cfg(test)]
mod tests {
    use ember_lang::codes;

    use super::*;

    #[test]
    fn test_compilation_error_message() {
        let err = CompilationError::new(
            vec![
                EmberDiagnostic::error(codes::SEMICOLON_EXPECTED, "`;` expected"),
                EmberDiagnostic::error(codes::TYPE_NOT_FOUND, "missing"),
            ],
            vec![],
            &[],
        );

        assert_eq!(
            err.to_string(),
            "Compilation failed with 2 error(s): EM1002: `;` expected; EM0246: missing"
        );
        assert_eq!(err.messages()[1], ("EM0246".to_string(), "missing".to_string()));
        assert_eq!(err.related().map(|r| r.count()), Some(2));
    }

    #[test]
    fn test_diagnostics_only_for_compilation() {
        let err = Error::Unloaded(ModuleId::from("abc"));
        assert!(err.diagnostics().is_empty());
        assert_eq!(err.to_string(), "Module \"abc\" has been unloaded");
    }
}
