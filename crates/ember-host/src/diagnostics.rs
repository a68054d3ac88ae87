//! Classification of compiler diagnostics into fatal and advisory ones.

use ember_lang::{Diagnostic, Severity};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiagnosticOptions {
    /// Treat every warning as an error.
    pub warnings_as_errors: bool,
    /// Warning codes treated as errors.
    pub warn_as_error: Vec<String>,
    /// Warning and info codes that are dropped. Errors are never dropped.
    pub suppress: Vec<String>,
}

/// The diagnostics of one compilation, split by whether they fail it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub fatal: Vec<Diagnostic>,
    pub advisory: Vec<Diagnostic>,
}

impl Classified {
    #[inline(always)]
    pub fn is_success(&self) -> bool {
        self.fatal.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiagnosticFilter {
    warnings_as_errors: bool,
    warn_as_error: FxHashSet<String>,
    suppress: FxHashSet<String>,
}

impl DiagnosticFilter {
    pub fn new(options: &DiagnosticOptions) -> Self {
        Self {
            warnings_as_errors: options.warnings_as_errors,
            warn_as_error: options.warn_as_error.iter().cloned().collect(),
            suppress: options.suppress.iter().cloned().collect(),
        }
    }

    /// Splits `diagnostics` preserving their order. Suppression takes
    /// precedence over escalation.
    pub fn classify(&self, diagnostics: Vec<Diagnostic>) -> Classified {
        let mut classified = Classified::default();

        for diagnostic in diagnostics {
            match diagnostic.severity {
                Severity::Error => classified.fatal.push(diagnostic),
                _ if self.suppress.contains(diagnostic.code.as_ref()) => {
                    debug!(code = %diagnostic.code, "Suppressed diagnostic");
                }
                Severity::Warning
                    if self.warnings_as_errors || self.warn_as_error.contains(diagnostic.code.as_ref()) =>
                {
                    classified.fatal.push(diagnostic.escalate());
                }
                _ => classified.advisory.push(diagnostic),
            }
        }

        classified
    }
}
