use std::path::{Path, PathBuf};

use ember_lang::RuntimeOptions;
use serde::Deserialize;

use crate::diagnostics::DiagnosticOptions;
use crate::error::Error;
use crate::reference::ReferenceStrategy;

/// Default file name of the configuration file.
pub const CONFIG_FILE: &str = "ember.toml";

/// Options of the compile-and-load pipeline, usually read from `ember.toml`:
///
/// ```toml
/// [diagnostics]
/// warnings_as_errors = false
/// warn_as_error = ["EM0628"]
/// suppress = ["EM8019"]
///
/// [references]
/// strategy = "both"
/// trusted = ["/opt/ember/lib/core.emb"]
/// directories = ["lib"]
///
/// [runtime]
/// max_call_depth = 128
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    pub diagnostics: DiagnosticOptions,
    pub references: ReferenceOptions,
    pub runtime: RuntimeLimits,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReferenceOptions {
    pub strategy: ReferenceStrategy,
    /// Replaces the platform list from the environment when set.
    pub trusted: Option<Vec<PathBuf>>,
    /// Directories whose module images are referenced by every request.
    pub directories: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeLimits {
    pub max_call_depth: u32,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_call_depth: RuntimeOptions::default().max_call_depth,
        }
    }
}

impl From<RuntimeLimits> for RuntimeOptions {
    fn from(limits: RuntimeLimits) -> Self {
        RuntimeOptions {
            max_call_depth: limits.max_call_depth,
        }
    }
}

impl CompileOptions {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_toml(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Relative reference directories are taken relative to `base`.
    pub fn with_base_dir(mut self, base: &Path) -> Self {
        self.references.directories = self
            .references
            .directories
            .into_iter()
            .map(|dir| if dir.is_relative() { base.join(dir) } else { dir })
            .collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml() {
        let options = CompileOptions::from_toml(
            r#"
            [diagnostics]
            warnings_as_errors = true
            suppress = ["EM8019"]

            [references]
            strategy = "both"
            directories = ["lib"]

            [runtime]
            max_call_depth = 12
            "#,
        )
        .unwrap();

        assert!(options.diagnostics.warnings_as_errors);
        assert_eq!(options.diagnostics.suppress, vec!["EM8019".to_string()]);
        assert!(options.diagnostics.warn_as_error.is_empty());
        assert_eq!(options.references.strategy, ReferenceStrategy::Both);
        assert_eq!(options.references.trusted, None);
        assert_eq!(options.runtime.max_call_depth, 12);

        let options = options.with_base_dir(Path::new("/work"));
        assert_eq!(options.references.directories, vec![PathBuf::from("/work/lib")]);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(CompileOptions::from_toml("").unwrap(), CompileOptions::default());
    }

    #[test]
    fn test_unknown_section() {
        assert!(CompileOptions::from_toml("[optimizer]\nlevel = 3").is_err());
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[references]\nstrategy = \"everything\"").unwrap();

        assert!(matches!(CompileOptions::from_file(&path), Err(Error::Config { .. })));
        assert!(matches!(
            CompileOptions::from_file(dir.path().join("missing.toml")),
            Err(Error::Config { .. })
        ));
    }
}
