//! Resolution of the binary modules a compilation is compiled against.

use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Error;
use crate::loader::ExecutionContextRegistry;

/// Environment variable holding the platform list of trusted module images.
pub const TRUSTED_REFERENCES_ENV: &str = "EMBER_TRUSTED_REFERENCES";
/// File extension of Ember module images.
pub const MODULE_EXTENSION: &str = "emb";

/// Absolute location of a module image.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Hash)]
pub struct ReferenceLocation(PathBuf);

impl ReferenceLocation {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Display for ReferenceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Where the implicit part of the reference set comes from.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStrategy {
    /// The platform's trusted module list.
    #[default]
    Trusted,
    /// Modules the host has loaded from files.
    Loaded,
    Both,
}

/// Caller-supplied references of one request.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct ExtraReferences {
    /// Every `*.emb` file inside each directory.
    pub directories: Vec<PathBuf>,
    pub paths: Vec<PathBuf>,
}

impl ExtraReferences {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            directories: vec![path.into()],
            paths: Vec::new(),
        }
    }

    pub fn paths<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            directories: Vec::new(),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.paths.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceResolver {
    strategy: ReferenceStrategy,
    /// Explicit trusted list; the environment is read when absent.
    trusted: Option<Vec<PathBuf>>,
}

impl ReferenceResolver {
    pub fn new(strategy: ReferenceStrategy, trusted: Option<Vec<PathBuf>>) -> Self {
        Self { strategy, trusted }
    }

    /// The de-duplicated union of the implicit reference set and `extra`.
    pub fn resolve(
        &self,
        registry: &ExecutionContextRegistry,
        extra: &ExtraReferences,
    ) -> Result<Vec<ReferenceLocation>, Error> {
        let mut locations = Vec::new();

        if matches!(self.strategy, ReferenceStrategy::Loaded | ReferenceStrategy::Both) {
            locations.extend(registry.locations().into_iter().map(ReferenceLocation));
        }

        if matches!(self.strategy, ReferenceStrategy::Trusted | ReferenceStrategy::Both) {
            for path in self.trusted_paths() {
                match path.canonicalize() {
                    Ok(path) => locations.push(ReferenceLocation(path)),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping trusted reference"),
                }
            }
        }

        for directory in &extra.directories {
            locations.extend(scan_directory(directory)?);
        }

        for path in &extra.paths {
            locations.push(canonicalize(path)?);
        }

        let locations = locations.into_iter().unique().collect::<Vec<_>>();
        debug!(strategy = ?self.strategy, references = locations.len(), "Resolved references");

        Ok(locations)
    }

    fn trusted_paths(&self) -> Vec<PathBuf> {
        match &self.trusted {
            Some(paths) => paths.clone(),
            None => std::env::var_os(TRUSTED_REFERENCES_ENV)
                .map(|value| split_trusted(&value))
                .unwrap_or_default(),
        }
    }
}

fn split_trusted(value: &OsString) -> Vec<PathBuf> {
    std::env::split_paths(value)
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}

fn canonicalize(path: &Path) -> Result<ReferenceLocation, Error> {
    path.canonicalize()
        .map(ReferenceLocation)
        .map_err(|e| Error::Resolution {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn scan_directory(directory: &Path) -> Result<Vec<ReferenceLocation>, Error> {
    let directory = canonicalize(directory)?;
    if !directory.path().is_dir() {
        return Err(Error::Resolution {
            path: directory.0,
            reason: "not a directory".to_string(),
        });
    }

    let pattern = directory.path().join(format!("*.{}", MODULE_EXTENSION));
    let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| Error::Resolution {
        path: directory.0.clone(),
        reason: e.to_string(),
    })?;

    let mut locations = entries
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .map(ReferenceLocation)
        .collect::<Vec<_>>();
    locations.sort();

    Ok(locations)
}
