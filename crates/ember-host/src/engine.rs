//! Turning in-memory sources into a module image.

use ember_lang::{Compilation, Diagnostic, MetadataReference, SourceText};
use tracing::{debug, warn};

use crate::diagnostics::{Classified, DiagnosticFilter};
use crate::error::{CompilationError, Error};
use crate::module_id::ModuleId;
use crate::reference::ReferenceLocation;

/// An emitted module image, not yet loaded.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct BinaryModule {
    module_id: ModuleId,
    bytes: Vec<u8>,
}

impl BinaryModule {
    pub fn new(module_id: ModuleId, bytes: Vec<u8>) -> Self {
        Self { module_id, bytes }
    }

    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A reference image read into memory for one compilation.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ReferenceImage {
    pub location: ReferenceLocation,
    pub bytes: Vec<u8>,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CompilationRequest {
    pub module_id: ModuleId,
    pub sources: Vec<SourceText>,
    pub references: Vec<ReferenceImage>,
}

/// Result of the analysis phase of a [`CompilerService`].
pub trait Analyzed {
    fn diagnostics(&self) -> &[Diagnostic];
}

/// A compiler front end and back end, driven in two phases so that emission
/// only happens once the diagnostics have been judged.
pub trait CompilerService: Send + Sync {
    type Analysis: Analyzed;

    /// Parses and checks the request. Fails only when a reference cannot be
    /// used; problems in the sources are reported as diagnostics.
    fn analyze(&self, request: CompilationRequest) -> Result<Self::Analysis, Error>;

    fn emit(&self, analysis: Self::Analysis) -> Result<BinaryModule, Error>;
}

/// The Ember compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmberCompiler;

#[derive(Debug, Clone)]
pub struct EmberAnalysis {
    module_id: ModuleId,
    compilation: Compilation,
}

impl Analyzed for EmberAnalysis {
    fn diagnostics(&self) -> &[Diagnostic] {
        self.compilation.diagnostics()
    }
}

impl CompilerService for EmberCompiler {
    type Analysis = EmberAnalysis;

    fn analyze(&self, request: CompilationRequest) -> Result<Self::Analysis, Error> {
        let references = request
            .references
            .iter()
            .map(|image| {
                MetadataReference::from_image(image.location.to_string(), &image.bytes).map_err(|e| {
                    Error::Resolution {
                        path: image.location.path().to_path_buf(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let compilation = Compilation::create(request.module_id.as_str(), request.sources, references);
        Ok(EmberAnalysis {
            module_id: request.module_id,
            compilation,
        })
    }

    fn emit(&self, analysis: Self::Analysis) -> Result<BinaryModule, Error> {
        let EmberAnalysis { module_id, compilation } = analysis;

        match compilation.emit() {
            Ok(bytes) => Ok(BinaryModule::new(module_id, bytes)),
            Err(_) => {
                let (fatal, advisory): (Vec<_>, Vec<_>) = compilation
                    .diagnostics()
                    .iter()
                    .cloned()
                    .partition(Diagnostic::is_error);
                Err(CompilationError::new(fatal, advisory, compilation.sources()).into())
            }
        }
    }
}

/// A successful compilation.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub binary: BinaryModule,
    pub advisory: Vec<Diagnostic>,
    /// Names of the sources that were compiled, indexed by `SourceId`.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompilationEngine<C> {
    service: C,
    filter: DiagnosticFilter,
}

impl<C: CompilerService> CompilationEngine<C> {
    pub fn new(service: C, filter: DiagnosticFilter) -> Self {
        Self { service, filter }
    }

    pub fn service(&self) -> &C {
        &self.service
    }

    /// Compiles `sources` against `references` under a fresh module identity.
    /// The image is emitted only when no diagnostic is fatal.
    pub fn compile(&self, sources: Vec<SourceText>, references: &[ReferenceLocation]) -> Result<Compiled, Error> {
        let module_id = ModuleId::generate();
        let references = references
            .iter()
            .map(|location| {
                std::fs::read(location.path())
                    .map(|bytes| ReferenceImage {
                        location: location.clone(),
                        bytes,
                    })
                    .map_err(|e| Error::Resolution {
                        path: location.path().to_path_buf(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            module_id = %module_id,
            sources = sources.len(),
            references = references.len(),
            "Compiling module"
        );

        let request = CompilationRequest {
            module_id: module_id.clone(),
            sources: sources.clone(),
            references,
        };
        let analysis = self.service.analyze(request)?;
        let Classified { fatal, advisory } = self.filter.classify(analysis.diagnostics().to_vec());

        if !fatal.is_empty() {
            warn!(
                module_id = %module_id,
                fatal = fatal.len(),
                advisory = advisory.len(),
                "Compilation failed"
            );
            return Err(CompilationError::new(fatal, advisory, &sources).into());
        }

        let binary = self.service.emit(analysis)?;
        debug!(module_id = %module_id, bytes = binary.len(), advisory = advisory.len(), "Emitted module");

        Ok(Compiled {
            binary,
            advisory,
            sources: sources.into_iter().map(|source| source.name).collect(),
        })
    }
}
