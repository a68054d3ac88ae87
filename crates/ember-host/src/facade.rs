use std::sync::Arc;

use tracing::info;

use crate::config::CompileOptions;
use crate::diagnostics::DiagnosticFilter;
use crate::engine::{CompilationEngine, Compiled, CompilerService, EmberCompiler};
use crate::error::Error;
use crate::loader::{ExecutionContextRegistry, LoadedModuleHandle, ModuleLoader};
use crate::reference::{ExtraReferences, ReferenceResolver};
use crate::source::SourceSet;

/// Single entry point of the pipeline: sources in, loaded module out.
/// Nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct CompilationFacade<C = EmberCompiler> {
    engine: CompilationEngine<C>,
    resolver: ReferenceResolver,
    loader: ModuleLoader,
    /// Reference directories from the configuration.
    directories: Vec<std::path::PathBuf>,
}

impl CompilationFacade<EmberCompiler> {
    pub fn new(options: &CompileOptions, registry: Arc<ExecutionContextRegistry>) -> Self {
        Self::with_service(EmberCompiler, options, registry)
    }
}

impl<C: CompilerService> CompilationFacade<C> {
    pub fn with_service(service: C, options: &CompileOptions, registry: Arc<ExecutionContextRegistry>) -> Self {
        Self {
            engine: CompilationEngine::new(service, DiagnosticFilter::new(&options.diagnostics)),
            resolver: ReferenceResolver::new(options.references.strategy, options.references.trusted.clone()),
            loader: ModuleLoader::new(registry, options.runtime.into()),
            directories: options.references.directories.clone(),
        }
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn service(&self) -> &C {
        self.engine.service()
    }

    /// Runs the pipeline up to emission.
    pub fn compile(&self, sources: &SourceSet, extra: &ExtraReferences) -> Result<Compiled, Error> {
        let texts = sources.read()?;

        let mut extra = extra.clone();
        extra.directories.extend(self.directories.iter().cloned());
        let references = self.resolver.resolve(self.loader.registry(), &extra)?;

        self.engine.compile(texts, &references)
    }

    pub fn compile_and_load(&self, sources: &SourceSet, extra: &ExtraReferences) -> Result<LoadedModuleHandle, Error> {
        let compiled = self.compile(sources, extra)?;
        let handle = self.loader.load(compiled.binary)?;

        info!(
            module_id = %handle.id(),
            sources = sources.len(),
            advisory = compiled.advisory.len(),
            "Compiled and loaded module"
        );
        Ok(handle)
    }
}
