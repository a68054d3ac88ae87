//! `ember-host` compiles Ember sources entirely in memory and loads the
//! resulting module into an isolated, unloadable execution context.
//!
//! ## Examples
//!
//! ```rs
//! use std::sync::Arc;
//! use ember_host::{CompilationFacade, CompileOptions, ExecutionContextRegistry, ExtraReferences, SourceSet};
//!
//! let registry = Arc::new(ExecutionContextRegistry::new());
//! let facade = CompilationFacade::new(&CompileOptions::default(), Arc::clone(&registry));
//!
//! let mut sources = SourceSet::new();
//! sources.add_inline("class Greeter { public static string Hello() => \"hi\"; }");
//!
//! let handle = facade.compile_and_load(&sources, &ExtraReferences::default()).unwrap();
//! assert!(handle.resolve("Greeter").unwrap().is_some());
//! assert_eq!(handle.invoke("Greeter", "Hello", vec![]).unwrap(), ember_lang::Value::from("hi"));
//!
//! handle.unload().unwrap();
//! assert!(registry.is_empty());
//! ```
mod config;
mod diagnostics;
mod engine;
mod error;
mod facade;
mod loader;
mod module_id;
mod reference;
mod source;

pub use config::{CONFIG_FILE, CompileOptions, ReferenceOptions, RuntimeLimits};
pub use diagnostics::{Classified, DiagnosticFilter, DiagnosticOptions};
pub use engine::{
    Analyzed, BinaryModule, CompilationEngine, CompilationRequest, Compiled, CompilerService, EmberAnalysis,
    EmberCompiler, ReferenceImage,
};
pub use error::{CompilationError, Error, InvokeError, LoadError};
pub use facade::CompilationFacade;
pub use loader::{ExecutionContextRegistry, LoadedModuleHandle, MemberDescriptor, ModuleLoader, TypeDescriptor};
pub use module_id::ModuleId;
pub use reference::{
    ExtraReferences, MODULE_EXTENSION, ReferenceLocation, ReferenceResolver, ReferenceStrategy,
    TRUSTED_REFERENCES_ENV,
};
pub use source::{SourceSet, SourceUnit};

pub type Result<T> = std::result::Result<T, Error>;
