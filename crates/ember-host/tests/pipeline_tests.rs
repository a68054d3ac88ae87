use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ember_host::{
    Analyzed, BinaryModule, CompilationFacade, CompilationRequest, CompileOptions, CompilerService, EmberAnalysis,
    EmberCompiler, Error, ExecutionContextRegistry, ExtraReferences, InvokeError, LoadError, ModuleId,
    ReferenceStrategy, SourceSet,
};
use ember_lang::{Diagnostic, MAX_EXPRESSION_DEPTH, Module, RuntimeError, TypeKind, Value, codes};
use rstest::{fixture, rstest};

const GREETER: &str = r#"class Greeter { public static string Hello() => "hi"; }"#;

const LIBRARY: &str = r#"
namespace Shapes
{
    public class Shape { }
    public enum Kind { Round, Square }
}
"#;

const APP: &str = r#"
using Shapes;

public class Circle : Shape
{
    public static Kind Default;
    public static int Area(int r) => 3 * r * r;
}
"#;

const CALC: &str = r#"
namespace Acme
{
    public static class Calc
    {
        public static int Div(int a, int b) => a / b;
        public static double Half(double x) => x / 2;
        public static int Loop(int n) => Loop(n + 1);
        public static string Describe(int n) => "n=" + n;
    }

    public class Outer
    {
        private class Inner { }
    }

    internal enum Level { Low, High = 10 }
}
"#;

#[fixture]
fn options() -> CompileOptions {
    let mut options = CompileOptions::default();
    options.references.trusted = Some(Vec::new());
    options
}

fn facade(options: &CompileOptions) -> CompilationFacade {
    CompilationFacade::new(options, Arc::new(ExecutionContextRegistry::new()))
}

fn inline(texts: &[&str]) -> SourceSet {
    texts.iter().copied().fold(SourceSet::new(), |mut set, text| {
        set.add_inline(text);
        set
    })
}

fn write_library(options: &CompileOptions, dir: &Path) -> PathBuf {
    let compiled = facade(options)
        .compile(&inline(&[LIBRARY]), &ExtraReferences::default())
        .unwrap();
    let path = dir.join("shapes.emb");
    std::fs::write(&path, compiled.binary.into_bytes()).unwrap();
    path
}

#[rstest]
fn test_every_top_level_type_resolves(options: CompileOptions) {
    let handle = facade(&options)
        .compile_and_load(&inline(&[GREETER, CALC]), &ExtraReferences::default())
        .unwrap();

    for name in ["Greeter", "Acme.Calc", "Acme.Outer", "Acme.Level"] {
        assert!(handle.resolve(name).unwrap().is_some(), "{name}");
    }

    let inner = handle.resolve("Acme.Outer+Inner").unwrap().unwrap();
    assert_eq!(inner.declaring_type.as_deref(), Some("Acme.Outer"));
    assert_eq!(inner.name(), "Inner");

    let level = handle.resolve("Acme.Level").unwrap().unwrap();
    assert_eq!(level.kind, TypeKind::Enum);
    assert_eq!(level.member("High").and_then(|m| m.value.clone()), Some(Value::Int(10)));
}

#[rstest]
#[case::partial("Calc")]
#[case::nested_with_dot("Acme.Outer.Inner")]
#[case::case_mismatch("acme.calc")]
fn test_resolve_is_exact(options: CompileOptions, #[case] name: &str) {
    let handle = facade(&options)
        .compile_and_load(&inline(&[CALC]), &ExtraReferences::default())
        .unwrap();

    assert_eq!(handle.resolve(name).unwrap(), None);
}

#[rstest]
fn test_greeter(options: CompileOptions) {
    let handle = facade(&options)
        .compile_and_load(&inline(&[GREETER]), &ExtraReferences::default())
        .unwrap();

    let greeter = handle.resolve("Greeter").unwrap().unwrap();
    assert!(greeter.member("Hello").is_some());
    assert_eq!(handle.invoke("Greeter", "Hello", vec![]).unwrap(), Value::from("hi"));
}

#[rstest]
#[case::unclosed_class("class Broken {")]
#[case::missing_semicolon("class A { int x }")]
#[case::unknown_type("class A { static Missing F() => null; }")]
fn test_invalid_source_fails(options: CompileOptions, #[case] source: &str) {
    let registry = Arc::new(ExecutionContextRegistry::new());
    let facade = CompilationFacade::new(&options, Arc::clone(&registry));

    match facade.compile_and_load(&inline(&[source]), &ExtraReferences::default()) {
        Err(Error::Compilation(err)) => {
            assert!(!err.fatal.is_empty());
            assert!(err.fatal.iter().all(Diagnostic::is_error));
        }
        other => panic!("unexpected result: {:?}", other.map(|h| h.id().clone())),
    }
    assert!(registry.is_empty());
}

#[rstest]
fn test_identical_sources_load_independently(options: CompileOptions) {
    let registry = Arc::new(ExecutionContextRegistry::new());
    let facade = CompilationFacade::new(&options, Arc::clone(&registry));
    let sources = inline(&[GREETER]);

    let first = facade.compile_and_load(&sources, &ExtraReferences::default()).unwrap();
    let second = facade.compile_and_load(&sources, &ExtraReferences::default()).unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(registry.len(), 2);

    first.unload().unwrap();
    assert!(!first.is_loaded());
    assert_eq!(second.invoke("Greeter", "Hello", vec![]).unwrap(), Value::from("hi"));
    assert!(second.resolve("Greeter").unwrap().is_some());
}

#[rstest]
fn test_unloaded_handle(options: CompileOptions) {
    let registry = Arc::new(ExecutionContextRegistry::new());
    let facade = CompilationFacade::new(&options, Arc::clone(&registry));
    let handle = facade
        .compile_and_load(&inline(&[GREETER]), &ExtraReferences::default())
        .unwrap();

    handle.unload().unwrap();

    assert!(registry.is_empty());
    assert!(matches!(handle.resolve("Greeter"), Err(Error::Unloaded(id)) if &id == handle.id()));
    assert!(matches!(handle.resolve("Anything"), Err(Error::Unloaded(_))));
    assert!(matches!(handle.invoke("Greeter", "Hello", vec![]), Err(Error::Unloaded(_))));
    assert!(matches!(handle.unload(), Err(Error::Unloaded(_))));
}

#[rstest]
fn test_drop_unloads(options: CompileOptions) {
    let registry = Arc::new(ExecutionContextRegistry::new());
    let facade = CompilationFacade::new(&options, Arc::clone(&registry));

    {
        let _handle = facade
            .compile_and_load(&inline(&[GREETER]), &ExtraReferences::default())
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    assert!(registry.is_empty());
}

struct CountingCompiler {
    analyzed: AtomicUsize,
}

impl CompilerService for CountingCompiler {
    type Analysis = EmberAnalysis;

    fn analyze(&self, request: CompilationRequest) -> Result<Self::Analysis, Error> {
        self.analyzed.fetch_add(1, Ordering::SeqCst);
        EmberCompiler.analyze(request)
    }

    fn emit(&self, analysis: Self::Analysis) -> Result<BinaryModule, Error> {
        EmberCompiler.emit(analysis)
    }
}

#[rstest]
#[case::path(ExtraReferences::paths(["/no/such/dir/lib.emb"]))]
#[case::directory(ExtraReferences::directory("/no/such/dir"))]
fn test_missing_reference_fails_before_compiling(options: CompileOptions, #[case] extra: ExtraReferences) {
    let facade = CompilationFacade::with_service(
        CountingCompiler {
            analyzed: AtomicUsize::new(0),
        },
        &options,
        Arc::new(ExecutionContextRegistry::new()),
    );

    let result = facade.compile_and_load(&inline(&[GREETER]), &extra);

    assert!(matches!(result, Err(Error::Resolution { .. })));
    assert_eq!(facade.service().analyzed.load(Ordering::SeqCst), 0);
}

#[rstest]
fn test_missing_source_file_fails_before_compiling(options: CompileOptions) {
    let facade = CompilationFacade::with_service(
        CountingCompiler {
            analyzed: AtomicUsize::new(0),
        },
        &options,
        Arc::new(ExecutionContextRegistry::new()),
    );
    let mut sources = SourceSet::new();
    sources.add_file("/no/such/source.ember");

    let result = facade.compile_and_load(&sources, &ExtraReferences::default());

    assert!(matches!(result, Err(Error::SourceRead { .. })));
    assert_eq!(facade.service().analyzed.load(Ordering::SeqCst), 0);
}

struct Scripted {
    module_id: ModuleId,
    diagnostics: Vec<Diagnostic>,
}

impl Analyzed for Scripted {
    fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Reports a fixed diagnostic list and counts emissions.
struct ScriptedCompiler {
    diagnostics: Vec<Diagnostic>,
    emitted: AtomicUsize,
}

impl CompilerService for ScriptedCompiler {
    type Analysis = Scripted;

    fn analyze(&self, request: CompilationRequest) -> Result<Self::Analysis, Error> {
        Ok(Scripted {
            module_id: request.module_id,
            diagnostics: self.diagnostics.clone(),
        })
    }

    fn emit(&self, analysis: Self::Analysis) -> Result<BinaryModule, Error> {
        self.emitted.fetch_add(1, Ordering::SeqCst);
        let module = Module {
            name: analysis.module_id.to_string(),
            ..Default::default()
        };
        Ok(BinaryModule::new(analysis.module_id, ember_lang::encode(&module)))
    }
}

#[rstest]
#[case::clean(false, vec![], true)]
#[case::warning(false, vec![Diagnostic::warning(codes::DUPLICATE_USING, "dup")], true)]
#[case::escalated_warning(true, vec![Diagnostic::warning(codes::DUPLICATE_USING, "dup")], false)]
#[case::info_not_escalated(true, vec![Diagnostic::info(codes::UNNECESSARY_USING, "unused")], true)]
#[case::error(false, vec![Diagnostic::error(codes::TYPE_NOT_FOUND, "missing")], false)]
fn test_emitted_iff_no_fatal(
    mut options: CompileOptions,
    #[case] warnings_as_errors: bool,
    #[case] diagnostics: Vec<Diagnostic>,
    #[case] success: bool,
) {
    options.diagnostics.warnings_as_errors = warnings_as_errors;
    let facade = CompilationFacade::with_service(
        ScriptedCompiler {
            diagnostics,
            emitted: AtomicUsize::new(0),
        },
        &options,
        Arc::new(ExecutionContextRegistry::new()),
    );

    let result = facade.compile_and_load(&inline(&["ignored"]), &ExtraReferences::default());

    assert_eq!(result.is_ok(), success);
    assert_eq!(facade.service().emitted.load(Ordering::SeqCst), usize::from(success));
    if let Err(err) = result {
        assert!(matches!(err, Error::Compilation(_)));
        assert_eq!(err.diagnostics().len(), 1);
    }
}

#[rstest]
fn test_warnings_as_errors(mut options: CompileOptions) {
    let source = "using Shapes; using Shapes; namespace Shapes { class A { } }";
    assert!(
        facade(&options)
            .compile_and_load(&inline(&[source]), &ExtraReferences::default())
            .is_ok()
    );

    options.diagnostics.warnings_as_errors = true;
    let err = facade(&options)
        .compile_and_load(&inline(&[source]), &ExtraReferences::default())
        .unwrap_err();
    assert_eq!(err.diagnostics()[0].code, codes::DUPLICATE_USING);
    assert!(err.diagnostics()[0].warning_as_error);
}

#[rstest]
fn test_referenced_types_in_signatures(options: CompileOptions) {
    let dir = tempfile::tempdir().unwrap();
    write_library(&options, dir.path());

    let handle = facade(&options)
        .compile_and_load(&inline(&[APP]), &ExtraReferences::directory(dir.path()))
        .unwrap();

    let circle = handle.resolve("Circle").unwrap().unwrap();
    assert_eq!(circle.bases, vec!["Shapes.Shape".to_string()]);
    assert_eq!(circle.member("Default").map(|m| m.ty.as_str()), Some("Shapes.Kind"));
    assert_eq!(handle.invoke("Circle", "Area", vec![Value::Int(2)]).unwrap(), Value::Int(12));
    assert_eq!(handle.resolve("Shapes.Shape").unwrap(), None);
}

#[rstest]
fn test_unreferenced_types_fail(options: CompileOptions) {
    let err = facade(&options)
        .compile_and_load(&inline(&[APP]), &ExtraReferences::default())
        .unwrap_err();

    assert!(err.diagnostics().iter().any(|d| d.code == codes::TYPE_NOT_FOUND));
}

#[rstest]
fn test_loaded_module_strategy(mut options: CompileOptions) {
    let dir = tempfile::tempdir().unwrap();
    let library = write_library(&options, dir.path());

    options.references.strategy = ReferenceStrategy::Loaded;
    let facade = facade(&options);
    let _library = facade.loader().load_file(&library).unwrap();

    let handle = facade
        .compile_and_load(&inline(&[APP]), &ExtraReferences::default())
        .unwrap();
    assert!(handle.resolve("Circle").unwrap().is_some());

    assert!(matches!(
        facade.loader().load_file(&library),
        Err(Error::Load(LoadError::DuplicateModule(_)))
    ));
}

#[rstest]
fn test_configured_reference_directory(mut options: CompileOptions) {
    let dir = tempfile::tempdir().unwrap();
    write_library(&options, dir.path());
    options.references.directories = vec![dir.path().to_path_buf()];

    assert!(
        facade(&options)
            .compile_and_load(&inline(&[APP]), &ExtraReferences::default())
            .is_ok()
    );
}

#[rstest]
fn test_corrupted_reference(options: CompileOptions) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_library(&options, dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    let result = facade(&options).compile_and_load(&inline(&[APP]), &ExtraReferences::paths([path]));
    assert!(matches!(result, Err(Error::Resolution { .. })));
}

#[rstest]
fn test_corrupted_binary_fails_to_load(options: CompileOptions) {
    let facade = facade(&options);
    let compiled = facade
        .compile(&inline(&[GREETER]), &ExtraReferences::default())
        .unwrap();
    let id = compiled.binary.module_id().clone();
    let mut bytes = compiled.binary.into_bytes();
    bytes[0] = b'X';

    assert!(matches!(
        facade.loader().load(BinaryModule::new(id.clone(), bytes)),
        Err(Error::Load(LoadError::Decode(_)))
    ));
    assert!(matches!(
        facade.loader().load(BinaryModule::new(id, b"EMBM".to_vec())),
        Err(Error::Load(LoadError::Decode(_)))
    ));
    assert!(facade.loader().registry().is_empty());
}

fn long_sum(terms: usize) -> String {
    format!("public class Sum {{ public static int Total() => 1{}; }}", " + 1".repeat(terms - 1))
}

#[rstest]
#[case::past_decoder_limit(1025)]
#[case::very_long(20_000)]
fn test_deep_expression_fails_to_compile(options: CompileOptions, #[case] terms: usize) {
    let registry = Arc::new(ExecutionContextRegistry::new());
    let facade = CompilationFacade::new(&options, Arc::clone(&registry));

    match facade.compile_and_load(&inline(&[long_sum(terms).as_str()]), &ExtraReferences::default()) {
        Err(Error::Compilation(err)) => {
            assert!(err.fatal.iter().any(|d| d.code == codes::EXPRESSION_TOO_COMPLEX), "{:?}", err.fatal);
        }
        other => panic!("unexpected result: {:?}", other.map(|h| h.id().clone())),
    }
    assert!(registry.is_empty());
}

#[rstest]
fn test_deepest_expression_loads(options: CompileOptions) {
    let handle = facade(&options)
        .compile_and_load(&inline(&[long_sum(MAX_EXPRESSION_DEPTH).as_str()]), &ExtraReferences::default())
        .unwrap();

    assert_eq!(
        handle.invoke("Sum", "Total", vec![]).unwrap(),
        Value::Int(MAX_EXPRESSION_DEPTH as i64)
    );
}

#[rstest]
fn test_identity_mismatch(options: CompileOptions) {
    let facade = facade(&options);
    let compiled = facade
        .compile(&inline(&[GREETER]), &ExtraReferences::default())
        .unwrap();
    let bytes = compiled.binary.into_bytes();

    assert!(matches!(
        facade.loader().load(BinaryModule::new(ModuleId::generate(), bytes)),
        Err(Error::Load(LoadError::IdentityMismatch { .. }))
    ));
}

#[rstest]
#[case::double_argument("Half", vec![Value::Double(5.0)], Value::Double(2.5))]
#[case::int_to_double("Half", vec![Value::Int(3)], Value::Double(1.5))]
#[case::concat("Describe", vec![Value::Int(-4)], Value::from("n=-4"))]
#[case::division("Div", vec![Value::Int(9), Value::Int(2)], Value::Int(4))]
fn test_invoke(options: CompileOptions, #[case] method: &str, #[case] args: Vec<Value>, #[case] expected: Value) {
    let handle = facade(&options)
        .compile_and_load(&inline(&[CALC]), &ExtraReferences::default())
        .unwrap();

    assert_eq!(handle.invoke("Acme.Calc", method, args).unwrap(), expected);
}

#[rstest]
fn test_invoke_errors(mut options: CompileOptions) {
    options.runtime.max_call_depth = 8;
    let handle = facade(&options)
        .compile_and_load(&inline(&[CALC]), &ExtraReferences::default())
        .unwrap();

    let invoke_error = |type_name: &str, method: &str, args: Vec<Value>| match handle.invoke(type_name, method, args) {
        Err(Error::Invoke(err)) => err,
        other => panic!("unexpected result: {:?}", other),
    };

    assert_eq!(
        invoke_error("Calc", "Div", vec![]),
        InvokeError::TypeNotFound("Calc".to_string())
    );
    assert!(matches!(
        invoke_error("Acme.Calc", "Missing", vec![]),
        InvokeError::MethodNotFound { .. }
    ));
    assert!(matches!(
        invoke_error("Acme.Calc", "Div", vec![Value::Int(1)]),
        InvokeError::NoOverload { arity: 1, .. }
    ));
    assert!(matches!(
        invoke_error("Acme.Calc", "Div", vec![Value::Int(1), Value::from("x")]),
        InvokeError::ArgumentType {
            index: 1,
            found: "string",
            ..
        }
    ));
    assert_eq!(
        invoke_error("Acme.Calc", "Div", vec![Value::Int(1), Value::Int(0)]),
        InvokeError::Runtime(RuntimeError::DivideByZero)
    );
    assert_eq!(
        invoke_error("Acme.Calc", "Loop", vec![Value::Int(0)]),
        InvokeError::Runtime(RuntimeError::StackOverflow(8))
    );
}

#[rstest]
fn test_concurrent_compile_and_load(options: CompileOptions) {
    let registry = Arc::new(ExecutionContextRegistry::new());
    let facade = Arc::new(CompilationFacade::new(&options, Arc::clone(&registry)));

    let handles = (0..8)
        .map(|_| {
            let facade = Arc::clone(&facade);
            std::thread::spawn(move || {
                facade
                    .compile_and_load(&inline(&[GREETER]), &ExtraReferences::default())
                    .unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|thread| thread.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(registry.len(), 8);
    for handle in &handles {
        assert_eq!(handle.invoke("Greeter", "Hello", vec![]).unwrap(), Value::from("hi"));
    }

    drop(handles);
    assert!(registry.is_empty());
}

#[test]
fn test_pipeline_types_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<CompilationFacade>();
    assert_send_sync::<ExecutionContextRegistry>();
    assert_send_sync::<ember_host::LoadedModuleHandle>();
}
