use clap::{Parser, Subcommand};
use colored::Colorize;
use ember_host::{
    CONFIG_FILE, CompilationFacade, CompileOptions, ExecutionContextRegistry, ExtraReferences, MemberDescriptor,
    SourceSet,
};
use ember_lang::{Diagnostic, MemberKind, Severity, Value};
use miette::IntoDiagnostic;
use miette::miette;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `EMBER_LOG=ember_host=debug`.
const LOG_ENV: &str = "EMBER_LOG";

#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To check sources for errors:\n\
    ember check main.ember\n\n\
    ## To call a static method:\n\
    ember run main.ember --call Greeter.Hello\n\n\
    ## To pass arguments:\n\
    ember run calc.ember --call Acme.Calc.Add --arg 1 --arg 2\n\n\
    ## To build a module image and reference it:\n\
    ember build shapes.ember -o lib/shapes.emb\n\
    ember --reference-dir lib types app.ember")]
#[command(
    about = "ember compiles Ember sources in memory and runs the resulting module.",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Commands,

    /// Reference every module image (*.emb) in the directory
    #[arg(short = 'L', long = "reference-dir", global = true)]
    reference_dirs: Vec<PathBuf>,

    /// Reference the module image
    #[arg(short = 'r', long = "reference", global = true)]
    references: Vec<PathBuf>,

    /// Read options from the file instead of ./ember.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Treat every warning as an error
    #[arg(long, global = true, default_value_t = false)]
    warnings_as_errors: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compile sources and report their diagnostics
    Check {
        /// Source files compiled together as one module
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Compile sources and write the module image
    Build {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Path of the module image
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Compile and load sources, then list the types of the module
    Types {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Compile and load sources, then call a static method
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Method to call, as TYPE.METHOD
        #[arg(long, value_name = "TYPE.METHOD")]
        call: String,
        /// Argument of the call: an int, a double, true, false, null or a string
        #[arg(long = "arg", value_name = "VALUE", allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        self.init_tracing();

        let options = self.options()?;
        let facade = CompilationFacade::new(&options, Arc::new(ExecutionContextRegistry::new()));
        let extra = ExtraReferences {
            directories: self.reference_dirs.clone(),
            paths: self.references.clone(),
        };

        let stdout = io::stdout();
        let mut handle = BufWriter::new(stdout.lock());

        match &self.commands {
            Commands::Check { files } => {
                let sources = source_set(files);
                let compiled = facade.compile(&sources, &extra)?;

                write_advisory(&mut handle, &compiled.sources, &compiled.advisory)?;
                writeln!(
                    handle,
                    "{}",
                    format!("Checked {} file(s): no errors", compiled.sources.len()).green().bold()
                )
                .into_diagnostic()?;
            }
            Commands::Build { files, output } => {
                let sources = source_set(files);
                let compiled = facade.compile(&sources, &extra)?;

                write_advisory(&mut io::stderr(), &compiled.sources, &compiled.advisory)?;
                fs::write(output, compiled.binary.as_bytes()).into_diagnostic()?;
                writeln!(
                    handle,
                    "Wrote {} ({} bytes)",
                    output.display().to_string().bold(),
                    compiled.binary.len()
                )
                .into_diagnostic()?;
            }
            Commands::Types { files } => {
                let module = facade.compile_and_load(&source_set(files), &extra)?;

                for ty in module.types()? {
                    writeln!(handle, "{} {}", ty.kind.to_string().cyan(), ty.full_name.bold()).into_diagnostic()?;
                    for member in &ty.members {
                        writeln!(handle, "  {}", member_signature(member)).into_diagnostic()?;
                    }
                }
            }
            Commands::Run { files, call, args } => {
                let (type_name, method) = split_call(call)?;
                let module = facade.compile_and_load(&source_set(files), &extra)?;

                let args = args.iter().map(String::as_str).map(parse_arg).collect();
                let result = module.invoke(type_name, method, args)?;
                if result != Value::Void {
                    writeln!(handle, "{}", result).into_diagnostic()?;
                }
            }
        }

        handle.flush().into_diagnostic()
    }

    fn init_tracing(&self) {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
            EnvFilter::new(match self.verbose {
                0 => "error",
                1 => "info",
                2 => "debug",
                _ => "trace",
            })
        });

        // A subscriber may already be installed when running in-process.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    }

    fn options(&self) -> miette::Result<CompileOptions> {
        let mut options = match &self.config {
            Some(path) => load_options(path)?,
            None if Path::new(CONFIG_FILE).is_file() => load_options(Path::new(CONFIG_FILE))?,
            None => CompileOptions::default(),
        };

        if self.warnings_as_errors {
            options.diagnostics.warnings_as_errors = true;
        }

        Ok(options)
    }
}

fn load_options(path: &Path) -> miette::Result<CompileOptions> {
    let base = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => env::current_dir().into_diagnostic()?,
    };

    debug!(path = %path.display(), "Loading configuration");
    Ok(CompileOptions::from_file(path)?.with_base_dir(&base))
}

fn source_set(files: &[PathBuf]) -> SourceSet {
    files.iter().cloned().collect()
}

fn write_advisory(out: &mut impl Write, names: &[String], advisory: &[Diagnostic]) -> miette::Result<()> {
    for diagnostic in advisory {
        let label = match diagnostic.severity {
            Severity::Error => "Error".red().bold(),
            Severity::Warning => "Warning".yellow().bold(),
            Severity::Info => "Info".blue().bold(),
        };

        let written = match &diagnostic.location {
            Some(location) => writeln!(
                out,
                "  {}: {} at {}:{}",
                label,
                diagnostic,
                names
                    .get(location.source.index())
                    .map(String::as_str)
                    .unwrap_or("<unknown>"),
                location.range.start
            ),
            None => writeln!(out, "  {}: {}", label, diagnostic),
        };
        written.into_diagnostic()?;
    }

    Ok(())
}

fn member_signature(member: &MemberDescriptor) -> String {
    let modifiers = if member.is_static {
        format!("{} static", member.accessibility)
    } else {
        member.accessibility.to_string()
    };

    match member.kind {
        MemberKind::Method | MemberKind::Constructor => format!(
            "{} {} {}({})",
            modifiers,
            member.ty,
            member.name,
            member
                .params
                .iter()
                .map(|param| format!("{} {}", param.ty, param.name))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        MemberKind::EnumMember => match &member.value {
            Some(value) => format!("{} = {}", member.name, value),
            None => member.name.clone(),
        },
        MemberKind::Field | MemberKind::Property => format!("{} {} {}", modifiers, member.ty, member.name),
    }
}

/// Splits `Namespace.Type.Method` at the last dot.
fn split_call(call: &str) -> miette::Result<(&str, &str)> {
    call.rsplit_once('.')
        .filter(|(type_name, method)| !type_name.is_empty() && !method.is_empty())
        .ok_or_else(|| miette!("Expected TYPE.METHOD, got \"{}\"", call))
}

fn parse_arg(arg: &str) -> Value {
    match arg {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(n) = arg.parse::<i64>() {
                Value::Int(n)
            } else if arg.contains('.')
                && let Ok(d) = arg.parse::<f64>()
            {
                Value::Double(d)
            } else {
                Value::from(arg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use scopeguard::defer;

    use ember_lang::{Position, Range, SourceId};

    use super::*;

    fn create_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("Failed to write temp file");
        path
    }

    #[rstest]
    #[case::int("42", Value::Int(42))]
    #[case::negative("-7", Value::Int(-7))]
    #[case::double("1.5", Value::Double(1.5))]
    #[case::bool("true", Value::Bool(true))]
    #[case::null("null", Value::Null)]
    #[case::string("hello", Value::from("hello"))]
    #[case::not_a_double("nan", Value::from("nan"))]
    #[case::version("1.2.3", Value::from("1.2.3"))]
    fn test_parse_arg(#[case] arg: &str, #[case] expected: Value) {
        assert_eq!(parse_arg(arg), expected);
    }

    #[rstest]
    #[case::simple("Greeter.Hello", Some(("Greeter", "Hello")))]
    #[case::namespaced("Acme.Calc.Add", Some(("Acme.Calc", "Add")))]
    #[case::no_dot("Hello", None)]
    #[case::trailing_dot("Greeter.", None)]
    fn test_split_call(#[case] call: &str, #[case] expected: Option<(&str, &str)>) {
        assert_eq!(split_call(call).ok(), expected);
    }

    #[test]
    fn test_member_signature() {
        let member = MemberDescriptor {
            name: "Add".to_string(),
            kind: MemberKind::Method,
            accessibility: ember_lang::Accessibility::Public,
            is_static: true,
            is_abstract: false,
            is_readonly: false,
            ty: "int".to_string(),
            params: vec![
                ember_lang::ParamDef {
                    name: "a".to_string(),
                    ty: "int".to_string(),
                },
                ember_lang::ParamDef {
                    name: "b".to_string(),
                    ty: "int".to_string(),
                },
            ],
            value: None,
        };

        assert_eq!(member_signature(&member), "public static int Add(int a, int b)");
    }

    #[test]
    fn test_config_file_and_flag_override() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_file(
            dir.path(),
            "custom.toml",
            "[references]\ndirectories = [\"lib\"]\n\n[runtime]\nmax_call_depth = 9\n",
        );

        let cli = Cli::try_parse_from([
            "ember",
            "--config",
            config.to_str().unwrap(),
            "--warnings-as-errors",
            "check",
            "main.ember",
        ])
        .unwrap();
        let options = cli.options().unwrap();

        assert!(options.diagnostics.warnings_as_errors);
        assert_eq!(options.runtime.max_call_depth, 9);
        assert_eq!(options.references.directories, vec![dir.path().join("lib")]);
    }

    #[test]
    fn test_cli_check_command() {
        let temp_dir = std::env::temp_dir().join(format!("ember_cli_check_{}", std::process::id()));
        fs::create_dir_all(&temp_dir).expect("Failed to create temp dir");
        let temp_dir_clone = temp_dir.clone();

        defer! {
            if temp_dir_clone.exists() {
                std::fs::remove_dir_all(&temp_dir_clone).ok();
            }
        }

        let valid = create_file(&temp_dir, "valid.ember", "class A { static int F() => 1; }");
        let invalid = create_file(&temp_dir, "invalid.ember", "class Broken {");

        let cli = Cli::try_parse_from(["ember", "check", valid.to_str().unwrap()]).unwrap();
        assert!(cli.run().is_ok());

        let cli = Cli::try_parse_from(["ember", "check", invalid.to_str().unwrap()]).unwrap();
        assert!(cli.run().is_err());
    }

    #[test]
    fn test_write_advisory_names_compiled_source() {
        let names = vec!["a.ember".to_string(), "c.ember".to_string()];
        let advisory = vec![
            Diagnostic::warning(ember_lang::codes::DUPLICATE_USING, "Duplicate using")
                .at(SourceId::new(1), Range::new(Position::new(1, 16), Position::new(1, 24))),
            Diagnostic::warning(ember_lang::codes::DUPLICATE_USING, "Detached"),
        ];

        let mut out = Vec::new();
        write_advisory(&mut out, &names, &advisory).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("c.ember"), "{out}");
        assert!(!out.contains("a.ember"), "{out}");
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn test_run_requires_call() {
        assert!(Cli::try_parse_from(["ember", "run", "main.ember"]).is_err());
        assert!(Cli::try_parse_from(["ember", "check"]).is_err());
    }
}
