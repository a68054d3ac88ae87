use assert_cmd::cargo;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};

const GREETER: &str = r#"class Greeter { public static string Hello() => "hi"; }"#;

const CALC: &str = r#"
namespace Acme
{
    public static class Calc
    {
        public static int Add(int a, int b) => a + b;
        public static double Half(double x) => x / 2;
        public static bool Not(bool b) => !b;
        public static string Greet(string name) => "Hello, " + name;
        public static int Div(int a, int b) => a / b;
    }
}
"#;

const SHAPES: &str = r#"
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

fn create_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write temp file");
    path
}

fn ember(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo::cargo_bin_cmd!("ember");
    cmd.current_dir(dir).env_remove("EMBER_TRUSTED_REFERENCES").env_remove("EMBER_LOG");
    cmd
}

#[test]
fn test_cli_run_greeter() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = create_file(dir.path(), "greeter.ember", GREETER);

    ember(dir.path())
        .arg("run")
        .arg(&file)
        .args(["--call", "Greeter.Hello"])
        .assert()
        .success()
        .code(0)
        .stdout("hi\n");

    Ok(())
}

#[rstest]
#[case::ints(vec!["--call", "Acme.Calc.Add", "--arg", "2", "--arg", "3"], "5\n")]
#[case::negative(vec!["--call", "Acme.Calc.Add", "--arg", "-2", "--arg", "-3"], "-5\n")]
#[case::double(vec!["--call", "Acme.Calc.Half", "--arg", "5.0"], "2.5\n")]
#[case::int_to_double(vec!["--call", "Acme.Calc.Half", "--arg", "3"], "1.5\n")]
#[case::bool(vec!["--call", "Acme.Calc.Not", "--arg", "false"], "true\n")]
#[case::string(vec!["--call", "Acme.Calc.Greet", "--arg", "Ember"], "Hello, Ember\n")]
fn test_cli_run_with_args(#[case] args: Vec<&str>, #[case] expected: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = create_file(dir.path(), "calc.ember", CALC);

    ember(dir.path())
        .arg("run")
        .arg(&file)
        .args(args)
        .assert()
        .success()
        .stdout(expected.to_string());

    Ok(())
}

#[rstest]
#[case::unknown_type(vec!["--call", "Calc.Add", "--arg", "1", "--arg", "2"])]
#[case::unknown_method(vec!["--call", "Acme.Calc.Sub"])]
#[case::arity(vec!["--call", "Acme.Calc.Add", "--arg", "1"])]
#[case::argument_type(vec!["--call", "Acme.Calc.Add", "--arg", "one", "--arg", "2"])]
#[case::divide_by_zero(vec!["--call", "Acme.Calc.Div", "--arg", "1", "--arg", "0"])]
#[case::malformed_call(vec!["--call", "Add"])]
fn test_cli_run_fails(#[case] args: Vec<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = create_file(dir.path(), "calc.ember", CALC);

    ember(dir.path())
        .arg("run")
        .arg(&file)
        .args(args)
        .assert()
        .failure()
        .stdout("");

    Ok(())
}

#[test]
fn test_cli_check() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let greeter = create_file(dir.path(), "greeter.ember", GREETER);
    let calc = create_file(dir.path(), "calc.ember", CALC);

    let assert = ember(dir.path()).arg("check").arg(&greeter).arg(&calc).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("Checked 2 file(s)"), "{stdout}");

    Ok(())
}

#[rstest]
#[case::unclosed_class("class Broken {", "EM1513")]
#[case::unknown_type("class A { static Missing F() => null; }", "EM0246")]
#[case::unknown_name("class A { static int F() => y; }", "EM0103")]
fn test_cli_check_reports_errors(#[case] source: &str, #[case] code: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = create_file(dir.path(), "broken.ember", source);

    let assert = ember(dir.path()).arg("check").arg(&file).assert().failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone())?;
    assert!(stderr.contains(code), "{stderr}");

    Ok(())
}

#[test]
fn test_cli_check_missing_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    ember(dir.path()).args(["check", "missing.ember"]).assert().failure();

    Ok(())
}

#[test]
fn test_cli_check_advisory() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = create_file(
        dir.path(),
        "usings.ember",
        "using System; using System; namespace System { class A { } }",
    );

    let assert = ember(dir.path()).arg("check").arg(&file).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(stdout.contains("EM0105"), "{stdout}");

    ember(dir.path())
        .arg("--warnings-as-errors")
        .arg("check")
        .arg(&file)
        .assert()
        .failure();

    create_file(dir.path(), "ember.toml", "[diagnostics]\nwarn_as_error = [\"EM0105\"]\n");
    ember(dir.path()).arg("check").arg(&file).assert().failure();

    let custom = create_file(dir.path(), "quiet.toml", "[diagnostics]\nsuppress = [\"EM0105\"]\n");
    let assert = ember(dir.path())
        .arg("--config")
        .arg(&custom)
        .arg("check")
        .arg(&file)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    assert!(!stdout.contains("EM0105"), "{stdout}");

    Ok(())
}

#[test]
fn test_cli_check_names_deduplicated_sources() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let a = create_file(dir.path(), "a.ember", "class A { }");
    let b = create_file(dir.path(), "b.ember", "class A { }");
    let c = create_file(dir.path(), "c.ember", "using N; using N; namespace N { class C { } }");

    let assert = ember(dir.path()).arg("check").arg(&a).arg(&b).arg(&c).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;

    let warning = stdout.lines().find(|line| line.contains("EM0105")).ok_or("missing EM0105")?;
    assert!(warning.contains("c.ember"), "{stdout}");
    assert!(!warning.contains("b.ember"), "{stdout}");
    assert!(stdout.contains("Checked 2 file(s)"), "{stdout}");

    Ok(())
}

#[test]
fn test_cli_invalid_config() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = create_file(dir.path(), "greeter.ember", GREETER);
    let config = create_file(dir.path(), "bad.toml", "[optimizer]\nlevel = 3\n");

    ember(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("check")
        .arg(&file)
        .assert()
        .failure();

    Ok(())
}

#[test]
fn test_cli_types() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = create_file(dir.path(), "calc.ember", CALC);

    let assert = ember(dir.path()).arg("types").arg(&file).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;

    assert!(stdout.contains("Acme.Calc"), "{stdout}");
    assert!(stdout.contains("public static int Add(int a, int b)"), "{stdout}");

    Ok(())
}

#[test]
fn test_cli_build_and_reference() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let lib = dir.path().join("lib");
    fs::create_dir(&lib)?;
    let shapes = create_file(dir.path(), "shapes.ember", SHAPES);
    let app = create_file(dir.path(), "app.ember", APP);

    ember(dir.path())
        .arg("build")
        .arg(&shapes)
        .arg("-o")
        .arg(lib.join("shapes.emb"))
        .assert()
        .success();
    assert!(lib.join("shapes.emb").is_file());

    ember(dir.path()).arg("check").arg(&app).assert().failure();

    ember(dir.path())
        .arg("--reference-dir")
        .arg(&lib)
        .arg("run")
        .arg(&app)
        .args(["--call", "Circle.Area", "--arg", "2"])
        .assert()
        .success()
        .stdout("12\n");

    ember(dir.path())
        .arg("--reference")
        .arg(lib.join("shapes.emb"))
        .arg("check")
        .arg(&app)
        .assert()
        .success();

    create_file(dir.path(), "ember.toml", "[references]\ndirectories = [\"lib\"]\n");
    ember(dir.path()).arg("check").arg(&app).assert().success();

    Ok(())
}

#[test]
fn test_cli_missing_reference() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let file = create_file(dir.path(), "greeter.ember", GREETER);

    ember(dir.path())
        .args(["--reference", "missing.emb", "check"])
        .arg(&file)
        .assert()
        .failure();

    Ok(())
}
