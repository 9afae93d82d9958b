//! End-to-end driver tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn koan() -> Command {
    Command::cargo_bin("koan").expect("binary builds")
}

#[test]
fn test_version() {
    koan()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("koan"));
}

#[test]
fn test_evaluate_expression() {
    koan()
        .args(["-x", "1 + 2 * 3;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("7"));
}

#[test]
fn test_quiet_suppresses_results() {
    koan()
        .args(["-q", "-x", "1 + 2;"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_errors_render_with_location() {
    koan()
        .args(["-x", "no_such_name;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("InvalidIdentifier"));
}

#[test]
fn test_execute_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.koan");
    std::fs::write(&path, "x := 40; x + 2;\n").unwrap();

    koan()
        .arg(path.to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_missing_file_fails() {
    koan()
        .arg("definitely/not/here.koan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_list_builtins() {
    koan()
        .args(["--list-builtins", "-x", "0;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("`add`"))
        .stdout(predicate::str::contains("print_line"));
}

#[test]
fn test_import_flag_defines_globally() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lib.koan");
    std::fs::write(&path, "answer := 42;\n").unwrap();

    koan()
        .args(["-i", path.to_str().unwrap(), "-x", "answer;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_import_path_resolution() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("m.koan"), "seven := 7;\n").unwrap();

    koan()
        .args(["-I", dir.path().to_str().unwrap(), "-x", "import \"m\"; seven;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("7"));
}

#[test]
fn test_noeval_parses_silently() {
    koan()
        .args(["-n", "-x", "1 + 2;"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_script_sees_argv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("args.koan");
    std::fs::write(&path, "argc;\n").unwrap();

    koan()
        .args([path.to_str().unwrap(), "one", "two"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn test_verbose_traces_lexemes_and_nodes() {
    // -t stops at dispatch-level detail; -v adds the per-lexeme and
    // per-node layer.
    koan()
        .env_remove("RUST_LOG")
        .args(["-t", "-x", "1 + 2;"])
        .assert()
        .success()
        .stderr(predicate::str::contains("dispatch"))
        .stderr(predicate::str::contains("lexeme").not());

    koan()
        .env_remove("RUST_LOG")
        .args(["-v", "-x", "1 + 2;"])
        .assert()
        .success()
        .stderr(predicate::str::contains("lexeme"))
        .stderr(predicate::str::contains("subeval"));
}

#[test]
fn test_math_family_is_opt_in() {
    koan()
        .args(["-x", "sqrt 16;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("InvalidIdentifier"));

    koan()
        .args(["-m", "-x", "sqrt 16;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4"));
}
