//! End-to-end coverage of the `qflow` binary itself: writes a fixture to a
//! temp dir and shells out, mirroring the teacher's own CLI-level test
//! harness pattern of writing fixtures under `tempfile::tempdir()`.

use std::fs;
use std::process::Command;

fn qflow_bin() -> &'static str {
    env!("CARGO_BIN_EXE_qflow")
}

fn write_fixture(dir: &std::path::Path, name: &str, yaml: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, yaml).expect("write fixture");
    path
}

const BASIC_SURVEY: &str = r#"
questionnaire:
  title: Basic
  blocks:
    - id: b1
      items:
        - id: age
          kind: Question
          input: { min: 0, max: 120 }
        - id: experience
          kind: Question
          input: { min: 0, max: 50 }
          precondition:
            - predicate: "age.outcome >= 16"
"#;

const CYCLE: &str = r#"
questionnaire:
  title: Cycle
  blocks:
    - id: b1
      items:
        - id: a
          kind: Question
          input: { min: 0, max: 10 }
          precondition:
            - predicate: "b.outcome > 0"
        - id: b
          kind: Question
          input: { min: 0, max: 10 }
          precondition:
            - predicate: "a.outcome > 0"
"#;

#[test]
fn check_reports_valid_survey_with_exit_zero() {
    let dir = tempfile::tempdir().expect("temp dir");
    let file = write_fixture(dir.path(), "survey.yaml", BASIC_SURVEY);

    let output = Command::new(qflow_bin())
        .arg("check")
        .arg(&file)
        .output()
        .expect("run qflow check");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("\"valid\": true"));
    assert!(stdout.contains("\"experience\""));
}

#[test]
fn check_exits_two_on_cycle() {
    let dir = tempfile::tempdir().expect("temp dir");
    let file = write_fixture(dir.path(), "cycle.yaml", CYCLE);

    let output = Command::new(qflow_bin())
        .arg("check")
        .arg(&file)
        .output()
        .expect("run qflow check");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn order_prints_canonical_topological_order() {
    let dir = tempfile::tempdir().expect("temp dir");
    let file = write_fixture(dir.path(), "survey.yaml", BASIC_SURVEY);

    let output = Command::new(qflow_bin())
        .arg("order")
        .arg(&file)
        .output()
        .expect("run qflow order");

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["age", "experience"]);
}

#[test]
fn order_fails_on_missing_file() {
    let output = Command::new(qflow_bin())
        .arg("order")
        .arg("/nonexistent/does-not-exist.yaml")
        .output()
        .expect("run qflow order");

    assert_eq!(output.status.code(), Some(1));
}
