//! End-to-end coverage of the six documented scenarios (§8 of SPEC_FULL.md).

use qflow_verify::{analyze, CancelToken, StructuralError};

fn run(yaml: &str) -> qflow_verify::Report {
    let (report, err) = analyze(yaml, 10_000, &CancelToken::new());
    assert!(err.is_none(), "unexpected structural error: {:?}", err);
    report
}

#[test]
fn s1_basic_linear_survey() {
    let yaml = r#"
questionnaire:
  title: S1
  blocks:
    - id: b1
      items:
        - id: age
          kind: Question
          input: { min: 0, max: 120 }
        - id: gender
          kind: Question
          input: { labels: { 0: Male, 1: Female } }
        - id: comment
          kind: Comment
"#;
    let report = run(yaml);
    assert!(report.valid);
    let named: Vec<_> = report.items.iter().filter(|it| it.id != "comment").collect();
    assert_eq!(named.len(), 2);
    for it in named {
        assert!(matches!(it.reach, Some(qflow_verify::report::ReachJson::Always)));
        assert!(matches!(it.post, Some(qflow_verify::report::PostJson::None)));
        assert!(!it.dead);
    }
}

#[test]
fn s2_conflicting_postconditions() {
    let yaml = r#"
questionnaire:
  title: S2
  blocks:
    - id: b1
      items:
        - id: rating
          kind: Question
          input: { min: 0, max: 100 }
        - id: q1
          kind: Question
          input: { min: 0, max: 1 }
          postcondition:
            - predicate: "rating.outcome > 50"
        - id: q2
          kind: Question
          input: { min: 0, max: 1 }
          postcondition:
            - predicate: "rating.outcome < 30"
"#;
    let report = run(yaml);
    assert!(!report.valid);
    assert!(matches!(report.global.verdict, qflow_verify::report::GlobalVerdictJson::Inconsistent));
    let conflict = report.global.conflict.expect("expects a conflict set");
    assert!(conflict.contains(&"q1".to_string()));
    assert!(conflict.contains(&"q2".to_string()));
    let q2 = report.items.iter().find(|it| it.id == "q2").unwrap();
    assert!(q2.dead);
}

#[test]
fn s3_accumulated_dead_code() {
    let yaml = r#"
questionnaire:
  title: S3
  blocks:
    - id: b1
      items:
        - id: income
          kind: Question
          input: { min: 0, max: 1000000 }
          postcondition:
            - predicate: "income.outcome >= 50000"
        - id: assistance
          kind: Question
          input: { min: 0, max: 1 }
          precondition:
            - predicate: "income.outcome < 30000"
"#;
    let report = run(yaml);
    assert!(report.valid);
    let assistance = report.items.iter().find(|it| it.id == "assistance").unwrap();
    assert!(matches!(assistance.reach, Some(qflow_verify::report::ReachJson::Conditional)));
    assert!(matches!(assistance.post, Some(qflow_verify::report::PostJson::None)));
    assert!(assistance.dead);
}

#[test]
fn s4_driving_experience() {
    let yaml = r#"
questionnaire:
  title: S4
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
          postcondition:
            - predicate: "experience.outcome <= age.outcome - 16"
"#;
    let report = run(yaml);
    assert!(report.valid);
    let experience = report.items.iter().find(|it| it.id == "experience").unwrap();
    assert!(matches!(experience.reach, Some(qflow_verify::report::ReachJson::Conditional)));
    assert!(matches!(experience.post, Some(qflow_verify::report::PostJson::Constraining)));
    assert!(!experience.dead);
    assert!(experience.witness.is_some());
}

#[test]
fn s5_cycle() {
    let yaml = r#"
questionnaire:
  title: S5
  blocks:
    - id: b1
      items:
        - id: a
          kind: Question
          input: { min: 0, max: 10 }
          precondition:
            - predicate: "c.outcome > 0"
        - id: b
          kind: Question
          input: { min: 0, max: 10 }
          precondition:
            - predicate: "a.outcome > 0"
        - id: c
          kind: Question
          input: { min: 0, max: 10 }
          precondition:
            - predicate: "b.outcome > 0"
"#;
    let (report, err) = analyze(yaml, 10_000, &CancelToken::new());
    let err = err.expect("expected a structural error");
    assert!(matches!(err, StructuralError::CycleDetected { .. }));
    assert!(report.items.is_empty());
    let path = report.cycle.expect("cycle path populated");
    assert_eq!(path.first(), path.last());
}

#[test]
fn s6_malformed_predicate() {
    let yaml = r#"
questionnaire:
  title: S6
  blocks:
    - id: b1
      items:
        - id: q_first
          kind: Question
          input: { min: 0, max: 10 }
        - id: q_second
          kind: Question
          input: { min: 0, max: 10 }
          precondition:
            - predicate: "undefined_function(q_first.outcome)"
"#;
    let report = run(yaml);
    let q_second = report.items.iter().find(|it| it.id == "q_second").unwrap();
    assert!(q_second.reach.is_none());
    assert!(q_second.post.is_none());
    assert!(!q_second.errors.is_empty());
    assert_eq!(q_second.errors[0].kind, "UnknownFunction");

    let q_first = report.items.iter().find(|it| it.id == "q_first").unwrap();
    assert!(q_first.reach.is_some());
}
