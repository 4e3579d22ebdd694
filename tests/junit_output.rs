mod common;

use std::fs;
use std::time::Duration;

use pipewright::execute::scheduler::{ExecutionReport, StepOutcome, StepRecord};
use pipewright::junit::write_junit;

fn record(name: &str, outcome: StepOutcome, message: Option<&str>) -> StepRecord {
    StepRecord {
        name: name.to_string(),
        duration: Duration::from_millis(1500),
        outcome,
        message: message.map(str::to_string),
    }
}

#[test]
fn writes_a_junit_document() {
    let report = ExecutionReport {
        records: vec![
            record("src", StepOutcome::Succeeded, None),
            record("build", StepOutcome::Skipped, None),
            record("unit", StepOutcome::Failed, Some("exit code 2 & <bad>")),
            record("e2e", StepOutcome::Cancelled, Some("dependency 'unit' did not succeed")),
        ],
    };

    let dir = tempfile::tempdir().expect("tempdir");
    write_junit(dir.path(), "operator", &report).expect("writes");

    let contents = fs::read_to_string(dir.path().join("junit_operator.xml")).expect("readable");
    assert!(contents.contains("<testsuite name=\"operator\" tests=\"4\" failures=\"1\" skipped=\"2\">"));
    assert!(contents.contains("<testcase name=\"src\" time=\"1.500\"/>"));
    assert!(contents.contains("<failure message=\"exit code 2 &amp; &lt;bad&gt;\"/>"));
    assert!(contents.contains("<skipped/>"));
}

#[test]
fn creates_the_artifact_directory() {
    let report = ExecutionReport {
        records: vec![record("src", StepOutcome::Succeeded, None)],
    };
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("artifacts/run-1");
    write_junit(&nested, "operator", &report).expect("writes into a new dir");
    assert!(nested.join("junit_operator.xml").exists());
}
