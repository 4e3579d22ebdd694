// src/junit.rs

//! JUnit result output.
//!
//! After execution the per-step report is written as a test-suites XML
//! document into the artifact directory. Failures here are logged by the
//! caller and never fail the run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::execute::scheduler::{ExecutionReport, StepOutcome};

/// Write `junit_<name>.xml` into `dir`.
pub fn write_junit(dir: &Path, name: &str, report: &ExecutionReport) -> Result<()> {
    let mut cases = String::new();
    let mut failures = 0usize;
    let mut skipped = 0usize;

    for record in &report.records {
        let time = record.duration.as_secs_f64();
        match record.outcome {
            StepOutcome::Succeeded => {
                cases.push_str(&format!(
                    "    <testcase name=\"{}\" time=\"{time:.3}\"/>\n",
                    escape(&record.name)
                ));
            }
            StepOutcome::Skipped => {
                skipped += 1;
                cases.push_str(&format!(
                    "    <testcase name=\"{}\" time=\"{time:.3}\">\n      <skipped/>\n    </testcase>\n",
                    escape(&record.name)
                ));
            }
            StepOutcome::Failed => {
                failures += 1;
                let message = record.message.as_deref().unwrap_or("step failed");
                cases.push_str(&format!(
                    "    <testcase name=\"{}\" time=\"{time:.3}\">\n      <failure message=\"{}\"/>\n    </testcase>\n",
                    escape(&record.name),
                    escape(message)
                ));
            }
            StepOutcome::Cancelled => {
                skipped += 1;
                let message = record.message.as_deref().unwrap_or("step was cancelled");
                cases.push_str(&format!(
                    "    <testcase name=\"{}\" time=\"{time:.3}\">\n      <skipped message=\"{}\"/>\n    </testcase>\n",
                    escape(&record.name),
                    escape(message)
                ));
            }
        }
    }

    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>\n  <testsuite name=\"{}\" tests=\"{}\" failures=\"{failures}\" skipped=\"{skipped}\">\n{cases}  </testsuite>\n</testsuites>\n",
        escape(name),
        report.records.len(),
    );

    fs::create_dir_all(dir).with_context(|| format!("creating artifact dir {dir:?}"))?;
    let path = dir.join(format!("junit_{name}.xml"));
    fs::write(&path, document).with_context(|| format!("writing JUnit results to {path:?}"))?;
    Ok(())
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
