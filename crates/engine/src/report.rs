//! Plain-text rendering of a [`RunReport`].
//!
//! One line per target in topological order, then the captured output of
//! every failed target. Nested reports arrive as captured output and are
//! indented one level further each time they are passed up.

use std::fmt::Write;

use crate::models::{RunReport, TargetState};

pub fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let namespace = if report.namespace.is_empty() {
        "<root>"
    } else {
        report.namespace.as_str()
    };
    let _ = writeln!(
        out,
        "== request {} (namespace {}, depth {}): {}",
        report.request_id,
        namespace,
        report.depth,
        if report.succeeded() { "SUCCEEDED" } else { "FAILED" }
    );

    for record in &report.records {
        let mut line = format!("  {:<8} {}", record.state.label(), record.target);
        match record.state {
            TargetState::Succeeded | TargetState::Failed => {
                if let Some(outcome) = &record.outcome {
                    if let Some(code) = outcome.exit_code.filter(|c| *c != 0) {
                        let _ = write!(line, " (exit {code})");
                    }
                    let _ = write!(line, " [{:.2}s]", outcome.duration.as_secs_f64());
                }
            }
            TargetState::Skipped => {
                if let Some(reason) = &record.skip_reason {
                    let _ = write!(line, " ({reason})");
                }
            }
            _ => {}
        }
        out.push_str(&line);
        out.push('\n');
    }

    for record in report.records.iter().filter(|r| r.state == TargetState::Failed) {
        let Some(outcome) = &record.outcome else { continue };
        if outcome.output.is_empty() {
            continue;
        }
        let _ = writeln!(out, "-- output of {} --", record.target);
        for line in outcome.output.stdout.lines().chain(outcome.output.stderr.lines()) {
            let _ = writeln!(out, "   {line}");
        }
    }

    let _ = writeln!(
        out,
        "summary: {} succeeded, {} failed, {} skipped",
        report.count(TargetState::Succeeded),
        report.count(TargetState::Failed),
        report.count(TargetState::Skipped)
    );
    out
}
