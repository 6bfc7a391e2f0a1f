//! Run reports.

use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;

use ichor::classify::{ClassFlags, Classification, Classifier};
use ichor::{FuzzConfig, RunSummary};

/// Everything needed to reproduce and triage a run, written as JSON.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub config: &'a FuzzConfig,
    pub summary: &'a RunSummary,
    /// Where the testcase was written, if anywhere.
    pub testcase: Option<String>,
}

impl<'a> RunReport<'a> {
    pub fn new(config: &'a FuzzConfig, summary: &'a RunSummary) -> Self {
        Self {
            config,
            summary,
            testcase: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Flag names joined with `|`, or `none`.
pub fn flag_names(flags: ClassFlags) -> String {
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" | ")
    }
}

/// Human-readable run summary.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} seed {}", "ichor".bold(), summary.seed);
    let _ = writeln!(
        out,
        "  {} iterations, {} turns ({} empty), {} fragments in {} ms",
        summary.iterations, summary.turns, summary.empty_turns, summary.fragments, summary.elapsed_ms
    );
    let _ = writeln!(
        out,
        "  compiled {}, compile errors {}, executed {}, threw {}, not parsed {}, timed out {}",
        summary.compiled,
        summary.compile_errors,
        summary.executed,
        summary.threw,
        summary.not_parsed,
        summary.timeouts
    );
    if summary.module_failures > 0 || summary.sandbox_errors > 0 {
        let _ = writeln!(
            out,
            "  {} module failures, {} sandbox errors",
            summary.module_failures.to_string().yellow(),
            summary.sandbox_errors.to_string().yellow()
        );
    }
    let _ = writeln!(
        out,
        "  stopped: {:?}, oracle checks: {}",
        summary.stop_reason, summary.oracle_checks
    );

    if summary.findings.is_empty() {
        let _ = writeln!(out, "{}", "no findings".green());
    } else {
        let _ = writeln!(
            out,
            "{}",
            format!("{} finding(s)", summary.findings.len()).red().bold()
        );
        for finding in &summary.findings {
            let _ = writeln!(out, "  {}", finding);
            for line in finding.fragment.lines() {
                let _ = writeln!(out, "    | {}", line);
            }
        }
    }
    out
}

/// A classification and the rules that produced it.
pub fn format_classification(classifier: &Classifier, text: &str) -> String {
    let classification: Classification = classifier.classify(text);
    let mut out = String::new();
    let _ = writeln!(out, "flags: {}", flag_names(classification.flags()));
    for rule in classifier.explain(text) {
        let _ = writeln!(
            out,
            "  {} clears {}: {}",
            rule.name.cyan(),
            flag_names(rule.clears),
            rule.reason
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ichor::oracle::{Finding, OracleKind};

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_flag_names() {
        assert_eq!(flag_names(ClassFlags::empty()), "none");
        assert_eq!(
            flag_names(ClassFlags::PARSE | ClassFlags::EXECUTE),
            "PARSE | EXECUTE"
        );
    }

    #[test]
    fn test_summary_lists_findings() {
        plain();
        let summary = RunSummary {
            seed: 9,
            findings: vec![Finding {
                oracle: OracleKind::Crash,
                fragment: "a();\nb();".into(),
                observations: vec!["engine crashed".into()],
                seed: 9,
                turn: 3,
            }],
            ..RunSummary::default()
        };
        let text = format_summary(&summary);
        assert!(text.contains("seed 9"));
        assert!(text.contains("1 finding(s)"));
        assert!(text.contains("    | b();"));
    }

    #[test]
    fn test_summary_without_findings() {
        plain();
        let text = format_summary(&RunSummary::default());
        assert!(text.contains("no findings"));
        assert!(!text.contains("sandbox errors"));
    }

    #[test]
    fn test_summary_counts_timeouts() {
        plain();
        let summary = RunSummary {
            timeouts: 3,
            ..RunSummary::default()
        };
        let text = format_summary(&summary);
        assert!(text.contains("timed out 3"), "{}", text);
        assert!(text.contains("no findings"));
    }

    #[test]
    fn test_classification_names_rules() {
        plain();
        let text = format_classification(&Classifier::standard(), "quit();");
        assert!(text.contains("quit"), "{}", text);
        assert!(!text.contains("flags: PARSE | EXECUTE | "), "{}", text);

        let text = format_classification(&Classifier::standard(), "1 + 1;");
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_report_serializes() {
        let config = FuzzConfig::default();
        let summary = RunSummary::default();
        let mut report = RunReport::new(&config, &summary);
        report.testcase = Some("case.js".into());
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["testcase"], "case.js");
        assert_eq!(json["summary"]["stop_reason"], "completed");
    }
}
