//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.
//!
//! # Build
//!
//! ```text
//! Pages
//! 001 index.html
//! 002 blog/abc.html
//!
//! Failures
//!     page /broken
//!         <li cms-loop> needs a cms-content-type attribute
//!
//! Built 2 pages, 3 assets, 4 components (1 failed)
//! ```
//!
//! # Check
//!
//! Same layout with a `Checked` summary line; nothing is written.

use crate::pipeline::{BuildFailure, BuildReport};

// ============================================================================
// Helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn page_lines(pages: &[String]) -> Vec<String> {
    if pages.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["Pages".to_string()];
    lines.extend(
        pages
            .iter()
            .enumerate()
            .map(|(i, page)| format!("{} {}", format_index(i + 1), page)),
    );
    lines
}

/// Every failure as a header plus indented message lines.
pub fn format_failures(failures: &[BuildFailure]) -> Vec<String> {
    if failures.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["Failures".to_string()];
    for failure in failures {
        lines.push(format!("{}{} {}", indent(1), failure.unit, failure.path));
        lines.extend(
            failure
                .message
                .lines()
                .map(|line| format!("{}{}", indent(2), line)),
        );
    }
    lines
}

fn summary(verb: &str, report: &BuildReport) -> String {
    let mut line = format!(
        "{verb} {}, {}, {}",
        plural(report.pages.len(), "page"),
        plural(report.assets, "asset"),
        plural(report.components, "component"),
    );
    if !report.failures.is_empty() {
        line.push_str(&format!(" ({} failed)", report.failures.len()));
    }
    line
}

fn format_report(verb: &str, report: &BuildReport) -> Vec<String> {
    let mut lines = page_lines(&report.pages);
    let failures = format_failures(&report.failures);
    if !failures.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.extend(failures);
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(summary(verb, report));
    lines
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    format_report("Built", report)
}

pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check_report(report: &BuildReport) -> Vec<String> {
    format_report("Checked", report)
}

pub fn print_check_report(report: &BuildReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
