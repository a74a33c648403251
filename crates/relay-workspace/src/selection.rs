//! Grouping of selected lines with their diagnostics.
//!
//! Editor positions arrive zero-based (LSP convention); everything this module
//! returns is one-based so the external tool can quote line numbers directly.

#![allow(missing_docs)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    /// Label reported to the external tool; hints fold into `Information`.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Information | Self::Hint => "Information",
        }
    }
}

/// Diagnostic as reported by the editor (zero-based range).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    #[serde(default)]
    pub source: Option<String>,
    pub range: Range,
}

/// Selected range in the editor (zero-based lines, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSpan {
    pub start_line: u32,
    pub end_line: u32,
    /// Column where the selection stops on its last line (zero-based).
    #[serde(default)]
    pub end_character: u32,
    /// True when the selection covers no characters.
    #[serde(default)]
    pub is_empty: bool,
}

impl SelectionSpan {
    /// `(first, last)` line, whatever the selection direction.
    #[must_use]
    pub fn ordered(&self) -> (u32, u32) {
        if self.start_line <= self.end_line {
            (self.start_line, self.end_line)
        } else {
            (self.end_line, self.start_line)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedDiagnostic {
    pub message: String,
    pub severity: &'static str,
    pub source: String,
    pub range: Range,
}

/// A run of consecutive selected lines (one-based, inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineGroup {
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub errors: Vec<GroupedDiagnostic>,
}

/// One-based line numbers covered by `spans`, deduplicated and sorted.
///
/// Spans are clamped to the first `line_count` lines of the document.
#[must_use]
pub fn selected_line_numbers(spans: &[SelectionSpan], line_count: usize) -> Vec<u32> {
    let last = u32::try_from(line_count).unwrap_or(u32::MAX);
    let mut lines = BTreeSet::new();
    for span in spans {
        let (start, end) = span.ordered();
        let first = start.saturating_add(1);
        let end = end.saturating_add(1).min(last);
        if first <= end {
            lines.extend(first..=end);
        }
    }
    lines.into_iter().collect()
}

/// Group one-based `lines` into consecutive runs and attach the diagnostics
/// that fall entirely inside each run.
#[must_use]
pub fn group_consecutive_lines(
    lines: &[u32],
    diagnostics: &[Diagnostic],
    file_lines: &[&str],
) -> Vec<LineGroup> {
    let sorted: BTreeSet<u32> = lines.iter().copied().filter(|line| *line > 0).collect();

    let mut groups: Vec<LineGroup> = Vec::new();
    for line in sorted {
        match groups.last_mut() {
            Some(group) if group.end_line + 1 == line => {
                group.end_line = line;
                group.content.push('\n');
                group.content.push_str(line_text(file_lines, line));
            }
            _ => groups.push(LineGroup {
                start_line: line,
                end_line: line,
                content: line_text(file_lines, line).to_string(),
                errors: Vec::new(),
            }),
        }
    }

    for group in &mut groups {
        for diag in diagnostics {
            let start = diag.range.start.line + 1;
            let end = diag.range.end.line + 1;
            if start >= group.start_line && end <= group.end_line {
                group.errors.push(GroupedDiagnostic {
                    message: diag.message.clone(),
                    severity: diag.severity.label(),
                    source: diag.source.clone().unwrap_or_else(|| "Unknown".to_string()),
                    range: Range {
                        start: Position {
                            line: start,
                            character: diag.range.start.character,
                        },
                        end: Position {
                            line: end,
                            character: diag.range.end.character,
                        },
                    },
                });
            }
        }
    }
    groups
}

fn line_text<'a>(file_lines: &[&'a str], line: u32) -> &'a str {
    file_lines
        .get((line - 1) as usize)
        .copied()
        .unwrap_or_default()
}
